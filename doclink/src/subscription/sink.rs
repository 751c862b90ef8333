use crate::errors::{DocLinkError, DocLinkResult};
use crate::snapshot::QuerySnapshot;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// One item of a live query stream.
pub type SnapshotItem = DocLinkResult<QuerySnapshot>;

/// Broadcast output of one subscription cycle.
///
/// Every attached consumer owns an unbounded channel; an item is pushed to all
/// consumers attached at the time it is published, in publish order. There is no
/// replay: a consumer attached later only sees later items.
///
/// A sink is closed exactly once, either quietly ([close](SnapshotSink::close))
/// or with a terminal error ([fail](SnapshotSink::fail)). Consumers attaching to
/// a closed sink receive the terminal error, if any, and then the end of the
/// stream.
pub struct SnapshotSink {
    inner: Mutex<SinkInner>,
}

struct SinkInner {
    consumers: BTreeMap<u64, UnboundedSender<SnapshotItem>>,
    closed: bool,
    terminal_error: Option<DocLinkError>,
}

impl Default for SnapshotSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSink {
    pub fn new() -> Self {
        SnapshotSink {
            inner: Mutex::new(SinkInner {
                consumers: BTreeMap::new(),
                closed: false,
                terminal_error: None,
            }),
        }
    }

    /// Attaches consumer `id` and returns its receiving end.
    pub fn attach(&self, id: u64) -> UnboundedReceiver<SnapshotItem> {
        let (sender, receiver) = unbounded_channel();
        let mut inner = self.inner.lock();
        if inner.closed {
            if let Some(err) = &inner.terminal_error {
                let _ = sender.send(Err(err.clone()));
            }
            // sender dropped here, the receiver sees the end of the stream
        } else {
            inner.consumers.insert(id, sender);
        }
        receiver
    }

    /// Detaches consumer `id`. Returns the number of consumers left, or `None`
    /// if `id` was not attached to this sink.
    pub fn detach(&self, id: u64) -> Option<usize> {
        let mut inner = self.inner.lock();
        inner.consumers.remove(&id).map(|_| inner.consumers.len())
    }

    /// Sends an item to every attached consumer. Consumers whose receiver is
    /// gone are dropped. Returns the number of consumers reached.
    pub fn send(&self, item: SnapshotItem) -> usize {
        let mut inner = self.inner.lock();
        if inner.closed {
            return 0;
        }
        inner
            .consumers
            .retain(|_, sender| sender.send(item.clone()).is_ok());
        inner.consumers.len()
    }

    pub fn publish(&self, snapshot: QuerySnapshot) -> usize {
        self.send(Ok(snapshot))
    }

    /// Delivers `error` as the last item to every consumer and closes the sink.
    pub fn fail(&self, error: DocLinkError) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        for sender in inner.consumers.values() {
            let _ = sender.send(Err(error.clone()));
        }
        inner.consumers.clear();
        inner.closed = true;
        inner.terminal_error = Some(error);
    }

    /// Ends every consumer's stream without an error.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.consumers.clear();
        inner.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.lock().consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn snapshot() -> QuerySnapshot {
        QuerySnapshot::new(vec![])
    }

    #[test]
    fn test_publish_reaches_attached_consumers() {
        let sink = SnapshotSink::new();
        let mut a = sink.attach(1);
        let mut b = sink.attach(2);
        assert_eq!(sink.publish(snapshot()), 2);
        assert!(a.try_recv().unwrap().is_ok());
        assert!(b.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_late_consumer_sees_no_replay() {
        let sink = SnapshotSink::new();
        let mut a = sink.attach(1);
        sink.publish(snapshot());
        let mut b = sink.attach(2);
        assert!(b.try_recv().is_err());
        sink.publish(snapshot());
        assert!(a.try_recv().is_ok());
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_detach_counts() {
        let sink = SnapshotSink::new();
        let _a = sink.attach(1);
        let _b = sink.attach(2);
        assert_eq!(sink.detach(1), Some(1));
        assert_eq!(sink.detach(1), None);
        assert_eq!(sink.detach(2), Some(0));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let sink = SnapshotSink::new();
        let a = sink.attach(1);
        let _b = sink.attach(2);
        drop(a);
        assert_eq!(sink.publish(snapshot()), 1);
        assert_eq!(sink.consumer_count(), 1);
    }

    #[test]
    fn test_fail_is_terminal() {
        let sink = SnapshotSink::new();
        let mut a = sink.attach(1);
        sink.fail(DocLinkError::new("rejected", ErrorKind::RegistrationFailed));
        let item = a.try_recv().unwrap();
        assert_eq!(item.unwrap_err().kind(), &ErrorKind::RegistrationFailed);
        assert!(matches!(
            a.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(sink.is_closed());
        assert_eq!(sink.publish(snapshot()), 0);
    }

    #[test]
    fn test_attach_after_fail_gets_terminal_error() {
        let sink = SnapshotSink::new();
        sink.fail(DocLinkError::new("gone", ErrorKind::ConnectionClosed));
        let mut late = sink.attach(9);
        assert_eq!(late.try_recv().unwrap().unwrap_err().kind(), &ErrorKind::ConnectionClosed);
        assert!(matches!(
            late.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_close_ends_streams_quietly() {
        let sink = SnapshotSink::new();
        let mut a = sink.attach(1);
        sink.close();
        assert!(matches!(
            a.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
        let mut late = sink.attach(2);
        assert!(matches!(
            late.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
