use crate::errors::{DocLinkError, DocLinkResult, ErrorKind};
use crate::snapshot::{DocumentRecord, QuerySnapshot};
use crate::subscription::SnapshotSink;
use crate::transport::ListenerHandle;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Routes inbound push events to the sink of the subscription that registered
/// the listener.
///
/// A registry belongs to one connection. The transport calls
/// [dispatch](ListenerRegistry::dispatch) for every event it receives and
/// [close](ListenerRegistry::close) when the connection goes away. Cloning is
/// cheap; all clones share the same table.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    sinks: DashMap<ListenerHandle, Arc<SnapshotSink>>,
    // write-locked while closing so no insert can slip past the drain
    closed: RwLock<bool>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes events for `handle` to `sink`.
    ///
    /// Transports may hand out a released handle again before the previous
    /// owner has finished tearing down; the newer route replaces the stale one.
    ///
    /// # Errors
    ///
    /// [ErrorKind::ConnectionClosed] once the registry has been closed.
    pub fn insert(&self, handle: ListenerHandle, sink: Arc<SnapshotSink>) -> DocLinkResult<()> {
        let closed = self.inner.closed.read();
        if *closed {
            log::error!("Cannot route {} after the connection closed", handle);
            return Err(DocLinkError::new(
                "Connection is closed",
                ErrorKind::ConnectionClosed,
            ));
        }
        if let Some(previous) = self.inner.sinks.insert(handle, sink.clone()) {
            if !Arc::ptr_eq(&previous, &sink) {
                log::warn!("{} reused while its previous route was still present", handle);
            }
        }
        Ok(())
    }

    /// Removes the route for `handle` if it still leads to `sink`.
    ///
    /// A route installed by another subscription under a reused handle is left
    /// in place.
    pub fn remove(&self, handle: &ListenerHandle, sink: &Arc<SnapshotSink>) -> Option<Arc<SnapshotSink>> {
        self.inner
            .sinks
            .remove_if(handle, |_, current| Arc::ptr_eq(current, sink))
            .map(|(_, sink)| sink)
    }

    pub fn contains(&self, handle: &ListenerHandle) -> bool {
        self.inner.sinks.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.inner.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sinks.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.read()
    }

    /// Delivers a result set pushed for `handle`.
    ///
    /// Returns `false` when no subscription owns the handle; such events are
    /// dropped. A record with a malformed path is delivered to the consumers as
    /// an error item and does not end their streams.
    pub fn dispatch(&self, handle: ListenerHandle, records: Vec<DocumentRecord>) -> bool {
        let sink = match self.inner.sinks.get(&handle) {
            Some(entry) => entry.value().clone(),
            None => {
                log::debug!("Dropping event for unknown {}", handle);
                return false;
            }
        };

        match QuerySnapshot::from_records(records) {
            Ok(snapshot) => {
                let reached = sink.publish(snapshot);
                log::trace!("Delivered event for {} to {} consumer(s)", handle, reached);
            }
            Err(err) => {
                log::warn!("Invalid event for {}: {}", handle, err);
                sink.send(Err(err));
            }
        }
        true
    }

    /// Ends every routed stream with [ErrorKind::ConnectionClosed] and refuses
    /// further inserts.
    pub fn close(&self) {
        let mut closed = self.inner.closed.write();
        if *closed {
            return;
        }
        *closed = true;

        let handles: Vec<ListenerHandle> = self.inner.sinks.iter().map(|e| *e.key()).collect();
        for handle in handles {
            if let Some((_, sink)) = self.inner.sinks.remove(&handle) {
                sink.fail(DocLinkError::new(
                    "Connection is closed",
                    ErrorKind::ConnectionClosed,
                ));
            }
        }
        log::debug!("Listener registry closed");
    }
}
