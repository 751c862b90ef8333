use crate::errors::{DocLinkError, ErrorKind};
use crate::query::{QueryDescriptor, SerializedQuery};
use crate::subscription::multiplexer::MultiplexerShared;
use crate::subscription::{SnapshotItem, SnapshotSink};
use crate::transport::ListenerHandle;
use futures_util::Stream;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::UnboundedReceiver;

/// Lifecycle of a [QuerySubscription].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// A registration request is in flight.
    Pending,
    /// Registered; push events are routed to the consumers.
    Active,
    /// The last consumer left; the listener is being released.
    Cancelled,
    /// No remote listener exists. The next consumer starts a new cycle.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Pending { cancel_requested: bool },
    Active { handle: ListenerHandle },
    // `restart` is set when a consumer attached while unregistering
    Cancelled { handle: ListenerHandle, restart: bool },
}

struct LiveState {
    phase: Phase,
    sink: Arc<SnapshotSink>,
}

/// A live query shared by any number of consumers.
///
/// The first consumer to [listen](QuerySubscription::listen) registers the
/// query with the transport; consumers attaching before the handle is known
/// share that one registration. When the last consumer goes away the listener
/// is unregistered. Cloning is cheap; all clones drive the same subscription.
///
/// Lifecycle failures never surface from `listen` or from dropping a stream:
/// a rejected registration arrives as a terminal
/// [ErrorKind::RegistrationFailed] item, a rejected unregistration goes to the
/// client's `on_error` handler.
///
/// # Examples
///
/// ```rust,ignore
/// use futures_util::StreamExt;
///
/// let adults = db.collection("users")?.query().filter(field("age").gte(18))?;
/// let subscription = db.subscribe(&adults);
/// let mut stream = subscription.listen();
/// while let Some(snapshot) = stream.next().await {
///     println!("{} adults", snapshot?.len());
/// }
/// ```
#[derive(Clone)]
pub struct QuerySubscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    shared: Arc<MultiplexerShared>,
    descriptor: QueryDescriptor,
    payload: SerializedQuery,
    state: Mutex<LiveState>,
}

impl QuerySubscription {
    pub(crate) fn new(shared: Arc<MultiplexerShared>, descriptor: QueryDescriptor) -> Self {
        let payload = descriptor.serialize();
        QuerySubscription {
            inner: Arc::new(SubscriptionInner {
                shared,
                descriptor,
                payload,
                state: Mutex::new(LiveState {
                    phase: Phase::Closed,
                    sink: Arc::new(SnapshotSink::new()),
                }),
            }),
        }
    }

    /// Attaches a consumer. The stream yields every snapshot pushed from now on
    /// until the consumer drops it.
    pub fn listen(&self) -> SnapshotStream {
        let id = self.inner.shared.next_consumer_id();
        let receiver = self.inner.attach(id);
        SnapshotStream {
            id,
            receiver,
            subscription: self.inner.clone(),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        match self.inner.state.lock().phase {
            Phase::Closed => SubscriptionState::Closed,
            Phase::Pending {
                cancel_requested: false,
            } => SubscriptionState::Pending,
            Phase::Pending {
                cancel_requested: true,
            } => SubscriptionState::Cancelled,
            Phase::Active { .. } => SubscriptionState::Active,
            Phase::Cancelled { .. } => SubscriptionState::Cancelled,
        }
    }

    /// The transport handle, once registration has completed and until the
    /// listener is released.
    pub fn handle(&self) -> Option<ListenerHandle> {
        match self.inner.state.lock().phase {
            Phase::Active { handle } | Phase::Cancelled { handle, .. } => Some(handle),
            _ => None,
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.state.lock().sink.consumer_count()
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.inner.descriptor
    }
}

impl Debug for QuerySubscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("path", &self.inner.payload.path())
            .field("state", &self.state())
            .finish()
    }
}

impl SubscriptionInner {
    fn attach(self: &Arc<Self>, id: u64) -> UnboundedReceiver<SnapshotItem> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Closed => {
                state.sink = Arc::new(SnapshotSink::new());
                state.phase = Phase::Pending {
                    cancel_requested: false,
                };
                log::debug!("Registering live query on '{}'", self.payload.path());
                self.spawn_register(state.sink.clone());
            }
            Phase::Pending { .. } => {
                state.phase = Phase::Pending {
                    cancel_requested: false,
                };
            }
            Phase::Active { .. } => {}
            Phase::Cancelled {
                handle,
                restart: false,
            } => {
                state.sink = Arc::new(SnapshotSink::new());
                state.phase = Phase::Cancelled {
                    handle,
                    restart: true,
                };
            }
            Phase::Cancelled { restart: true, .. } => {}
        }
        state.sink.attach(id)
    }

    fn detach(self: &Arc<Self>, id: u64) {
        let mut state = self.state.lock();
        let attached = state.sink.detach(id).is_some();
        // streams from an earlier cycle are not counted by the current sink,
        // unless that sink was torn down under them
        if !state.sink.is_empty() || (!attached && !state.sink.is_closed()) {
            return;
        }

        match state.phase {
            Phase::Pending { .. } => {
                log::debug!(
                    "Last consumer left '{}' before registration completed",
                    self.payload.path()
                );
                state.phase = Phase::Pending {
                    cancel_requested: true,
                };
            }
            Phase::Active { handle } => {
                log::debug!("Last consumer left {}, unregistering", handle);
                state.phase = Phase::Cancelled {
                    handle,
                    restart: false,
                };
                self.spawn_unregister(handle, state.sink.clone());
            }
            Phase::Cancelled { handle, .. } => {
                state.phase = Phase::Cancelled {
                    handle,
                    restart: false,
                };
            }
            Phase::Closed => {}
        }
    }

    fn spawn_register(self: &Arc<Self>, sink: Arc<SnapshotSink>) {
        let inner = self.clone();
        self.shared.runtime.spawn(async move {
            let result = inner.shared.transport.register(inner.payload.clone()).await;
            inner.on_registered(sink, result);
        });
    }

    fn spawn_unregister(self: &Arc<Self>, handle: ListenerHandle, sink: Arc<SnapshotSink>) {
        let inner = self.clone();
        self.shared.runtime.spawn(async move {
            let result = inner.shared.transport.unregister(handle).await;
            inner.on_unregistered(handle, sink, result);
        });
    }

    fn on_registered(self: &Arc<Self>, sink: Arc<SnapshotSink>, result: anyhow::Result<ListenerHandle>) {
        let mut state = self.state.lock();
        let cancel_requested = match state.phase {
            Phase::Pending { cancel_requested } => cancel_requested,
            other => {
                log::error!("Registration completed in unexpected state {:?}", other);
                return;
            }
        };

        match result {
            Ok(handle) if cancel_requested => {
                log::debug!("Releasing {} registered after the last consumer left", handle);
                state.phase = Phase::Cancelled {
                    handle,
                    restart: false,
                };
                self.spawn_unregister(handle, sink);
            }
            Ok(handle) => match self.shared.registry.insert(handle, sink.clone()) {
                Ok(()) => {
                    log::debug!("Live query on '{}' active as {}", self.payload.path(), handle);
                    state.phase = Phase::Active { handle };
                }
                Err(err) => {
                    sink.fail(err);
                    state.phase = Phase::Cancelled {
                        handle,
                        restart: false,
                    };
                    self.spawn_unregister(handle, sink);
                }
            },
            Err(err) => {
                let error = DocLinkError::from_transport(
                    &format!("Failed to register live query on '{}'", self.payload.path()),
                    ErrorKind::RegistrationFailed,
                    err,
                );
                log::error!("{}", error);
                sink.fail(error);
                state.phase = Phase::Closed;
            }
        }
    }

    fn on_unregistered(
        self: &Arc<Self>,
        handle: ListenerHandle,
        sink: Arc<SnapshotSink>,
        result: anyhow::Result<()>,
    ) {
        {
            let mut state = self.state.lock();
            self.shared.registry.remove(&handle, &sink);
            sink.close();

            let restart = matches!(state.phase, Phase::Cancelled { restart: true, .. })
                && !state.sink.is_empty();
            if restart {
                log::debug!("Re-registering live query on '{}'", self.payload.path());
                state.phase = Phase::Pending {
                    cancel_requested: false,
                };
                self.spawn_register(state.sink.clone());
            } else {
                log::debug!("{} released", handle);
                state.phase = Phase::Closed;
            }
        }

        // the handler runs outside the state lock
        if let Err(err) = result {
            let error = DocLinkError::from_transport(
                &format!("Failed to unregister {}", handle),
                ErrorKind::UnregistrationFailed,
                err,
            );
            log::warn!("{}", error);
            self.shared.config.emit_error(&error);
        }
    }
}

/// One consumer's view of a [QuerySubscription].
///
/// Yields `Ok(snapshot)` for every pushed result set. An `Err` item is either
/// terminal (registration rejected, connection closed; the stream ends right
/// after) or a single malformed event. Dropping the stream detaches the
/// consumer.
pub struct SnapshotStream {
    id: u64,
    receiver: UnboundedReceiver<SnapshotItem>,
    subscription: Arc<SubscriptionInner>,
}

impl SnapshotStream {
    /// Detaches the consumer. Same as dropping the stream.
    pub fn close(self) {}
}

impl Stream for SnapshotStream {
    type Item = SnapshotItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        self.subscription.detach(self.id);
    }
}

impl Debug for SnapshotStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStream").field("id", &self.id).finish()
    }
}
