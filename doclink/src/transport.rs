//! The boundary to the remote database.
//!
//! doclink never talks to the network itself. A [Transport] carries registration,
//! unregistration and fetch requests; inbound push events are handed back by the
//! transport through [`ListenerRegistry::dispatch`](crate::subscription::ListenerRegistry::dispatch).
//!
//! # Example
//!
//! ```rust,ignore
//! use doclink::transport::{ListenerHandle, Transport};
//!
//! struct WsTransport { /* socket, request ids, ... */ }
//!
//! #[async_trait::async_trait]
//! impl Transport for WsTransport {
//!     async fn register(&self, payload: SerializedQuery) -> anyhow::Result<ListenerHandle> {
//!         let id = self.request("listen", &payload).await?;
//!         Ok(ListenerHandle::new(id))
//!     }
//!     // ...
//! }
//! ```

use crate::query::SerializedQuery;
use crate::snapshot::DocumentRecord;
use std::fmt::{Display, Formatter};

/// Opaque identifier the transport assigns to a live query registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    pub fn new(id: u64) -> Self {
        ListenerHandle(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Display for ListenerHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Remote operations doclink relies on.
///
/// Implementations must be safe to call concurrently; calls for unrelated
/// subscriptions are issued without waiting for each other. Connection-level
/// timeouts are the transport's concern.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Starts listening to a query and returns the handle push events will be
    /// addressed with.
    async fn register(&self, payload: SerializedQuery) -> anyhow::Result<ListenerHandle>;

    /// Stops a listener started by [register](Transport::register).
    async fn unregister(&self, handle: ListenerHandle) -> anyhow::Result<()>;

    /// Runs a query once and returns its documents in result order.
    async fn fetch(&self, payload: SerializedQuery) -> anyhow::Result<Vec<DocumentRecord>>;
}
