use crate::config::DocLinkConfig;
use crate::query::QueryDescriptor;
use crate::subscription::{ListenerRegistry, QuerySubscription};
use crate::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Bridges query descriptors to live subscriptions over one shared transport.
///
/// Every subscription created here registers through the same transport and
/// routes its events through the same [ListenerRegistry].
#[derive(Clone)]
pub struct SubscriptionMultiplexer {
    shared: Arc<MultiplexerShared>,
}

pub(crate) struct MultiplexerShared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: ListenerRegistry,
    pub(crate) config: DocLinkConfig,
    pub(crate) runtime: Handle,
    next_consumer: AtomicU64,
}

impl MultiplexerShared {
    pub(crate) fn next_consumer_id(&self) -> u64 {
        self.next_consumer.fetch_add(1, Ordering::Relaxed)
    }
}

impl SubscriptionMultiplexer {
    /// Creates a multiplexer whose registration requests run on `runtime`.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: ListenerRegistry,
        config: DocLinkConfig,
        runtime: Handle,
    ) -> Self {
        SubscriptionMultiplexer {
            shared: Arc::new(MultiplexerShared {
                transport,
                registry,
                config,
                runtime,
                next_consumer: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a subscription for `descriptor`. Nothing is sent to the
    /// transport until the first consumer calls
    /// [listen](QuerySubscription::listen).
    pub fn subscribe(&self, descriptor: &QueryDescriptor) -> QuerySubscription {
        QuerySubscription::new(self.shared.clone(), descriptor.clone())
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.shared.registry
    }

    pub fn config(&self) -> &DocLinkConfig {
        &self.shared.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.shared.transport
    }
}
