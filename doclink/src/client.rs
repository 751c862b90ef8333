use crate::common::{Value, DOCUMENT_PATH_FIELD};
use crate::config::{DocLinkConfig, OnErrorCallback, QueryOptions};
use crate::errors::{DocLinkError, DocLinkResult, ErrorKind};
use crate::query::{field, QueryDescriptor};
use crate::reference::{CollectionReference, DocumentReference};
use crate::snapshot::{DocumentSnapshot, QuerySnapshot};
use crate::subscription::{ListenerRegistry, QuerySubscription, SubscriptionMultiplexer};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Entry point of the library: a client bound to one transport connection.
///
/// `DocLink` hands out references and query descriptors, runs one-shot fetches
/// and creates live subscriptions. All live subscriptions share the client's
/// [ListenerRegistry]. Cloning is cheap; all clones share the connection.
///
/// # Examples
///
/// ```rust,ignore
/// use doclink::client::DocLink;
/// use doclink::query::field;
///
/// let db = DocLink::builder().transport(my_transport).build()?;
///
/// let adults = db
///     .collection("users")?
///     .query()
///     .filter(field("age").gte(18))?
///     .order_by("age")?;
///
/// let snapshot = db.fetch_once(&adults).await?;
/// let live = db.subscribe(&adults);
/// ```
#[derive(Clone)]
pub struct DocLink {
    inner: Arc<DocLinkInner>,
}

struct DocLinkInner {
    config: DocLinkConfig,
    multiplexer: SubscriptionMultiplexer,
}

impl DocLink {
    pub fn builder() -> DocLinkBuilder {
        DocLinkBuilder::new()
    }

    /// A reference to the collection at `path`. Queries built from it carry
    /// this client's [QueryOptions].
    pub fn collection(&self, path: &str) -> DocLinkResult<CollectionReference> {
        Ok(CollectionReference::new(path)?.with_options(self.inner.config.query_options()))
    }

    /// A reference to the document at `path`.
    pub fn document(&self, path: &str) -> DocLinkResult<DocumentReference> {
        DocumentReference::new(path)
    }

    /// Runs `query` once and returns its current result set.
    ///
    /// # Errors
    ///
    /// [ErrorKind::FetchFailed] if the transport reports an error,
    /// [ErrorKind::ConnectionClosed] after [disconnect](DocLink::disconnect), or
    /// [ErrorKind::InvalidPath] if the transport returns a malformed record.
    pub async fn fetch_once(&self, query: &QueryDescriptor) -> DocLinkResult<QuerySnapshot> {
        self.ensure_connected()?;

        let payload = query.serialize();
        log::debug!("Fetching '{}'", payload.path());
        let records = self
            .transport()
            .fetch(payload)
            .await
            .map_err(|err| {
                let error = DocLinkError::from_transport(
                    &format!("Failed to fetch '{}'", query.path()),
                    ErrorKind::FetchFailed,
                    err,
                );
                log::error!("{}", error);
                error
            })?;
        QuerySnapshot::from_records(records)
    }

    /// Reads a single document. The snapshot reports
    /// [exists](DocumentSnapshot::exists) `false` when the document is missing.
    pub async fn get_document(&self, reference: &DocumentReference) -> DocLinkResult<DocumentSnapshot> {
        let query = reference
            .parent()
            .query()
            .filter(field(DOCUMENT_PATH_FIELD).eq(Value::reference(reference.path())))?;
        let snapshot = self.fetch_once(&query).await?;

        let found = snapshot
            .iter()
            .find(|document| document.reference() == reference)
            .cloned();
        Ok(found.unwrap_or_else(|| DocumentSnapshot::new(reference.clone(), None)))
    }

    /// Creates a live subscription for `query`. The query is registered with
    /// the transport once the first consumer calls
    /// [listen](QuerySubscription::listen).
    pub fn subscribe(&self, query: &QueryDescriptor) -> QuerySubscription {
        self.inner.multiplexer.subscribe(query)
    }

    /// The table routing push events to live subscriptions. A transport feeds
    /// inbound events into [ListenerRegistry::dispatch].
    pub fn registry(&self) -> &ListenerRegistry {
        self.inner.multiplexer.registry()
    }

    pub fn config(&self) -> &DocLinkConfig {
        &self.inner.config
    }

    /// Tears the connection down. Every live stream ends with
    /// [ErrorKind::ConnectionClosed]; later fetches fail with the same kind.
    pub fn disconnect(&self) {
        log::debug!("Disconnecting");
        self.registry().close();
    }

    pub fn is_disconnected(&self) -> bool {
        self.registry().is_closed()
    }

    fn transport(&self) -> &Arc<dyn Transport> {
        self.inner.multiplexer.transport()
    }

    fn ensure_connected(&self) -> DocLinkResult<()> {
        if self.is_disconnected() {
            log::error!("Client is disconnected");
            return Err(DocLinkError::new(
                "Client is disconnected",
                ErrorKind::ConnectionClosed,
            ));
        }
        Ok(())
    }
}

/// Builder for a [DocLink] client.
///
/// A transport is mandatory. Lifecycle requests of live subscriptions run on a
/// tokio runtime: the one given to [runtime](DocLinkBuilder::runtime), or the
/// one `build` is called from.
#[derive(Default)]
pub struct DocLinkBuilder {
    transport: Option<Arc<dyn Transport>>,
    query_options: QueryOptions,
    on_error: Option<OnErrorCallback>,
    runtime: Option<Handle>,
}

impl DocLinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Same as [transport](DocLinkBuilder::transport) for a transport that is
    /// already shared.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn query_options(mut self, query_options: QueryOptions) -> Self {
        self.query_options = query_options;
        self
    }

    /// Installs the handler receiving errors no consumer can be told about,
    /// such as a failed unregistration.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&DocLinkError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// # Errors
    ///
    /// [ErrorKind::InvalidOperation] without a transport, or without a runtime
    /// when called outside of one.
    pub fn build(self) -> DocLinkResult<DocLink> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                log::error!("DocLink requires a transport");
                return Err(DocLinkError::new(
                    "DocLink requires a transport",
                    ErrorKind::InvalidOperation,
                ));
            }
        };

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|err| {
                log::error!("No tokio runtime available: {}", err);
                DocLinkError::new(
                    &format!("DocLink must be built inside a tokio runtime: {}", err),
                    ErrorKind::InvalidOperation,
                )
            })?,
        };

        let config = DocLinkConfig::from_parts(self.query_options, self.on_error);
        let multiplexer =
            SubscriptionMultiplexer::new(transport, ListenerRegistry::new(), config.clone(), runtime);
        Ok(DocLink {
            inner: Arc::new(DocLinkInner {
                config,
                multiplexer,
            }),
        })
    }
}
