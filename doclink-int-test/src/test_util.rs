use async_trait::async_trait;
use doclink::client::DocLink;
use doclink::common::{Value, DOCUMENT_PATH_FIELD, PARAM_LIMIT, PARAM_WHERE};
use doclink::config::QueryOptions;
use doclink::doc;
use doclink::errors::{DocLinkError, DocLinkResult, ErrorKind};
use doclink::query::SerializedQuery;
use doclink::snapshot::DocumentRecord;
use doclink::subscription::{QuerySubscription, SnapshotItem, SnapshotStream, SubscriptionState};
use doclink::transport::{ListenerHandle, Transport};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;

/// How long helpers wait for asynchronous effects before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs a test between a setup and a teardown step.
pub fn run_test<B, T, A>(before: B, test: T, after: A)
where
    B: FnOnce() -> DocLinkResult<TestContext>,
    T: FnOnce(TestContext) -> DocLinkResult<()>,
    A: FnOnce(TestContext) -> DocLinkResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };
    let test_result = test(ctx.clone());
    let after_result = after(ctx);

    if let Err(e) = test_result {
        panic!("Test failed: {:?}", e);
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

/// A client wired to a [MockTransport], plus the runtime driving it.
#[derive(Clone)]
pub struct TestContext {
    runtime: Arc<Runtime>,
    transport: MockTransport,
    db: DocLink,
    reported: Arc<Mutex<Vec<DocLinkError>>>,
}

impl TestContext {
    pub fn db(&self) -> &DocLink {
        &self.db
    }

    pub fn transport(&self) -> &MockTransport {
        &self.transport
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Errors handed to the client's `on_error` handler so far.
    pub fn reported_errors(&self) -> Vec<DocLinkError> {
        self.reported.lock().clone()
    }

    /// Pushes a result set for `handle` the way a transport would.
    pub fn push(&self, handle: ListenerHandle, records: Vec<DocumentRecord>) -> bool {
        self.db.registry().dispatch(handle, records)
    }

    /// The next stream item, or `None` if the stream ended or nothing arrived
    /// within [WAIT_TIMEOUT].
    pub fn next(&self, stream: &mut SnapshotStream) -> Option<SnapshotItem> {
        self.block_on(async {
            tokio::time::timeout(WAIT_TIMEOUT, stream.next())
                .await
                .ok()
                .flatten()
        })
    }

    /// `true` if no item arrives within `wait`.
    pub fn is_quiet(&self, stream: &mut SnapshotStream, wait: Duration) -> bool {
        self.block_on(async { tokio::time::timeout(wait, stream.next()).await.is_err() })
    }
}

pub fn create_test_context() -> DocLinkResult<TestContext> {
    create_test_context_with(QueryOptions::default())
}

pub fn create_test_context_with(options: QueryOptions) -> DocLinkResult<TestContext> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| {
            DocLinkError::new(
                &format!("Failed to start runtime: {}", e),
                ErrorKind::InternalError,
            )
        })?;

    let transport = MockTransport::new();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    let db = DocLink::builder()
        .transport(transport.clone())
        .query_options(options)
        .on_error(move |err| sink.lock().push(err.clone()))
        .runtime(runtime.handle().clone())
        .build()?;

    Ok(TestContext {
        runtime: Arc::new(runtime),
        transport,
        db,
        reported,
    })
}

pub fn cleanup(ctx: TestContext) -> DocLinkResult<()> {
    ctx.db().disconnect();
    Ok(())
}

/// Polls `check` until it holds, failing the test after [WAIT_TIMEOUT].
pub fn wait_until<F: Fn() -> bool>(check: F) {
    awaitility::at_most(WAIT_TIMEOUT).until(check);
}

pub fn wait_for_state(subscription: &QuerySubscription, state: SubscriptionState) {
    wait_until(|| subscription.state() == state);
}

pub fn user(id: &str, name: &str, age: i64) -> DocumentRecord {
    DocumentRecord::new(format!("users/{}", id), Some(doc! { "name": name, "age": age }))
}

/// Scripted in-memory transport.
///
/// Registrations and unregistrations can be held open and released one at a
/// time, every call is recorded, and each operation can be told to fail.
/// `fetch` serves the documents added with [put](MockTransport::put), honouring
/// equality filters and `limit`.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    next_handle: AtomicU64,
    released: Mutex<Vec<u64>>,
    reuse_handles: AtomicBool,
    registered: Mutex<Vec<SerializedQuery>>,
    unregistered: Mutex<Vec<ListenerHandle>>,
    fetched: Mutex<Vec<SerializedQuery>>,
    documents: Mutex<Vec<DocumentRecord>>,
    register_gate: Gate,
    unregister_gate: Gate,
    fail_register: AtomicBool,
    fail_unregister: AtomicBool,
    fail_fetch: AtomicBool,
}

struct Gate {
    held: AtomicBool,
    permits: Semaphore,
}

impl Default for Gate {
    fn default() -> Self {
        Gate {
            held: AtomicBool::new(false),
            permits: Semaphore::new(0),
        }
    }
}

impl Gate {
    async fn pass(&self) -> anyhow::Result<()> {
        if self.held.load(Ordering::SeqCst) {
            self.permits.acquire().await?.forget();
        }
        Ok(())
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, record: DocumentRecord) {
        self.inner.documents.lock().push(record);
    }

    /// Makes every later registration wait for [release_registration](MockTransport::release_registration).
    pub fn hold_registrations(&self) {
        self.inner.register_gate.held.store(true, Ordering::SeqCst);
    }

    pub fn release_registration(&self) {
        self.inner.register_gate.permits.add_permits(1);
    }

    /// Makes every later unregistration wait for [release_unregistration](MockTransport::release_unregistration).
    pub fn hold_unregistrations(&self) {
        self.inner.unregister_gate.held.store(true, Ordering::SeqCst);
    }

    pub fn release_unregistration(&self) {
        self.inner.unregister_gate.permits.add_permits(1);
    }

    /// Hands released handle ids out again. A handle counts as released as soon
    /// as its `unregister` call arrives, before the call returns.
    pub fn reuse_handles(&self, reuse: bool) {
        self.inner.reuse_handles.store(reuse, Ordering::SeqCst);
    }

    pub fn fail_registrations(&self, fail: bool) {
        self.inner.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unregistrations(&self, fail: bool) {
        self.inner.fail_unregister.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.inner.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Payloads of every `register` call, including those still held.
    pub fn registrations(&self) -> Vec<SerializedQuery> {
        self.inner.registered.lock().clone()
    }

    pub fn register_count(&self) -> usize {
        self.inner.registered.lock().len()
    }

    /// Handles of every `unregister` call, including those still held.
    pub fn unregistrations(&self) -> Vec<ListenerHandle> {
        self.inner.unregistered.lock().clone()
    }

    pub fn fetches(&self) -> Vec<SerializedQuery> {
        self.inner.fetched.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn register(&self, payload: SerializedQuery) -> anyhow::Result<ListenerHandle> {
        log::debug!("mock register on '{}'", payload.path());
        self.inner.registered.lock().push(payload);
        self.inner.register_gate.pass().await?;
        if self.inner.fail_register.load(Ordering::SeqCst) {
            anyhow::bail!("listen rejected by server");
        }
        let reused = if self.inner.reuse_handles.load(Ordering::SeqCst) {
            self.inner.released.lock().pop()
        } else {
            None
        };
        let id = match reused {
            Some(id) => id,
            None => self.inner.next_handle.fetch_add(1, Ordering::SeqCst) + 1,
        };
        Ok(ListenerHandle::new(id))
    }

    async fn unregister(&self, handle: ListenerHandle) -> anyhow::Result<()> {
        log::debug!("mock unregister {}", handle);
        self.inner.unregistered.lock().push(handle);
        self.inner.released.lock().push(handle.id());
        self.inner.unregister_gate.pass().await?;
        if self.inner.fail_unregister.load(Ordering::SeqCst) {
            anyhow::bail!("unknown listener {}", handle);
        }
        Ok(())
    }

    async fn fetch(&self, payload: SerializedQuery) -> anyhow::Result<Vec<DocumentRecord>> {
        log::debug!("mock fetch on '{}'", payload.path());
        self.inner.fetched.lock().push(payload.clone());
        if self.inner.fail_fetch.load(Ordering::SeqCst) {
            anyhow::bail!("fetch timed out");
        }

        let prefix = format!("{}/", payload.path());
        let mut results: Vec<DocumentRecord> = self
            .inner
            .documents
            .lock()
            .iter()
            .filter(|record| {
                record
                    .path
                    .strip_prefix(&prefix)
                    .map_or(false, |id| !id.contains('/'))
            })
            .filter(|record| matches_filters(record, &payload))
            .cloned()
            .collect();

        if let Some(Value::I64(limit)) = payload.parameter(PARAM_LIMIT) {
            results.truncate(*limit as usize);
        }
        Ok(results)
    }
}

// equality filters only; other operators are ignored
fn matches_filters(record: &DocumentRecord, payload: &SerializedQuery) -> bool {
    let filters = match payload.parameter(PARAM_WHERE).and_then(Value::as_array) {
        Some(filters) => filters,
        None => return true,
    };

    filters.iter().all(|filter| match filter.as_array().map(Vec::as_slice) {
        Some([Value::String(field), Value::String(op), expected]) if op == "==" => {
            if field == DOCUMENT_PATH_FIELD {
                expected.as_reference() == Some(&record.path)
            } else {
                record
                    .data
                    .as_ref()
                    .map_or(false, |data| &data.get(field) == expected)
            }
        }
        _ => true,
    })
}
