//! The dispatcher's single-actor task loop: a `tokio::select!` between
//! inbound commands and semaphore-gated admission, mirroring
//! `ImageLoader::run_worker_loop` in this corpus's image-loader examples.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{DownloaderError, DownloaderResult};
use crate::retry::RetryPolicy;

use super::{AuthenticationTransform, CallerToken, Command, DispatchRecord, DispatchState, DownloadPriority, Outcome};

/// A fetched transport response, not yet decoded.
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
}

/// One attempt's worth of transport parameters: the per-attempt timeout
/// (§5: elapsed retry delays are not counted against it) plus headers
/// already run through the configured authentication transform.
pub struct FetchRequest {
    pub url: String,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
}

/// Abstraction over the shared HTTP transport so tests can stub network
/// behavior. A real implementation wraps a single process-wide
/// `reqwest::Client`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> DownloaderResult<FetchedBytes>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .expect("reqwest client builds with default config"),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: &FetchRequest) -> DownloaderResult<FetchedBytes> {
        let mut builder = self.client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await.map_err(DownloaderError::from)?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(DownloaderError::not_found(&request.url));
        }
        if !status.is_success() {
            return Err(DownloaderError::from_status(status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(DownloaderError::from)?;
        Ok(FetchedBytes {
            bytes: bytes.to_vec(),
        })
    }
}

/// Internal loopback message: a spawned download task reports its outcome
/// back to the actor so record bookkeeping (removal, subscriber fan-out,
/// slot release) stays serialized through the single actor loop.
pub(crate) enum Internal {
    Finished { url: String, outcome: Outcome },
}

/// Mutable per-attempt transport parameters, updated in place by the
/// `set_*` admin commands. Snapshotted (cloned) at admission time, so
/// in-flight downloads are unaffected by a setting changed mid-flight --
/// only subsequently admitted requests see the new values.
pub(crate) struct NetworkSettings {
    pub(crate) timeout: Duration,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) authentication_transform: Option<AuthenticationTransform>,
    /// Stored for API parity with the source platform's cellular-access
    /// toggle; there is no portable cross-platform equivalent to enforce
    /// it against, so it is never consulted in the request path.
    #[allow(dead_code)]
    pub(crate) allows_cellular: bool,
}

pub(crate) struct ActorState {
    command_rx: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    semaphore: Arc<Semaphore>,
    high_queue: VecDeque<String>,
    low_queue: VecDeque<String>,
    records: HashMap<String, DispatchRecord>,
    active_count: Arc<AtomicU32>,
    queued_count: Arc<AtomicU32>,
    transport: Arc<dyn Transport>,
    settings: NetworkSettings,
}

impl ActorState {
    pub(crate) fn new(
        command_rx: mpsc::UnboundedReceiver<Command>,
        max_concurrent: u32,
        settings: NetworkSettings,
        transport: Arc<dyn Transport>,
        active_count: Arc<AtomicU32>,
        queued_count: Arc<AtomicU32>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            command_rx,
            internal_tx,
            internal_rx,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1) as usize)),
            high_queue: VecDeque::new(),
            low_queue: VecDeque::new(),
            records: HashMap::new(),
            active_count,
            queued_count,
            transport,
            settings,
        }
    }

    fn next_queued_url(&mut self) -> Option<String> {
        self.high_queue
            .pop_front()
            .or_else(|| self.low_queue.pop_front())
    }

    fn refresh_queued_count(&self) {
        let n = (self.high_queue.len() + self.low_queue.len()) as u32;
        self.queued_count.store(n, Ordering::SeqCst);
    }
}

/// Runs until every `Dispatcher` handle (and thus every `Command` sender)
/// is dropped.
pub(crate) async fn run_actor_loop(mut state: ActorState) {
    loop {
        tokio::select! {
            maybe_cmd = state.command_rx.recv() => {
                match maybe_cmd {
                    Some(cmd) => handle_command(&mut state, cmd),
                    None => return,
                }
            }
            Some(internal) = state.internal_rx.recv() => {
                handle_internal(&mut state, internal);
            }
            permit = acquire_if_any_queued(&state) => {
                if let Some(permit) = permit {
                    if let Some(url) = state.next_queued_url() {
                        state.refresh_queued_count();
                        admit(&mut state, url, permit);
                    }
                }
            }
        }
    }
}

/// Only attempts to acquire a permit when something is actually queued, so
/// the select! doesn't spin grabbing permits for an empty queue.
async fn acquire_if_any_queued(state: &ActorState) -> Option<tokio::sync::OwnedSemaphorePermit> {
    if state.high_queue.is_empty() && state.low_queue.is_empty() {
        std::future::pending().await
    } else {
        state.semaphore.clone().acquire_owned().await.ok()
    }
}

fn handle_command(state: &mut ActorState, cmd: Command) {
    match cmd {
        Command::Submit {
            url,
            priority,
            caller_token,
            progress_sink,
            completion_sink,
        } => submit(state, url, priority, caller_token, progress_sink, completion_sink),
        Command::CancelSubscriber { url, caller_token } => {
            cancel_subscriber(state, &url, caller_token)
        }
        Command::CancelAll { url } => cancel_all(state, &url),
        Command::SetHeaders { headers } => state.settings.headers = headers,
        Command::SetAuthenticationTransform { transform } => {
            state.settings.authentication_transform = transform
        }
        Command::SetRetryPolicy { policy } => state.settings.retry_policy = policy,
        Command::SetTimeout { timeout } => state.settings.timeout = timeout,
        Command::SetCellularAllowed { allowed } => state.settings.allows_cellular = allowed,
    }
}

fn handle_internal(state: &mut ActorState, internal: Internal) {
    match internal {
        Internal::Finished { url, outcome } => finish(state, &url, outcome),
    }
}

fn submit(
    state: &mut ActorState,
    url: String,
    priority: DownloadPriority,
    caller_token: CallerToken,
    progress_sink: mpsc::UnboundedSender<f32>,
    completion_sink: tokio::sync::oneshot::Sender<Outcome>,
) {
    let subscriber = super::Subscriber {
        caller_token,
        progress_sink,
        completion_sink,
    };
    if let Some(record) = state.records.get_mut(&url) {
        debug!(url = %url, "deduplicating against in-flight record");
        record.subscribers.push(subscriber);
        return;
    }
    let record = DispatchRecord {
        url: url.clone(),
        priority,
        state: DispatchState::Queued,
        subscribers: vec![subscriber],
        attempt: 0,
        task: None,
    };
    state.records.insert(url.clone(), record);
    match priority {
        DownloadPriority::High => state.high_queue.push_back(url),
        DownloadPriority::Low => state.low_queue.push_back(url),
    }
    state.refresh_queued_count();
}

fn cancel_subscriber(state: &mut ActorState, url: &str, caller_token: CallerToken) {
    let should_cancel_record = if let Some(record) = state.records.get_mut(url) {
        if let Some(pos) = record
            .subscribers
            .iter()
            .position(|s| s.caller_token == caller_token)
        {
            record.subscribers.remove(pos);
        }
        record.subscribers.is_empty()
    } else {
        false
    };
    if should_cancel_record {
        cancel_all(state, url);
    }
}

fn cancel_all(state: &mut ActorState, url: &str) {
    state.high_queue.retain(|u| u != url);
    state.low_queue.retain(|u| u != url);
    state.refresh_queued_count();
    if let Some(mut record) = state.records.remove(url) {
        record.state = DispatchState::Cancelled;
        if let Some(task) = record.task.take() {
            task.abort();
        }
        for subscriber in record.subscribers.drain(..) {
            let _ = subscriber.completion_sink.send(Outcome::Cancelled);
        }
    }
}

/// Delivers a terminal outcome to every subscriber of `url`'s record,
/// removes the record, and frees its admission slot.
fn finish(state: &mut ActorState, url: &str, outcome: Outcome) {
    state.active_count.fetch_sub(1, Ordering::SeqCst);
    let Some(mut record) = state.records.remove(url) else {
        return;
    };
    record.state = match &outcome {
        Outcome::Success(_) => DispatchState::Completed,
        Outcome::Failure(_) => DispatchState::Failed,
        Outcome::Cancelled => DispatchState::Cancelled,
    };
    // A terminal outcome implies a final 1.0 progress tick for completion,
    // or no further progress at all for failure/cancellation.
    let is_success = matches!(outcome, Outcome::Success(_));
    for subscriber in record.subscribers.drain(..) {
        if is_success {
            let _ = subscriber.progress_sink.send(1.0);
        }
        let _ = subscriber.completion_sink.send(outcome.clone());
    }
}

fn admit(state: &mut ActorState, url: String, permit: tokio::sync::OwnedSemaphorePermit) {
    let Some(record) = state.records.get_mut(&url) else {
        return;
    };
    record.state = DispatchState::Running;
    state.active_count.fetch_add(1, Ordering::SeqCst);

    let transport = state.transport.clone();
    let timeout = state.settings.timeout;
    let retry_policy = state.settings.retry_policy;
    let base_headers = state.settings.headers.clone();
    let auth_transform = state.settings.authentication_transform.clone();
    let internal_tx = state.internal_tx.clone();

    // Each running record executes on its own task so the actor loop stays
    // free to admit further work and process cancellation commands; the
    // permit is held for the task's lifetime and released on drop.
    let task_url = url.clone();
    let handle = tokio::spawn(async move {
        let _permit = permit;
        let outcome = run_download(
            &transport,
            &task_url,
            timeout,
            retry_policy,
            &base_headers,
            auth_transform.as_ref(),
        )
        .await;
        let _ = internal_tx.send(Internal::Finished {
            url: task_url,
            outcome,
        });
    });
    if let Some(record) = state.records.get_mut(&url) {
        record.task = Some(handle);
    }
}

async fn run_download(
    transport: &Arc<dyn Transport>,
    url: &str,
    timeout: Duration,
    retry_policy: RetryPolicy,
    base_headers: &[(String, String)],
    auth_transform: Option<&AuthenticationTransform>,
) -> Outcome {
    let mut attempt: u32 = 0;
    loop {
        let started = Instant::now();
        let mut headers = base_headers.to_vec();
        if let Some(transform) = auth_transform {
            transform(url, &mut headers);
        }
        let request = FetchRequest {
            url: url.to_string(),
            timeout,
            headers,
        };
        match transport.fetch(&request).await {
            Ok(fetched) => match crate::codec::decode_any(&fetched.bytes) {
                Ok(bitmap) => return Outcome::Success(bitmap),
                Err(decode_err) => return Outcome::Failure(decode_err),
            },
            Err(err) => {
                if retry_policy.should_retry(&err, attempt, url) {
                    let delay = retry_policy.delay(attempt + 1);
                    warn!(url, attempt, elapsed_ms = started.elapsed().as_millis() as u64, "retrying after error: {err}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Outcome::Failure(err);
            }
        }
    }
}
