//! Bounded-concurrency, priority-aware, deduplicating download dispatcher.
//!
//! Structured as a single actor task reading from a command channel, the
//! way `ImageLoader::run_worker_loop` is structured in the image-loader
//! examples in this corpus: a `tokio::select!` between inbound commands and
//! semaphore-gated admission of the next queued request. Generalized here
//! from a single FIFO queue to the two-priority discipline and from
//! first-writer-wins dedup to the full multi-subscriber
//! [`DispatchRecord`] model.

mod worker;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::bitmap::Bitmap;
use crate::error::DownloaderError;
use crate::retry::RetryPolicy;

pub use worker::{FetchRequest, Transport};

/// Per-attempt hook that may add or rewrite headers before a request goes
/// out -- e.g. stamping a bearer token or signing a URL. Applied fresh on
/// every retry attempt, not just the first, so a token refreshed mid-backoff
/// is picked up.
pub type AuthenticationTransform = Arc<dyn Fn(&str, &mut Vec<(String, String)>) + Send + Sync>;

/// Priority used both for queue admission order; the high sub-queue drains
/// before the low sub-queue whenever a concurrency slot frees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadPriority {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Queued,
    Running,
    Cancelled,
    Completed,
    Failed,
}

/// An opaque token identifying one subscription, handed back to callers so
/// they can later cancel just their own interest in a URL.
pub type CallerToken = Uuid;

#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Bitmap),
    Failure(DownloaderError),
    Cancelled,
}

pub(crate) struct Subscriber {
    pub(crate) caller_token: CallerToken,
    pub(crate) progress_sink: mpsc::UnboundedSender<f32>,
    pub(crate) completion_sink: oneshot::Sender<Outcome>,
}

pub(crate) struct DispatchRecord {
    pub(crate) url: String,
    pub(crate) priority: DownloadPriority,
    pub(crate) state: DispatchState,
    pub(crate) subscribers: Vec<Subscriber>,
    pub(crate) attempt: u32,
    /// Set once the record is admitted; aborted on cancellation so
    /// in-flight transport is interrupted promptly rather than left to run
    /// to completion after its outcome has become moot.
    pub(crate) task: Option<tokio::task::JoinHandle<()>>,
}

pub(crate) enum Command {
    Submit {
        url: String,
        priority: DownloadPriority,
        caller_token: CallerToken,
        progress_sink: mpsc::UnboundedSender<f32>,
        completion_sink: oneshot::Sender<Outcome>,
    },
    CancelSubscriber {
        url: String,
        caller_token: CallerToken,
    },
    CancelAll {
        url: String,
    },
    SetHeaders {
        headers: Vec<(String, String)>,
    },
    SetAuthenticationTransform {
        transform: Option<AuthenticationTransform>,
    },
    SetRetryPolicy {
        policy: RetryPolicy,
    },
    SetTimeout {
        timeout: Duration,
    },
    SetCellularAllowed {
        allowed: bool,
    },
}

/// A handle to the dispatcher actor. Cheap to clone; all clones share the
/// same command channel and the actor's live stat counters.
#[derive(Clone)]
pub struct Dispatcher {
    command_tx: mpsc::UnboundedSender<Command>,
    active_count: Arc<AtomicU32>,
    queued_count: Arc<AtomicU32>,
    max_concurrent: u32,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_concurrent: u32,
        timeout: Duration,
        retry_policy: RetryPolicy,
        custom_headers: Vec<(String, String)>,
        authentication_transform: Option<AuthenticationTransform>,
        allows_cellular: bool,
    ) -> Self {
        Self::with_transport(
            max_concurrent,
            timeout,
            retry_policy,
            custom_headers,
            authentication_transform,
            allows_cellular,
            Arc::new(worker::ReqwestTransport::new()),
        )
    }

    /// Constructs a dispatcher over a caller-supplied transport; used by
    /// tests to stub network behavior without a real HTTP server.
    #[allow(clippy::too_many_arguments)]
    pub fn with_transport(
        max_concurrent: u32,
        timeout: Duration,
        retry_policy: RetryPolicy,
        custom_headers: Vec<(String, String)>,
        authentication_transform: Option<AuthenticationTransform>,
        allows_cellular: bool,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let active_count = Arc::new(AtomicU32::new(0));
        let queued_count = Arc::new(AtomicU32::new(0));

        tokio::spawn(worker::run_actor_loop(worker::ActorState::new(
            command_rx,
            max_concurrent,
            worker::NetworkSettings {
                timeout,
                retry_policy,
                headers: custom_headers,
                authentication_transform,
                allows_cellular,
            },
            transport,
            active_count.clone(),
            queued_count.clone(),
        )));

        Self {
            command_tx,
            active_count,
            queued_count,
            max_concurrent,
        }
    }

    /// Replaces the custom header set applied to subsequently admitted
    /// requests. Requests already running keep the headers they started
    /// with.
    pub fn set_headers(&self, headers: Vec<(String, String)>) {
        let _ = self.command_tx.send(Command::SetHeaders { headers });
    }

    pub fn set_authentication_transform(&self, transform: Option<AuthenticationTransform>) {
        let _ = self
            .command_tx
            .send(Command::SetAuthenticationTransform { transform });
    }

    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        let _ = self.command_tx.send(Command::SetRetryPolicy { policy });
    }

    pub fn set_timeout(&self, timeout: Duration) {
        let _ = self.command_tx.send(Command::SetTimeout { timeout });
    }

    pub fn set_cellular_allowed(&self, allowed: bool) {
        let _ = self.command_tx.send(Command::SetCellularAllowed { allowed });
    }

    /// Submits a request for `url`. If a record already exists for this
    /// URL (queued or running), the new subscriber is appended to it
    /// rather than creating a second download.
    pub fn submit(
        &self,
        url: impl Into<String>,
        priority: DownloadPriority,
        caller_token: CallerToken,
    ) -> (mpsc::UnboundedReceiver<f32>, oneshot::Receiver<Outcome>) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = oneshot::channel();
        let url = url.into();
        debug!(url = %url, ?priority, "submitting download");
        let _ = self.command_tx.send(Command::Submit {
            url,
            priority,
            caller_token,
            progress_sink: progress_tx,
            completion_sink: completion_tx,
        });
        (progress_rx, completion_rx)
    }

    /// Removes one subscriber's interest in `url`. If the record has no
    /// subscribers left afterward, the record itself is cancelled.
    pub fn cancel(&self, url: impl Into<String>, caller_token: CallerToken) {
        let _ = self.command_tx.send(Command::CancelSubscriber {
            url: url.into(),
            caller_token,
        });
    }

    /// Cancels the whole record unconditionally; every subscriber receives
    /// a terminal `Cancelled` outcome.
    pub fn cancel_all(&self, url: impl Into<String>) {
        let _ = self.command_tx.send(Command::CancelAll { url: url.into() });
    }

    pub fn active_download_count(&self) -> u32 {
        self.active_count.load(Ordering::SeqCst)
    }

    pub fn queued_download_count(&self) -> u32 {
        self.queued_count.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }
}
