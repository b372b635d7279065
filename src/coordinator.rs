//! Orchestrates the cache -> disk -> network lookup chain, owns the three
//! subsystem instances, and fans out to registered observers.
//!
//! Shaped after `commy::manager::core::SharedFileManager`: a struct owning
//! its subsystem instances behind `Arc`s, an async constructor, and
//! administrative operations that mutate shared state behind locks.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use std::time::Duration;

use crate::cache::{CacheTier, EvictedEntry, MemoryCache};
use crate::config::Configuration;
use crate::disk_store::DiskStore;
use crate::dispatcher::{AuthenticationTransform, CallerToken, Dispatcher, DownloadPriority, Outcome};
use crate::error::DownloaderError;
use crate::observer::Observer;
use crate::retry::RetryPolicy;

/// Delivered exactly once per subscription: either the bitmap plus
/// provenance flags, or a terminal error.
pub enum Completion {
    Success {
        bitmap: crate::bitmap::Bitmap,
        from_cache: bool,
        from_storage: bool,
    },
    Failure(DownloaderError),
}

pub struct RequestOptions {
    pub update_tier: CacheTier,
    pub download_priority: DownloadPriority,
    /// Whether to persist a network fetch to disk. `None` defers to the
    /// active configuration's `StorageConfig::save_by_default`.
    pub save_to_disk: Option<bool>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            update_tier: CacheTier::High,
            download_priority: DownloadPriority::Low,
            save_to_disk: None,
        }
    }
}

struct Subsystems {
    cache: Arc<MemoryCache>,
    disk: Arc<DiskStore>,
    dispatcher: Arc<Dispatcher>,
    save_by_default: bool,
}

/// The coordinating core. Cheap to clone (an `Arc` internally would be the
/// typical way to share one instance across callers; `Coordinator` itself
/// holds its subsystems behind `Arc`s so a `&Coordinator` is enough).
pub struct Coordinator {
    subsystems: RwLock<Subsystems>,
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

fn build_subsystems(config: &Configuration) -> Subsystems {
    let (eviction_tx, eviction_rx) = mpsc::unbounded_channel();
    let cache = Arc::new(MemoryCache::new(
        config.cache.high_tier_limit,
        config.cache.low_tier_limit,
        config.cache.clear_low_on_pressure,
        config.cache.clear_all_on_pressure,
        eviction_tx,
    ));
    let disk = Arc::new(DiskStore::new(
        config.storage.root_path.clone(),
        config.storage.identifier.clone(),
        config.storage.path_layout.clone(),
        config.storage.codec.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        config.network.max_concurrent,
        config.network.timeout,
        config.network.retry_policy,
        config.network.custom_headers.clone(),
        config.network.authentication_transform.clone(),
        config.network.allows_cellular,
    ));

    spawn_eviction_persister(disk.clone(), eviction_rx);

    Subsystems {
        cache,
        disk,
        dispatcher,
        save_by_default: config.storage.save_by_default,
    }
}

/// Consumes the cache's high-tier eviction channel and persists evicted
/// bitmaps to disk, the delegate-callback shape described for cache ->
/// coordinator eviction notifications.
fn spawn_eviction_persister(disk: Arc<DiskStore>, mut rx: mpsc::UnboundedReceiver<EvictedEntry>) {
    tokio::spawn(async move {
        while let Some(EvictedEntry { url, bitmap }) = rx.recv().await {
            if let Err(err) = disk.write(&url, &bitmap).await {
                warn!(url = %url, error = %err, "failed to persist evicted bitmap to disk");
            }
        }
    });
}

impl Coordinator {
    pub fn new(config: Configuration) -> Self {
        info!("coordinator configured");
        Self {
            subsystems: RwLock::new(build_subsystems(&config)),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Process-wide default instance, built from `Configuration::default()`
    /// on first access. Callers needing a distinct instance should
    /// construct one via [`Coordinator::new`] directly.
    pub fn shared() -> &'static Coordinator {
        static DEFAULT: OnceCell<Coordinator> = OnceCell::new();
        DEFAULT.get_or_init(|| Coordinator::new(Configuration::default()))
    }

    /// Returns the coordinator instance registered under `key`, constructing
    /// it from `build` on first request. A `Configuration` cannot itself be
    /// hashed (`StorageConfig` holds `Arc<dyn Trait>` fields), so the caller
    /// supplies its own fingerprint -- typically a string derived from the
    /// fields that actually vary between instances, e.g. the storage root.
    /// Distinct keys get distinct, independently-owned coordinators; the
    /// same key always returns the same shared instance.
    pub fn instance_for(key: impl Into<String>, build: impl FnOnce() -> Configuration) -> Arc<Coordinator> {
        static REGISTRY: OnceCell<std::sync::Mutex<std::collections::HashMap<String, Arc<Coordinator>>>> =
            OnceCell::new();
        let registry = REGISTRY.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
        let mut guard = registry.lock().expect("coordinator registry mutex poisoned");
        guard
            .entry(key.into())
            .or_insert_with(|| Arc::new(Coordinator::new(build())))
            .clone()
    }

    /// Rebuilds the memory cache, disk store, and dispatcher from a new
    /// configuration. In-flight dispatches under the old dispatcher
    /// complete or fail normally since `Arc`s to it may still be briefly
    /// alive in spawned tasks; subsequent requests use the new instances.
    /// Cache entries are not migrated.
    pub async fn configure(&self, config: Configuration) {
        info!("coordinator reconfigured");
        let mut subsystems = self.subsystems.write().await;
        *subsystems = build_subsystems(&config);
    }

    pub async fn add_observer(&self, observer: Arc<dyn Observer>) {
        self.observers.write().await.push(observer);
    }

    pub async fn remove_observer(&self, observer: &Arc<dyn Observer>) {
        let mut observers = self.observers.write().await;
        observers.retain(|o| !Arc::ptr_eq(o, observer));
    }

    async fn notify_will_start(&self, url: &str) {
        for observer in self.observers.read().await.iter() {
            observer.will_start(url);
        }
    }

    async fn notify_progress(&self, url: &str, value: f32) {
        for observer in self.observers.read().await.iter() {
            observer.progress(url, value);
        }
    }

    async fn notify_did_load(&self, url: &str, from_cache: bool, from_storage: bool) {
        for observer in self.observers.read().await.iter() {
            observer.did_load(url, from_cache, from_storage);
        }
    }

    async fn notify_did_fail(&self, url: &str, error: &DownloaderError) {
        for observer in self.observers.read().await.iter() {
            observer.did_fail(url, error);
        }
    }

    /// The cache -> disk -> network lookup chain. `caller_token` is an
    /// opaque handle the caller can later pass to [`Coordinator::cancel`].
    /// `progress_sink`, if given, receives the same progress stream observers
    /// see via [`Observer::progress`].
    pub async fn request(
        &self,
        url: &str,
        options: RequestOptions,
        progress_sink: Option<mpsc::UnboundedSender<f32>>,
        caller_token: CallerToken,
    ) -> Completion {
        if url.trim().is_empty() {
            return Completion::Failure(DownloaderError::invalid_url("url is empty"));
        }
        self.notify_will_start(url).await;

        let (cache, disk, dispatcher, save_by_default) = {
            let subsystems = self.subsystems.read().await;
            (
                subsystems.cache.clone(),
                subsystems.disk.clone(),
                subsystems.dispatcher.clone(),
                subsystems.save_by_default,
            )
        };

        if let Some(bitmap) = cache.get(url).await {
            debug!(url, "cache hit");
            self.deliver_progress(url, 1.0, progress_sink.as_ref()).await;
            self.notify_did_load(url, true, false).await;
            return Completion::Success {
                bitmap,
                from_cache: true,
                from_storage: false,
            };
        }

        if disk.has(url).await {
            match disk.read(url).await {
                Ok(Some(bitmap)) => {
                    debug!(url, "disk hit");
                    cache.put(url, bitmap.clone(), options.update_tier).await;
                    self.deliver_progress(url, 1.0, progress_sink.as_ref()).await;
                    self.notify_did_load(url, false, true).await;
                    return Completion::Success {
                        bitmap,
                        from_cache: false,
                        from_storage: true,
                    };
                }
                Ok(None) => {
                    // Raced with an external remove between `has` and
                    // `read`; fall through to network like any other miss.
                }
                Err(err) => {
                    warn!(url, error = %err, "disk read/decode failed, falling through to network");
                }
            }
        }

        self.fetch_from_network(
            url,
            &options,
            save_by_default,
            progress_sink,
            caller_token,
            cache,
            disk,
            dispatcher,
        )
        .await
    }

    /// Identical to [`Coordinator::request`] but skips the cache and disk
    /// probes, going directly to the dispatcher; on success, existing
    /// cache and disk entries for the URL are overwritten.
    pub async fn force_reload(
        &self,
        url: &str,
        options: RequestOptions,
        progress_sink: Option<mpsc::UnboundedSender<f32>>,
        caller_token: CallerToken,
    ) -> Completion {
        if url.trim().is_empty() {
            return Completion::Failure(DownloaderError::invalid_url("url is empty"));
        }
        self.notify_will_start(url).await;
        let (cache, disk, dispatcher, save_by_default) = {
            let subsystems = self.subsystems.read().await;
            (
                subsystems.cache.clone(),
                subsystems.disk.clone(),
                subsystems.dispatcher.clone(),
                subsystems.save_by_default,
            )
        };
        self.fetch_from_network(
            url,
            &options,
            save_by_default,
            progress_sink,
            caller_token,
            cache,
            disk,
            dispatcher,
        )
        .await
    }

    /// Forwards one progress value to both the observer fan-out and the
    /// caller's own sink, if given.
    async fn deliver_progress(&self, url: &str, value: f32, progress_sink: Option<&mpsc::UnboundedSender<f32>>) {
        self.notify_progress(url, value).await;
        if let Some(sink) = progress_sink {
            let _ = sink.send(value);
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_from_network(
        &self,
        url: &str,
        options: &RequestOptions,
        save_by_default: bool,
        progress_sink: Option<mpsc::UnboundedSender<f32>>,
        caller_token: CallerToken,
        cache: Arc<MemoryCache>,
        disk: Arc<DiskStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Completion {
        let (mut progress_rx, mut completion_rx) =
            dispatcher.submit(url, options.download_priority, caller_token);

        // Drain dispatcher progress concurrently with awaiting the terminal
        // outcome, forwarding each value to observers and the caller's own
        // sink, so progress is delivered even though `completion_rx` alone
        // would otherwise be the only thing awaited here.
        let outcome = loop {
            tokio::select! {
                biased;
                progress = progress_rx.recv() => {
                    match progress {
                        Some(value) => self.deliver_progress(url, value, progress_sink.as_ref()).await,
                        None => {}
                    }
                }
                result = &mut completion_rx => {
                    break result;
                }
            }
        };

        match outcome {
            Ok(Outcome::Success(bitmap)) => {
                cache.put(url, bitmap.clone(), options.update_tier).await;
                if options.save_to_disk.unwrap_or(save_by_default) {
                    let disk = disk.clone();
                    let url_for_write = url.to_string();
                    let bitmap_for_write = bitmap.clone();
                    tokio::spawn(async move {
                        if let Err(err) = disk.write(&url_for_write, &bitmap_for_write).await {
                            warn!(url = %url_for_write, error = %err, "failed to persist fetched bitmap to disk");
                        }
                    });
                }
                self.notify_did_load(url, false, false).await;
                Completion::Success {
                    bitmap,
                    from_cache: false,
                    from_storage: false,
                }
            }
            Ok(Outcome::Failure(err)) => {
                self.notify_did_fail(url, &err).await;
                Completion::Failure(err)
            }
            Ok(Outcome::Cancelled) => Completion::Failure(DownloaderError::Cancelled),
            Err(_) => Completion::Failure(DownloaderError::Unknown {
                cause: "dispatcher dropped the completion channel".to_string(),
            }),
        }
    }

    pub async fn cancel(&self, url: &str, caller_token: CallerToken) {
        self.subsystems.read().await.dispatcher.cancel(url, caller_token);
    }

    pub async fn cancel_all(&self, url: &str) {
        self.subsystems.read().await.dispatcher.cancel_all(url);
    }

    pub async fn clear_low_tier(&self) {
        self.subsystems.read().await.cache.evict_low_tier().await;
    }

    pub async fn clear_all_cache(&self) {
        self.subsystems.read().await.cache.evict_all().await;
    }

    pub async fn clear_disk(&self) -> Result<(), DownloaderError> {
        self.subsystems.read().await.disk.clear_all().await
    }

    pub async fn hard_reset(&self) -> Result<(), DownloaderError> {
        self.clear_all_cache().await;
        self.clear_disk().await
    }

    /// Replaces the custom headers attached to subsequently admitted
    /// downloads. In-flight downloads keep the headers they started with.
    pub async fn set_headers(&self, headers: Vec<(String, String)>) {
        self.subsystems.read().await.dispatcher.set_headers(headers);
    }

    pub async fn set_authentication_transform(&self, transform: Option<AuthenticationTransform>) {
        self.subsystems
            .read()
            .await
            .dispatcher
            .set_authentication_transform(transform);
    }

    pub async fn set_retry_policy(&self, policy: RetryPolicy) {
        self.subsystems.read().await.dispatcher.set_retry_policy(policy);
    }

    pub async fn set_timeout(&self, timeout: Duration) {
        self.subsystems.read().await.dispatcher.set_timeout(timeout);
    }

    pub async fn set_cellular_allowed(&self, allowed: bool) {
        self.subsystems.read().await.dispatcher.set_cellular_allowed(allowed);
    }

    pub async fn cache_count(&self, tier: CacheTier) -> usize {
        self.subsystems.read().await.cache.count(tier).await
    }

    pub async fn disk_size_bytes(&self) -> u64 {
        self.subsystems.read().await.disk.size_bytes().await
    }

    pub async fn disk_file_count(&self) -> u64 {
        self.subsystems.read().await.disk.file_count().await
    }

    pub async fn active_download_count(&self) -> u32 {
        self.subsystems.read().await.dispatcher.active_download_count()
    }

    pub async fn queued_download_count(&self) -> u32 {
        self.subsystems.read().await.dispatcher.queued_download_count()
    }

    pub async fn disk_root_path(&self) -> std::path::PathBuf {
        self.subsystems.read().await.disk.root().to_path_buf()
    }
}

/// Mints a fresh opaque caller token for a new subscription.
pub fn new_caller_token() -> CallerToken {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instance_for_returns_the_same_instance_for_the_same_key() {
        let a = Coordinator::instance_for("tenant-a", Configuration::default);
        let b = Coordinator::instance_for("tenant-a", || panic!("build must not run twice"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn instance_for_returns_distinct_instances_for_distinct_keys() {
        let a = Coordinator::instance_for("tenant-b1", Configuration::default);
        let b = Coordinator::instance_for("tenant-b2", Configuration::default);
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
