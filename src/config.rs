//! Grouped, immutable configuration snapshot and a fluent builder,
//! following the shape of `commy::config::CommyConfig` /
//! `commy::config::ConfigBuilder`: per-section structs with concrete
//! hand-written `Default` impls, assembled and validated by a builder.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::{Codec, LosslessCodec};
use crate::dispatcher::AuthenticationTransform;
use crate::error::{DownloaderError, DownloaderResult};
use crate::identifier::{FastIdentifier, Identifier};
use crate::path_layout::{FlatLayout, PathLayout};
use crate::retry::RetryPolicy;

/// Network-facing knobs for the download dispatcher.
#[derive(Clone)]
pub struct NetworkConfig {
    pub max_concurrent: u32,
    pub timeout: Duration,
    pub allows_cellular: bool,
    pub retry_policy: RetryPolicy,
    pub custom_headers: Vec<(String, String)>,
    pub authentication_transform: Option<AuthenticationTransform>,
}

impl std::fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .field("allows_cellular", &self.allows_cellular)
            .field("retry_policy", &self.retry_policy)
            .field("custom_headers", &self.custom_headers.len())
            .field("authentication_transform", &self.authentication_transform.is_some())
            .finish()
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            timeout: Duration::from_secs(30),
            allows_cellular: true,
            retry_policy: RetryPolicy::default(),
            custom_headers: Vec::new(),
            authentication_transform: None,
        }
    }
}

/// Memory-cache-facing knobs.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub high_tier_limit: usize,
    pub low_tier_limit: usize,
    pub clear_low_on_pressure: bool,
    pub clear_all_on_pressure: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            high_tier_limit: 100,
            low_tier_limit: 200,
            clear_low_on_pressure: true,
            clear_all_on_pressure: false,
        }
    }
}

/// Disk-store-facing knobs, including the three pluggable providers.
#[derive(Clone)]
pub struct StorageConfig {
    pub save_by_default: bool,
    pub root_path: PathBuf,
    pub identifier: Arc<dyn Identifier>,
    pub path_layout: Arc<dyn PathLayout>,
    pub codec: Arc<dyn Codec>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("save_by_default", &self.save_by_default)
            .field("root_path", &self.root_path)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_by_default: true,
            root_path: default_root_path(),
            identifier: Arc::new(FastIdentifier),
            path_layout: Arc::new(FlatLayout),
            codec: Arc::new(LosslessCodec),
        }
    }
}

/// Platform cache directory, subdirectory `ImageDownloaderStorage`, falling
/// back to a relative directory if the platform cache dir cannot be
/// determined.
fn default_root_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_default()
        .join("ImageDownloaderStorage")
}

/// A grouped, immutable snapshot of network, cache, and storage settings.
/// The coordinator holds exactly one active configuration at a time;
/// reconfiguring rebuilds its subsystem instances.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub network: NetworkConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub debug_logging: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
            debug_logging: false,
        }
    }
}

/// Fluent builder mirroring `commy::config::ConfigBuilder`: setters accrue
/// onto a default snapshot, `build()` validates and returns the result.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Configuration,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.config.network = network;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn debug_logging(mut self, enabled: bool) -> Self {
        self.config.debug_logging = enabled;
        self
    }

    pub fn max_concurrent(mut self, value: u32) -> Self {
        self.config.network.max_concurrent = value;
        self
    }

    pub fn timeout(mut self, value: Duration) -> Self {
        self.config.network.timeout = value;
        self
    }

    pub fn retry_policy(mut self, value: RetryPolicy) -> Self {
        self.config.network.retry_policy = value;
        self
    }

    pub fn allows_cellular(mut self, value: bool) -> Self {
        self.config.network.allows_cellular = value;
        self
    }

    pub fn custom_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.config.network.custom_headers = headers;
        self
    }

    pub fn authentication_transform(mut self, transform: AuthenticationTransform) -> Self {
        self.config.network.authentication_transform = Some(transform);
        self
    }

    pub fn root_path(mut self, value: impl Into<PathBuf>) -> Self {
        self.config.storage.root_path = value.into();
        self
    }

    pub fn build(self) -> DownloaderResult<Configuration> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> DownloaderResult<()> {
        if self.config.network.max_concurrent == 0 {
            return Err(DownloaderError::invalid_url(
                "max_concurrent must be greater than zero",
            ));
        }
        if self.config.network.timeout.is_zero() {
            return Err(DownloaderError::invalid_url("timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ConfigBuilder::new().build().expect("default config builds");
        assert_eq!(config.network.max_concurrent, 4);
        assert_eq!(config.cache.high_tier_limit, 100);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = ConfigBuilder::new().max_concurrent(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn setters_compose() {
        let config = ConfigBuilder::new()
            .max_concurrent(8)
            .timeout(Duration::from_secs(5))
            .build()
            .expect("builds");
        assert_eq!(config.network.max_concurrent, 8);
        assert_eq!(config.network.timeout, Duration::from_secs(5));
    }
}
