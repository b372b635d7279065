//! A client-side image retrieval core: a two-tier memory cache, a
//! content-addressed disk store, and a bounded-concurrency download
//! dispatcher, composed behind a single [`Coordinator`].
//!
//! The typical entry point is [`Coordinator::shared`] for process-wide use,
//! or [`Coordinator::new`] with a caller-built [`Configuration`] for
//! multiple independent instances.

pub mod bitmap;
pub mod cache;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod disk_store;
pub mod dispatcher;
pub mod error;
pub mod identifier;
pub mod observer;
pub mod path_layout;
pub mod retry;

pub use bitmap::Bitmap;
pub use cache::{CacheTier, EvictedEntry, MemoryCache};
pub use codec::{AdaptiveCodec, Codec, LosslessCodec, LossyCodec};
pub use config::{CacheConfig, ConfigBuilder, Configuration, NetworkConfig, StorageConfig};
pub use coordinator::{new_caller_token, Completion, Coordinator, RequestOptions};
pub use disk_store::DiskStore;
pub use dispatcher::{AuthenticationTransform, CallerToken, DownloadPriority, Dispatcher, Outcome, Transport};
pub use error::{DownloaderError, DownloaderResult};
pub use identifier::{FastIdentifier, Fingerprint, Identifier, StrongIdentifier};
pub use observer::Observer;
pub use path_layout::{DateHierarchicalLayout, DomainHierarchicalLayout, FlatLayout, PathLayout};
pub use retry::RetryPolicy;
