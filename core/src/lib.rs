//! HTTP through a host engine whose network API is bound to one thread.
//!
//! # Overview
//! Game engines and similar hosts often allow their web-request API to be
//! called only from the main thread, while the code asking for assets runs on
//! worker threads. `AssetAccessor` bridges the two: requests are described on
//! any thread, built and sent on the host's affinity thread, and their outcome
//! is delivered back through a one-shot `Fetch` handle.
//!
//! # Design
//! - The host is reached only through the `HostNetwork` / `HostRequest`
//!   traits; each engine backend provides one implementation.
//! - Affinity is an `AffinityExecutor`. `MainThreadQueue` is the stock one,
//!   drained by the host's frame loop.
//! - Capture buffers are released by a drop guard before the `Fetch`
//!   resolves, on every exit path.
//! - Every failure is a `FetchError` delivered through the `Fetch`.

pub mod accessor;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod http;

pub use accessor::AssetAccessor;
pub use completion::{completion_pair, Completion, Fetch, FetchResult};
pub use config::BridgeConfig;
pub use dispatch::{main_thread_queue, AffinityExecutor, MainThreadDispatcher, MainThreadQueue, MainThreadTask};
pub use error::{ConfigError, FetchError};
pub use host::{CaptureBuffer, CaptureGuard, HostNetwork, HostRequest, OnCompleted, RequestResult, UploadBuffer};
pub use http::{AssetResponse, CompletedRequest, RequestDescriptor, MAX_UPLOAD_LEN};
