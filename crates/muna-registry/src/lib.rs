//! Local cache for the remote resources a predictor needs before it can run locally.
//!
//! Resources are stored under the cache directory by their remote file name, downloaded at
//! most once, and installed with an atomic rename so a partially written file is never
//! visible at its final path.

mod builder;
mod cache;
mod diagnostics;
mod download;
mod error;

pub use builder::{RegistryConfig, default_cache_dir};
pub use cache::{ProgressFn, ResolvedResource, ResourceCache};
pub use diagnostics::{CacheDiagnostics, CachedFile};
pub use download::{Download, Downloader, HttpDownloader};
pub use error::ResourceError;

pub use muna_core::schemas::PredictionResource;
