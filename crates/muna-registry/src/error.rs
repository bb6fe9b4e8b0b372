use std::path::PathBuf;

/// Errors returned while resolving resources.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Transport failure before any data was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The server refused the download or the transfer was cut short.
    #[error("Download failed for {url}: {details}")]
    DownloadFailed { url: String, details: String },
    /// The cache directory could not be created.
    #[error("Cache directory unavailable: {}", path.display())]
    CacheDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A resource URL or name does not map to a path inside the cache.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    /// A download worker panicked.
    #[error("Download worker panicked")]
    WorkerPanicked,
}
