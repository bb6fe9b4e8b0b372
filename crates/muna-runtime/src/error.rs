use crate::status::Status;

/// Errors returned by the native binding layer.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A native call returned a non-OK status.
    #[error("Failed to {operation} with error: {status}")]
    NativeCall {
        operation: &'static str,
        status: Status,
    },
    /// A host or native value has no representation on the other side.
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),
    /// The native runtime reported a type code outside the dtype registry.
    #[error("Unrecognized native dtype code: {0}")]
    UnknownDtype(i32),
    /// The native runtime library could not be loaded.
    #[error("Failed to load native runtime: {0}")]
    Library(String),
    /// A string crossing the boundary was not valid (interior NUL or invalid UTF-8).
    #[error("Invalid string for {context}: {details}")]
    InvalidString {
        context: &'static str,
        details: String,
    },
    /// JSON (de)serialization of a list or dict value failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
