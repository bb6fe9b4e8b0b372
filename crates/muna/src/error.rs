use muna_core::ClientError;
use muna_registry::ResourceError;
use muna_runtime::RuntimeError;

/// Errors returned by the Muna client.
#[derive(Debug, thiserror::Error)]
pub enum MunaError {
    /// The control plane rejected a request or could not be reached.
    #[error("Control plane error: {0}")]
    Client(#[from] ClientError),
    /// A resource needed by a local predictor could not be fetched.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
    /// A native runtime call failed, or a value could not be marshaled.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// A prediction completed with an error. Only produced by [`crate::Prediction::into_result`].
    #[error("Prediction {id} failed: {message}")]
    Prediction { id: String, message: String },
}
