//! # Muna
//!
//! Run predictors in the cloud, or locally through the native runtime.
//!
//! ```no_run
//! use muna::{Inputs, Muna};
//!
//! # fn main() -> Result<(), muna::MunaError> {
//! let muna = Muna::new()?;
//! let prediction = muna
//!     .predictions()
//!     .create("@yusuf/greeting", Some(Inputs::new().with("name", "Yusuf")))?;
//! println!("{:?}", prediction.results);
//! # Ok(())
//! # }
//! ```
//!
//! Passing no inputs creates the prediction on the control plane without running anything
//! locally. With inputs, the predictor is built on first use from the resources the control plane
//! lists, cached by tag, and run in-process.

mod client;
mod error;
mod prediction;
mod services;

pub mod telemetry;

pub use client::{ACCESS_KEY_VARS, API_URL_VARS, Muna, MunaBuilder};
pub use error::MunaError;
pub use prediction::Prediction;
pub use services::{Inputs, PredictionIter, PredictionOptions, PredictionService, PredictorService, UserService};

pub use muna_core::{ClientError, ControlPlane, CreatePredictionRequest, schemas};
pub use muna_registry::{CacheDiagnostics, Download, Downloader, ResourceCache, ResourceError};
pub use muna_runtime::{
    Acceleration, Bytes, Device, Dtype, Fxnc, Input, Object, PixelBuffer, RuntimeError, Tensor,
    TensorData, Value, f16,
};
