//! # Muna Runtime
//!
//! Safe bindings to the native prediction runtime (`fxnc`). This crate owns every raw pointer
//! that crosses the C ABI: native objects are wrapped in handles that release exactly once, and
//! host data is converted to and from native values by the codec in [`Value`].
//!
//! # Features
//! - Dynamic loading of the runtime library ([`Fxnc`]).
//! - Typed value codec over a closed set of host objects ([`Object`]).
//! - Configuration, predictor, prediction and prediction stream wrappers.
//! - `testing`: an in-process fake runtime for exercising the bindings without the native library.

mod configuration;
mod dtype;
mod error;
mod fxnc;
mod handle;
mod map;
mod object;
mod prediction;
mod predictor;
mod status;
mod stream;
mod value;

pub mod sys;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use configuration::{Acceleration, Configuration, Device};
pub use dtype::Dtype;
pub use error::RuntimeError;
pub use fxnc::{Fxnc, LIBRARY_PATH_VARS, default_library_path, platform_library_name};
pub use handle::{Borrowed, Handle, NativeKind, Release};
pub use map::ValueMap;
pub use object::{Input, Object, PixelBuffer, Tensor, TensorData};
pub use prediction::{DecodedPrediction, Prediction, PredictionState};
pub use predictor::Predictor;
pub use status::Status;
pub use stream::PredictionStream;
pub use value::Value;

pub use bytes::Bytes;
pub use half::f16;
