use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::configuration::Configuration;
use crate::error::RuntimeError;
use crate::fxnc::Fxnc;
use crate::handle::{Handle, Release, native_kind};
use crate::map::ValueMap;
use crate::prediction::Prediction;
use crate::status::check;
use crate::stream::PredictionStream;

native_kind!(PredictorKind, "predictor", FXNPredictorRelease);

/// Native predictor handle shared with the streams reading from it.
pub(crate) struct PredictorCore {
    handle: Mutex<Handle<PredictorKind>>,
}

impl PredictorCore {
    fn lock(&self) -> MutexGuard<'_, Handle<PredictorKind>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An instantiated native predictor.
///
/// Calls into one predictor are serialized. Streams keep the native predictor alive until they
/// finish, even if the `Predictor` itself is released first.
pub struct Predictor {
    core: Arc<PredictorCore>,
    released: bool,
}

impl Predictor {
    /// Build the native predictor described by `configuration`.
    ///
    /// The configuration can be released as soon as this returns.
    pub fn new(configuration: &Configuration) -> Result<Self, RuntimeError> {
        let config_raw = configuration.as_raw();
        if config_raw.is_null() {
            return Err(RuntimeError::NativeCall {
                operation: "create predictor",
                status: crate::Status::InvalidOperation,
            });
        }
        // SAFETY: the configuration handle is live; out-pointer provided by `Handle::create`.
        let handle = Handle::create(configuration.fxnc(), "create predictor", |api, out| unsafe {
            (api.FXNPredictorCreate)(config_raw, out)
        })?;
        Ok(Self {
            core: Arc::new(PredictorCore {
                handle: Mutex::new(handle),
            }),
            released: false,
        })
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.core.lock().as_raw()
    }

    pub fn fxnc(&self) -> Fxnc {
        self.core.lock().fxnc().clone()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn live(&self, operation: &'static str) -> Result<MutexGuard<'_, Handle<PredictorKind>>, RuntimeError> {
        if self.released {
            return Err(RuntimeError::NativeCall {
                operation,
                status: crate::Status::InvalidOperation,
            });
        }
        let handle = self.core.lock();
        handle.live(operation)?;
        Ok(handle)
    }

    /// Run one prediction on `inputs`.
    pub fn create_prediction(&self, inputs: &ValueMap) -> Result<Prediction, RuntimeError> {
        let handle = self.live("create prediction")?;
        let predictor = handle.as_raw();
        let map = live_map(inputs, "create prediction")?;
        let mut raw = std::ptr::null_mut();
        // SAFETY: predictor and input map are live.
        check("create prediction", unsafe {
            (handle.api().FXNPredictorCreatePrediction)(predictor, map, &mut raw)
        })?;
        // SAFETY: the runtime hands ownership of the new prediction to the caller.
        Ok(unsafe { Prediction::from_raw(handle.fxnc(), raw) })
    }

    /// Start a streaming prediction on `inputs`.
    ///
    /// The stream takes the inputs so they stay alive for as long as the runtime may read them.
    pub fn stream_prediction(&self, inputs: ValueMap) -> Result<PredictionStream, RuntimeError> {
        let handle = self.live("stream prediction")?;
        let predictor = handle.as_raw();
        let map = live_map(&inputs, "stream prediction")?;
        let mut raw = std::ptr::null_mut();
        // SAFETY: predictor and input map are live.
        check("stream prediction", unsafe {
            (handle.api().FXNPredictorStreamPrediction)(predictor, map, &mut raw)
        })?;
        // SAFETY: the runtime hands ownership of the new stream to the caller.
        Ok(unsafe { PredictionStream::from_raw(handle.fxnc(), raw, inputs, self.core.clone()) })
    }
}

impl Release for Predictor {
    /// Release the native predictor now, or once the last stream reading from it has finished.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if Arc::strong_count(&self.core) == 1 {
            self.core.lock().release();
        }
    }
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("handle", &*self.core.lock())
            .field("released", &self.released)
            .finish()
    }
}

fn live_map(map: &ValueMap, operation: &'static str) -> Result<*mut c_void, RuntimeError> {
    let raw = map.as_raw();
    if raw.is_null() {
        return Err(RuntimeError::NativeCall {
            operation,
            status: crate::Status::InvalidOperation,
        });
    }
    Ok(raw)
}
