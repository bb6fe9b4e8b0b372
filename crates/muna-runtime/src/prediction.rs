use std::ffi::{CStr, c_void};
use std::fmt;

use crate::error::RuntimeError;
use crate::fxnc::Fxnc;
use crate::handle::{Borrowed, Handle, Release, native_kind};
use crate::map::ValueMap;
use crate::object::Object;
use crate::status::check;
use crate::value::read_c_string;

native_kind!(PredictionKind, "prediction", FXNPredictionRelease);

const ID_CAPACITY: usize = 256;
const ERROR_CAPACITY: usize = 2048;

/// Lifecycle of a native prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PredictionState {
    Created,
    Decoded,
    Released,
}

/// Everything a native prediction produced, copied into host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPrediction {
    pub id: String,
    /// Milliseconds.
    pub latency: f64,
    /// Output values in the order the predictor produced them. `None` when there are none.
    pub results: Option<Vec<(String, Object)>>,
    pub error: Option<String>,
    pub logs: Option<String>,
}

/// Result of one native prediction.
pub struct Prediction {
    handle: Handle<PredictionKind>,
    state: PredictionState,
}

impl Prediction {
    /// Take ownership of a native prediction.
    ///
    /// # Safety
    /// `raw` must be a live prediction created by `fxnc` and not owned by anything else.
    pub unsafe fn from_raw(fxnc: &Fxnc, raw: *mut c_void) -> Self {
        Self {
            // SAFETY: forwarded from the caller.
            handle: unsafe { Handle::adopt(fxnc, raw, true) },
            state: PredictionState::Created,
        }
    }

    pub fn state(&self) -> PredictionState {
        self.state
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.handle.as_raw()
    }

    pub fn id(&self) -> Result<String, RuntimeError> {
        let raw = self.handle.live("get prediction id")?;
        let api = self.handle.api();
        // SAFETY: `raw` is live and the buffer is sized as advertised.
        read_c_string("get prediction id", ID_CAPACITY, |buffer, len| unsafe {
            (api.FXNPredictionGetID)(raw, buffer, len)
        })
    }

    /// Prediction latency in milliseconds.
    pub fn latency(&self) -> Result<f64, RuntimeError> {
        let raw = self.handle.live("get prediction latency")?;
        let mut latency = 0.0;
        // SAFETY: `raw` is live.
        check("get prediction latency", unsafe {
            (self.handle.api().FXNPredictionGetLatency)(raw, &mut latency)
        })?;
        Ok(latency)
    }

    /// Output values, borrowed from the prediction. `None` when the prediction has no outputs.
    pub fn results(&self) -> Result<Option<Borrowed<'_, ValueMap>>, RuntimeError> {
        let raw = self.handle.live("get prediction results")?;
        let mut map = std::ptr::null_mut();
        // SAFETY: `raw` is live.
        check("get prediction results", unsafe {
            (self.handle.api().FXNPredictionGetResults)(raw, &mut map)
        })?;
        if map.is_null() {
            return Ok(None);
        }
        // SAFETY: the prediction owns the map; the borrow ties it to `self`.
        let map = Borrowed::new(unsafe { ValueMap::from_raw(self.handle.fxnc(), map, false) });
        Ok(if map.is_empty()? { None } else { Some(map) })
    }

    /// Error reported by the predictor, if any.
    ///
    /// The status of this call is not checked: a prediction without an error may report
    /// failure here.
    pub fn error(&self) -> Result<Option<String>, RuntimeError> {
        let raw = self.handle.live("get prediction error")?;
        let mut buffer = vec![0u8; ERROR_CAPACITY];
        // SAFETY: `raw` is live and the buffer is sized as advertised.
        unsafe {
            (self.handle.api().FXNPredictionGetError)(
                raw,
                buffer.as_mut_ptr().cast(),
                ERROR_CAPACITY as i32,
            )
        };
        if let Some(last) = buffer.last_mut() {
            *last = 0;
        }
        let error = CStr::from_bytes_until_nul(&buffer)
            .map(|error| error.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(error).filter(|error| !error.is_empty()))
    }

    pub fn logs(&self) -> Result<Option<String>, RuntimeError> {
        let raw = self.handle.live("get prediction log length")?;
        let api = self.handle.api();
        let mut len = 0;
        // SAFETY: `raw` is live.
        check("get prediction log length", unsafe {
            (api.FXNPredictionGetLogLength)(raw, &mut len)
        })?;
        let capacity = usize::try_from(len).unwrap_or(0) + 1;
        // SAFETY: `raw` is live and the buffer is sized as advertised.
        let logs = read_c_string("get prediction logs", capacity, |buffer, len| unsafe {
            (api.FXNPredictionGetLogs)(raw, buffer, len)
        })?;
        Ok(Some(logs).filter(|logs| !logs.is_empty()))
    }

    /// Copy every field into host memory. The prediction can be released afterwards.
    pub fn decode(&mut self) -> Result<DecodedPrediction, RuntimeError> {
        let results = match self.results()? {
            Some(map) => Some(map.to_objects()?),
            None => None,
        };
        let decoded = DecodedPrediction {
            id: self.id()?,
            latency: self.latency()?,
            results,
            error: self.error()?,
            logs: self.logs()?,
        };
        if let Some(logs) = &decoded.logs {
            tracing::debug!(target: "muna::native", id = %decoded.id, "{logs}");
        }
        self.state = PredictionState::Decoded;
        Ok(decoded)
    }
}

impl Release for Prediction {
    fn release(&mut self) {
        self.handle.release();
        self.state = PredictionState::Released;
    }
}

impl fmt::Debug for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prediction")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::predictor::Predictor;
    use crate::testing::{fake_runtime, release_count};
    use crate::value::Value;

    fn predict(tag: &str, inputs: &[(&str, Object)]) -> Prediction {
        let fxnc = fake_runtime();
        let mut configuration = Configuration::new(&fxnc).unwrap();
        configuration.set_tag(Some(tag)).unwrap();
        let predictor = Predictor::new(&configuration).unwrap();
        let mut map = ValueMap::new(&fxnc).unwrap();
        for (key, object) in inputs {
            map.insert(key, Value::from_object(&fxnc, object).unwrap()).unwrap();
        }
        predictor.create_prediction(&map).unwrap()
    }

    #[test]
    fn test_native_error_is_data() {
        let mut prediction = predict("@test/prediction-error", &[("x", Object::Int(1))]);

        let decoded = prediction.decode().unwrap();

        assert_eq!(decoded.error.as_deref(), Some("invalid input shape"));
        assert_eq!(decoded.results, None);
    }

    #[test]
    fn test_fields_are_decoded() {
        let mut prediction = predict(
            "@test/prediction-fields",
            &[("flag", Object::Bool(false)), ("count", Object::Int(9))],
        );

        let decoded = prediction.decode().unwrap();

        assert!(!decoded.id.is_empty());
        assert!(decoded.latency >= 0.0);
        assert_eq!(
            decoded.results.unwrap(),
            [
                ("flag".to_owned(), Object::Bool(false)),
                ("count".to_owned(), Object::Int(9)),
            ]
        );
        assert!(decoded.logs.unwrap().contains("@test/prediction-fields"));
    }

    #[test]
    fn test_empty_results_are_none() {
        let prediction = predict("@test/prediction-empty", &[]);

        assert!(prediction.results().unwrap().is_none());
    }

    #[test]
    fn test_state_machine() {
        let mut prediction = predict("@test/prediction-state", &[("x", Object::Null)]);
        let raw = prediction.as_raw();
        assert_eq!(prediction.state(), PredictionState::Created);

        prediction.decode().unwrap();
        assert_eq!(prediction.state(), PredictionState::Decoded);

        prediction.release();
        prediction.release();
        assert_eq!(prediction.state(), PredictionState::Released);
        assert_eq!(release_count(raw), 1);
        assert!(prediction.decode().is_err());
    }
}
