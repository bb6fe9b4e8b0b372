use std::ffi::c_void;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::fxnc::Fxnc;
use crate::handle::{Handle, Release, native_kind};
use crate::map::ValueMap;
use crate::prediction::Prediction;
use crate::predictor::PredictorCore;
use crate::status::Status;

native_kind!(PredictionStreamKind, "prediction stream", FXNPredictionStreamRelease);

/// Finite, non-restartable sequence of predictions read from a native stream.
///
/// Iteration ends when the runtime reports the stream is exhausted, or after the first error.
pub struct PredictionStream {
    // Field order is drop order: the stream goes before the inputs and predictor it reads.
    handle: Handle<PredictionStreamKind>,
    inputs: ValueMap,
    _predictor: Arc<PredictorCore>,
    done: bool,
}

impl PredictionStream {
    /// # Safety
    /// `raw` must be a live stream created by `fxnc` from a predictor in `predictor`, reading
    /// `inputs`. Ownership passes to the returned value.
    pub(crate) unsafe fn from_raw(
        fxnc: &Fxnc,
        raw: *mut c_void,
        inputs: ValueMap,
        predictor: Arc<PredictorCore>,
    ) -> Self {
        Self {
            // SAFETY: forwarded from the caller.
            handle: unsafe { Handle::adopt(fxnc, raw, true) },
            inputs,
            _predictor: predictor,
            done: false,
        }
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.handle.as_raw()
    }

    /// Whether the stream has finished, failed or been released.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Read the next prediction, or `None` once the stream is exhausted.
    pub fn read_next(&mut self) -> Result<Option<Prediction>, RuntimeError> {
        if self.done {
            return Ok(None);
        }
        let raw = self.handle.live("read next prediction in stream")?;
        let mut prediction = std::ptr::null_mut();
        // SAFETY: `raw` is live.
        let status = unsafe { (self.handle.api().FXNPredictionStreamReadNext)(raw, &mut prediction) };
        match Status::from_raw(status) {
            Status::Ok if !prediction.is_null() => {
                // SAFETY: the runtime hands ownership of each streamed prediction to the caller.
                Ok(Some(unsafe { Prediction::from_raw(self.handle.fxnc(), prediction) }))
            }
            Status::InvalidOperation => {
                self.done = true;
                Ok(None)
            }
            status => {
                self.done = true;
                Err(RuntimeError::NativeCall {
                    operation: "read next prediction in stream",
                    status: if status.is_ok() {
                        Status::InvalidOperation
                    } else {
                        status
                    },
                })
            }
        }
    }
}

impl Iterator for PredictionStream {
    type Item = Result<Prediction, RuntimeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

impl FusedIterator for PredictionStream {}

impl Release for PredictionStream {
    fn release(&mut self) {
        self.done = true;
        self.handle.release();
        self.inputs.release();
    }
}

impl fmt::Debug for PredictionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionStream")
            .field("handle", &self.handle)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use crate::object::Object;
    use crate::predictor::Predictor;
    use crate::testing::{fake_runtime, release_count};
    use crate::value::Value;

    fn stream(tag: &str) -> PredictionStream {
        let fxnc = fake_runtime();
        let mut configuration = Configuration::new(&fxnc).unwrap();
        configuration.set_tag(Some(tag)).unwrap();
        let predictor = Predictor::new(&configuration).unwrap();
        let mut inputs = ValueMap::new(&fxnc).unwrap();
        inputs.insert("prompt", Value::string(&fxnc, "hi").unwrap()).unwrap();
        predictor.stream_prediction(inputs).unwrap()
    }

    #[test]
    fn test_yields_every_native_item_then_stops() {
        let mut stream = stream("@test/stream-3");

        let mut seen = Vec::new();
        for prediction in stream.by_ref() {
            let mut prediction = prediction.unwrap();
            let decoded = prediction.decode().unwrap();
            seen.push(decoded.results.unwrap());
        }

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], [("prompt".to_owned(), Object::from("hi"))]);
        assert!(stream.is_done());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_empty_stream() {
        let mut stream = stream("@test/stream-0");

        assert!(stream.next().is_none());
    }

    #[test]
    fn test_other_status_is_an_error_and_ends_iteration() {
        let mut stream = stream("@test/stream-fault-1");

        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::NativeCall {
                status: Status::NotImplemented,
                ..
            }
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_each_prediction_released_once() {
        let mut stream = stream("@test/stream-2");
        let stream_raw = stream.as_raw();
        let mut raws = Vec::new();

        while let Some(prediction) = stream.read_next().unwrap() {
            raws.push(prediction.as_raw());
        }
        stream.release();
        drop(stream);

        assert_eq!(raws.len(), 2);
        for raw in raws {
            assert_eq!(release_count(raw), 1);
        }
        assert_eq!(release_count(stream_raw), 1);
    }
}
