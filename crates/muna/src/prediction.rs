use chrono::{DateTime, Utc};
use muna_core::schemas;
use muna_runtime::{DecodedPrediction, Object};

use crate::error::MunaError;
use crate::schemas::PredictionResource;

/// Result of running a predictor, in the cloud or locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: String,
    pub tag: String,
    /// Configuration token. Only set on predictions describing a local predictor.
    pub configuration: Option<String>,
    /// Resources a local predictor needs. Only set on predictions describing a local predictor.
    pub resources: Option<Vec<PredictionResource>>,
    /// Output values, in the order the predictor produced them.
    pub results: Option<Vec<Object>>,
    /// Milliseconds.
    pub latency: Option<f64>,
    pub error: Option<String>,
    pub logs: Option<String>,
    pub created: DateTime<Utc>,
}

impl Prediction {
    /// Assemble a record from a prediction decoded out of the native runtime.
    pub(crate) fn from_native(tag: &str, decoded: DecodedPrediction) -> Self {
        Self {
            id: decoded.id,
            tag: tag.to_owned(),
            configuration: None,
            resources: None,
            results: decoded
                .results
                .map(|results| results.into_iter().map(|(_, object)| object).collect()),
            latency: Some(decoded.latency),
            error: decoded.error,
            logs: decoded.logs,
            created: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|error| !error.is_empty())
    }

    /// Result at `index`, if the prediction produced it.
    pub fn result(&self, index: usize) -> Option<&Object> {
        self.results.as_ref()?.get(index)
    }

    /// Turn a failed prediction into an error.
    pub fn into_result(self) -> Result<Self, MunaError> {
        match self.error {
            Some(message) if !message.is_empty() => Err(MunaError::Prediction {
                id: self.id,
                message,
            }),
            _ => Ok(self),
        }
    }
}

impl From<schemas::Prediction> for Prediction {
    fn from(prediction: schemas::Prediction) -> Self {
        Self {
            id: prediction.id,
            tag: prediction.tag,
            configuration: prediction.configuration,
            resources: prediction.resources,
            results: prediction
                .results
                .map(|results| results.into_iter().map(Object::from).collect()),
            latency: prediction.latency,
            error: prediction.error,
            logs: prediction.logs,
            created: prediction.created,
        }
    }
}
