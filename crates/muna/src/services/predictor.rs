use std::sync::Arc;

use muna_core::ControlPlane;
use muna_core::schemas::Predictor;

use crate::error::MunaError;

/// Manage predictors on the control plane.
#[derive(Clone)]
pub struct PredictorService {
    control: Arc<dyn ControlPlane>,
}

impl PredictorService {
    pub(crate) fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self { control }
    }

    /// Retrieve a predictor. `None` if no predictor has this tag.
    pub fn retrieve(&self, tag: &str) -> Result<Option<Predictor>, MunaError> {
        Ok(self.control.retrieve_predictor(tag)?)
    }

    pub fn delete(&self, tag: &str) -> Result<(), MunaError> {
        tracing::info!(tag, "deleting predictor");
        Ok(self.control.delete_predictor(tag)?)
    }

    pub fn archive(&self, tag: &str) -> Result<(), MunaError> {
        tracing::info!(tag, "archiving predictor");
        Ok(self.control.archive_predictor(tag)?)
    }
}

impl std::fmt::Debug for PredictorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorService").finish_non_exhaustive()
    }
}
