use std::sync::Arc;

use muna_core::ControlPlane;
use muna_core::schemas::User;

use crate::error::MunaError;

/// Retrieve user profiles.
#[derive(Clone)]
pub struct UserService {
    control: Arc<dyn ControlPlane>,
}

impl UserService {
    pub(crate) fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self { control }
    }

    /// Retrieve the current user. `None` when the client is not authenticated.
    pub fn retrieve(&self) -> Result<Option<User>, MunaError> {
        Ok(self.control.retrieve_user()?)
    }
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService").finish_non_exhaustive()
    }
}
