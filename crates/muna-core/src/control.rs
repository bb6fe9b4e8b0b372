use serde::Serialize;

use crate::error::ClientError;
use crate::schemas::{Prediction, Predictor, User};

/// Body of a raw prediction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePredictionRequest {
    pub tag: String,
    pub client_id: Option<String>,
    pub configuration_id: Option<String>,
}

/// Operations consumed from the control plane.
pub trait ControlPlane: Send + Sync {
    /// Create a prediction without running anything locally.
    ///
    /// For local predictors the response describes how to build the predictor: its
    /// configuration token and the resources it needs.
    fn create_prediction(
        &self,
        request: &CreatePredictionRequest,
    ) -> Result<Prediction, ClientError>;

    /// `None` when no predictor has this tag.
    fn retrieve_predictor(&self, tag: &str) -> Result<Option<Predictor>, ClientError>;

    fn delete_predictor(&self, tag: &str) -> Result<(), ClientError>;

    fn archive_predictor(&self, tag: &str) -> Result<(), ClientError>;

    /// `None` when the client is not authenticated.
    fn retrieve_user(&self) -> Result<Option<User>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_uses_camel_case() {
        let request = CreatePredictionRequest {
            tag: "@muna/greeting".to_owned(),
            client_id: Some("linux-x86_64".to_owned()),
            configuration_id: None,
        };

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "tag": "@muna/greeting",
                "clientId": "linux-x86_64",
                "configurationId": null,
            })
        );
    }
}
