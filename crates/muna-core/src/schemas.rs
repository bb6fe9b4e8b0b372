use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prediction as returned by the control plane.
///
/// For predictors that run locally the server only fills in the configuration token and the
/// resources the native runtime needs. Cloud predictions carry their results directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub tag: String,
    /// Configuration token handed to the native runtime.
    #[serde(default)]
    pub configuration: Option<String>,
    #[serde(default)]
    pub resources: Option<Vec<PredictionResource>>,
    #[serde(default)]
    pub results: Option<Vec<serde_json::Value>>,
    /// Milliseconds.
    #[serde(default)]
    pub latency: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Option<String>,
    pub created: DateTime<Utc>,
}

/// Remote file a local predictor needs before it can run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredictionResource {
    /// Resource type, forwarded verbatim to the native configuration.
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictorStatus {
    Compiling,
    Active,
    Invalid,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictorAccess {
    Public,
    Private,
    Unlisted,
}

/// Predictor metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictor {
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub owner: Option<User>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    pub status: PredictorStatus,
    pub access: PredictorAccess,
    pub created: DateTime<Utc>,
}

/// User profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub github: Option<String>,
}

/// Error payload returned by the API on failure.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_prediction_descriptor() {
        let prediction: Prediction = serde_json::from_str(
            r#"{
                "id": "pred_01",
                "tag": "@muna/greeting",
                "configuration": "token",
                "resources": [
                    { "type": "dso", "url": "https://cdn.muna.ai/libGreeting.so" },
                    { "type": "bin", "url": "https://cdn.muna.ai/weights.bin", "name": "model.bin" }
                ],
                "created": "2025-03-01T12:00:00Z"
            }"#,
        )
        .unwrap();

        let resources = prediction.resources.unwrap();
        assert_eq!(prediction.configuration.as_deref(), Some("token"));
        assert_eq!(resources[0].kind, "dso");
        assert_eq!(resources[1].name.as_deref(), Some("model.bin"));
        assert!(prediction.results.is_none());
    }

    #[test]
    fn test_resource_type_field_name() {
        let resource = PredictionResource {
            kind: "dso".to_owned(),
            url: "https://cdn.muna.ai/a.so".to_owned(),
            name: None,
        };

        let json = serde_json::to_value(&resource).unwrap();

        assert_eq!(json["type"], "dso");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_predictor_enums() {
        let predictor: Predictor = serde_json::from_str(
            r#"{
                "tag": "@muna/greeting",
                "name": "Greeting",
                "status": "ACTIVE",
                "access": "PUBLIC",
                "created": "2025-03-01T12:00:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(predictor.status, PredictorStatus::Active);
        assert_eq!(predictor.access.to_string(), "PUBLIC");
    }
}
