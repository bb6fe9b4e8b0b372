/// Errors returned by the control-plane client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The API answered with a non-success status.
    #[error("{message} (Status Code: {status})")]
    Api { status: u16, message: String },
    /// The request requires an access key and none was accepted. Carries the server's message.
    #[error("The request is not authenticated{}", detail(.0))]
    Unauthenticated(Option<String>),
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The configured API URL could not be parsed.
    #[error("Failed to parse API URL: {0}")]
    InvalidUrl(String),
    /// A success response did not match the expected schema.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Unauthenticated(_) => Some(401),
            ClientError::Http(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => ".".to_owned(),
    }
}
