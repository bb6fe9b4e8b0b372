use reqwest::Method;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::control::{ControlPlane, CreatePredictionRequest};
use crate::error::ClientError;
use crate::schemas::{ErrorResponse, Prediction, Predictor, User};

/// API used when no URL is configured.
pub const DEFAULT_API_URL: &str = "https://api.muna.ai/v1";

/// Builder for a [`MunaClient`].
#[derive(Debug, Default, Clone)]
pub struct MunaClientBuilder {
    access_key: Option<String>,
    api_url: Option<String>,
    http: Option<HttpClient>,
}

impl MunaClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access key sent as a bearer token with every request.
    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// Use a specific API URL (self-hosted or staging).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Reuse an existing HTTP client.
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<MunaClient, ClientError> {
        let api_url = self.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let api_url = api_url
            .parse::<Url>()
            .map_err(|e| ClientError::InvalidUrl(format!("{api_url}: {e}")))?;
        Ok(MunaClient {
            http: self.http.unwrap_or_default(),
            api_url,
            access_key: self.access_key.filter(|key| !key.is_empty()),
        })
    }
}

/// Blocking REST client for the Muna API.
#[derive(Clone)]
pub struct MunaClient {
    http: HttpClient,
    api_url: Url,
    access_key: Option<String>,
}

impl MunaClient {
    pub fn builder() -> MunaClientBuilder {
        MunaClientBuilder::new()
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_key.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_url.as_str().trim_end_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.endpoint(path));
        match &self.access_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn execute(&self, request: RequestBuilder) -> Result<String, ClientError> {
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(api_error(status.as_u16(), &body))
        }
    }

    fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let body = self.execute(request)?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl std::fmt::Debug for MunaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MunaClient")
            .field("api_url", &self.api_url.as_str())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl ControlPlane for MunaClient {
    fn create_prediction(
        &self,
        request: &CreatePredictionRequest,
    ) -> Result<Prediction, ClientError> {
        tracing::debug!(tag = %request.tag, "creating raw prediction");
        self.execute_json(self.request(Method::POST, "/predictions").json(request))
    }

    fn retrieve_predictor(&self, tag: &str) -> Result<Option<Predictor>, ClientError> {
        match self.execute_json(self.request(Method::GET, &format!("/predictors/{tag}"))) {
            Ok(predictor) => Ok(Some(predictor)),
            Err(ClientError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete_predictor(&self, tag: &str) -> Result<(), ClientError> {
        self.execute(self.request(Method::DELETE, &format!("/predictors/{tag}")))
            .map(drop)
    }

    fn archive_predictor(&self, tag: &str) -> Result<(), ClientError> {
        self.execute(self.request(Method::POST, &format!("/predictors/{tag}/archive")))
            .map(drop)
    }

    fn retrieve_user(&self) -> Result<Option<User>, ClientError> {
        match self.execute_json(self.request(Method::GET, "/users")) {
            Ok(user) => Ok(Some(user)),
            Err(ClientError::Unauthenticated(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Map a failed response to an error, preferring the first server-provided message.
fn api_error(status: u16, body: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|response| response.errors.into_iter().next())
        .map(|error| error.message)
        .unwrap_or_else(|| body.to_owned());
    if status == 401 {
        tracing::debug!(body, "request rejected as unauthenticated");
        let message = Some(message).filter(|message| !message.trim().is_empty());
        return ClientError::Unauthenticated(message);
    }
    ClientError::Api { status, message }
}
