//! `reqwest` implementation of [`TutoringGateway`].

use std::time::Duration;

use async_trait::async_trait;
use mastery_session::{
    Config, EvaluateRequest, EvaluationResult, ExplainResponse, GatewayError, ProgressRecord,
    ProgressResponse, QuizSet, ReteachResponse, TopicRequest, TutoringGateway,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Connection settings for [`HttpGateway`].
#[derive(Clone)]
pub struct GatewayOptions {
    /// Base URL of the tutoring service, without a trailing slash.
    pub base_url: String,
    /// Bearer token attached to every request.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GatewayOptions {
    /// Builds options from the loaded configuration and an optional token.
    #[must_use]
    pub fn from_config(config: &Config, token: Option<String>) -> Self {
        Self {
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

impl std::fmt::Debug for GatewayOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayOptions")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Talks to the tutoring service over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    options: GatewayOptions,
}

impl HttpGateway {
    /// Creates a gateway for the given options.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Transport` if the HTTP client cannot be built.
    pub fn new(options: GatewayOptions) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| GatewayError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, options })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.options.base_url
    }

    /// Checks that the service answers `GET /` with a success status.
    pub async fn health_check(&self) -> Result<(), GatewayError> {
        let response = self.send(self.request(reqwest::Method::GET, "/")).await?;
        check_status(response).await.map(|_| ())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.options.base_url);
        let builder = self.client.request(method, url);
        match &self.options.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        builder.send().await.map_err(map_transport_error)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "calling tutoring service");
        let response = self
            .send(self.request(reqwest::Method::POST, path).json(body))
            .await?;
        decode(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        debug!(path, "calling tutoring service");
        let response = self.send(self.request(reqwest::Method::GET, path)).await?;
        decode(path, response).await
    }
}

#[async_trait]
impl TutoringGateway for HttpGateway {
    async fn explain(&self, topic: &str) -> Result<String, GatewayError> {
        let body = TopicRequest {
            topic: topic.to_string(),
        };
        let response: ExplainResponse = self.post("/explain", &body).await?;
        Ok(response.explanation)
    }

    async fn generate_quiz(&self, topic: &str) -> Result<QuizSet, GatewayError> {
        let body = TopicRequest {
            topic: topic.to_string(),
        };
        let quiz: QuizSet = self.post("/generate-quiz", &body).await?;
        quiz.validate()?;
        Ok(quiz)
    }

    async fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluationResult, GatewayError> {
        let result: EvaluationResult = self.post("/evaluate", request).await?;
        result.validate()?;
        Ok(result)
    }

    async fn reteach(&self, topic: &str) -> Result<String, GatewayError> {
        let body = TopicRequest {
            topic: topic.to_string(),
        };
        let response: ReteachResponse = self.post("/reteach", &body).await?;
        Ok(response.simplified_explanation)
    }

    async fn list_progress(&self) -> Result<Vec<ProgressRecord>, GatewayError> {
        let response: ProgressResponse = self.get("/progress").await?;
        Ok(response.progress)
    }
}

// ============================================================================
// Response handling
// ============================================================================

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else if err.is_decode() {
        GatewayError::invalid_response(err.to_string())
    } else {
        GatewayError::transport(err.to_string())
    }
}

/// Turns a non-success response into `GatewayError::Status`.
async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = extract_detail(&body);
    warn!(status = status.as_u16(), detail = ?detail, "tutoring service returned an error");
    Err(GatewayError::status(status.as_u16(), detail))
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, GatewayError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await.map_err(map_transport_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::invalid_response(format!("{path}: {e}")))
}

/// Pulls a human-readable message out of an error body.
///
/// Understands `{"detail": "..."}` and validation lists of the form
/// `{"detail": [{"msg": "..."}]}`.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) if !detail.trim().is_empty() => Some(detail.clone()),
        serde_json::Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(serde_json::Value::as_str))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
