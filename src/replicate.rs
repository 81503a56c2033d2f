//! Client for the hosted inference provider. Handlers only see the
//! `Predictor` trait; `ReplicateClient` is the implementation that talks to
//! the Replicate predictions API.

use crate::config::ReplicateSettings;
use crate::models;
use crate::prediction::Output;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The models this gateway can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelId {
    FluxUltra,
    FluxDepthPro,
    FluxReduxDev,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [
        ModelId::FluxUltra,
        ModelId::FluxDepthPro,
        ModelId::FluxReduxDev,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::FluxUltra => models::FLUX_ULTRA,
            ModelId::FluxDepthPro => models::FLUX_DEPTH_PRO,
            ModelId::FluxReduxDev => models::FLUX_REDUX_DEV,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single model invocation: which model, and its input parameters
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model: ModelId,
    pub input: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("no Replicate API token configured")]
    MissingToken,

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Replicate API returned {status}: {detail}")]
    Api { status: StatusCode, detail: String },

    #[error("prediction {id} {status}: {detail}")]
    Failed {
        id: String,
        status: String,
        detail: String,
    },

    #[error("prediction {id} did not finish within {timeout:?}")]
    Timeout { id: String, timeout: Duration },

    #[error("prediction {0} has no poll URL")]
    MissingPollUrl(String),

    #[error("prediction {0} returned no output")]
    EmptyOutput(String),
}

/// Something that can run a model and return its output
#[async_trait::async_trait]
pub trait Predictor: Send + Sync {
    async fn run(&self, request: InferenceRequest) -> Result<Output, InvocationError>;
}

/// Replicate's view of one prediction
#[derive(Debug)]
struct Prediction {
    id: String,
    status: String,
    output: Value,
    error: Option<String>,
    poll_url: Option<String>,
}

impl Prediction {
    fn from_json(value: Value) -> Self {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
        Prediction {
            id: text(value.get("id")).unwrap_or_default(),
            status: text(value.get("status"))
                .unwrap_or_default()
                .to_ascii_lowercase(),
            error: value.get("error").and_then(|e| match e {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }),
            poll_url: text(value.get("urls").and_then(|urls| urls.get("get")))
                .filter(|url| !url.trim().is_empty()),
            output: value.get("output").cloned().unwrap_or(Value::Null),
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.status.as_str(), "starting" | "processing")
    }

    fn into_output(self) -> Result<Output, InvocationError> {
        if self.status == "succeeded" {
            return Output::from_json(&self.output).ok_or(InvocationError::EmptyOutput(self.id));
        }
        Err(InvocationError::Failed {
            detail: self.error.unwrap_or_else(|| "no error reported".to_string()),
            id: self.id,
            status: self.status,
        })
    }
}

/// HTTP client for the Replicate predictions API
pub struct ReplicateClient {
    http: reqwest::Client,
    settings: ReplicateSettings,
}

impl fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ReplicateClient {
    pub fn new(settings: ReplicateSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(ReplicateClient { http, settings })
    }

    fn predictions_endpoint(&self, model: ModelId) -> String {
        format!(
            "{}/models/{}/predictions",
            self.settings.api_base.trim_end_matches('/'),
            model.as_str()
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<Prediction, InvocationError> {
        let transport = |source: reqwest::Error| InvocationError::Transport {
            url: url.to_string(),
            source,
        };
        let response = request
            .bearer_auth(&self.settings.api_token)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvocationError::Api {
                status,
                detail: api_error_detail(&body),
            });
        }

        let body: Value = response.json().await.map_err(transport)?;
        Ok(Prediction::from_json(body))
    }

    async fn poll(&self, mut prediction: Prediction) -> Result<Prediction, InvocationError> {
        let started = Instant::now();
        while prediction.is_running() {
            if started.elapsed() >= self.settings.poll_timeout() {
                return Err(InvocationError::Timeout {
                    id: prediction.id,
                    timeout: self.settings.poll_timeout(),
                });
            }
            let poll_url = prediction
                .poll_url
                .clone()
                .ok_or_else(|| InvocationError::MissingPollUrl(prediction.id.clone()))?;

            tokio::time::sleep(self.settings.poll_interval()).await;
            debug!("polling prediction {} ({})", prediction.id, prediction.status);
            prediction = self.send(self.http.get(&poll_url), &poll_url).await?;
        }
        Ok(prediction)
    }
}

#[async_trait::async_trait]
impl Predictor for ReplicateClient {
    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    async fn run(&self, request: InferenceRequest) -> Result<Output, InvocationError> {
        if self.settings.api_token.is_empty() {
            warn!("refusing to call Replicate without an API token");
            return Err(InvocationError::MissingToken);
        }

        let url = self.predictions_endpoint(request.model);
        let body = json!({ "input": Value::Object(request.input) });
        let prediction = self
            .send(
                self.http.post(&url).header("Prefer", "wait").json(&body),
                &url,
            )
            .await?;
        info!("created prediction {} ({})", prediction.id, prediction.status);

        let prediction = self.poll(prediction).await?;
        info!("prediction {} {}", prediction.id, prediction.status);
        prediction.into_output()
    }
}

/// Pull the human readable message out of an API error body
fn api_error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::OutputItem;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> ReplicateClient {
        let mut settings = ReplicateSettings::new("r8_test").with_api_base(server.url());
        settings.poll_interval_ms = 10;
        ReplicateClient::new(settings).unwrap()
    }

    fn redux_request() -> InferenceRequest {
        let mut input = Map::new();
        input.insert("redux_image".into(), json!("https://example.com/in.png"));
        input.insert("seed".into(), json!(7));
        InferenceRequest {
            model: ModelId::FluxReduxDev,
            input,
        }
    }

    #[test]
    fn test_model_ids() {
        assert_eq!(
            ModelId::FluxUltra.to_string(),
            "black-forest-labs/flux-1.1-pro-ultra"
        );
        assert_eq!(ModelId::FluxDepthPro.as_str(), "black-forest-labs/flux-depth-pro");
        assert_eq!(ModelId::FluxReduxDev.as_str(), "black-forest-labs/flux-redux-dev");
    }

    #[tokio::test]
    async fn test_run_completes_synchronously() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/black-forest-labs/flux-redux-dev/predictions")
            .match_header("authorization", "Bearer r8_test")
            .match_header("prefer", "wait")
            .match_body(Matcher::Json(json!({
                "input": {"redux_image": "https://example.com/in.png", "seed": 7}
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "p1",
                    "status": "succeeded",
                    "output": ["https://out/img.png"],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let output = client(&server).run(redux_request()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(
            output,
            Output::Sequence(vec![OutputItem::HasUrl("https://out/img.png".into())])
        );
    }

    #[tokio::test]
    async fn test_run_polls_until_done() {
        let mut server = mockito::Server::new_async().await;
        let poll_url = format!("{}/predictions/p2", server.url());
        let _create = server
            .mock("POST", "/models/black-forest-labs/flux-redux-dev/predictions")
            .with_status(201)
            .with_body(
                json!({"id": "p2", "status": "starting", "urls": {"get": poll_url}})
                    .to_string(),
            )
            .create_async()
            .await;
        let poll = server
            .mock("GET", "/predictions/p2")
            .match_header("authorization", "Bearer r8_test")
            .with_status(200)
            .with_body(
                json!({"id": "p2", "status": "succeeded", "output": "https://out/p2.webp"})
                    .to_string(),
            )
            .create_async()
            .await;

        let output = client(&server).run(redux_request()).await.unwrap();
        poll.assert_async().await;
        assert_eq!(
            output,
            Output::Single(OutputItem::HasUrl("https://out/p2.webp".into()))
        );
    }

    #[tokio::test]
    async fn test_failed_prediction() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/models/black-forest-labs/flux-redux-dev/predictions")
            .with_status(201)
            .with_body(
                json!({"id": "p3", "status": "failed", "error": "NSFW content detected"})
                    .to_string(),
            )
            .create_async()
            .await;

        let err = client(&server).run(redux_request()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Failed { .. }));
        assert_eq!(err.to_string(), "prediction p3 failed: NSFW content detected");
    }

    #[tokio::test]
    async fn test_api_error_detail() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/models/black-forest-labs/flux-redux-dev/predictions")
            .with_status(401)
            .with_body(json!({"title": "Unauthenticated", "detail": "Invalid token."}).to_string())
            .create_async()
            .await;

        let err = client(&server).run(redux_request()).await.unwrap_err();
        match err {
            InvocationError::Api { status, detail } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(detail, "Invalid token.");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_succeeded_without_output() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/models/black-forest-labs/flux-redux-dev/predictions")
            .with_status(201)
            .with_body(json!({"id": "p4", "status": "succeeded", "output": null}).to_string())
            .create_async()
            .await;

        let err = client(&server).run(redux_request()).await.unwrap_err();
        assert!(matches!(err, InvocationError::EmptyOutput(id) if id == "p4"));
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected_locally() {
        let client = ReplicateClient::new(ReplicateSettings::new("")).unwrap();
        let err = client.run(redux_request()).await.unwrap_err();
        assert!(matches!(err, InvocationError::MissingToken));
    }

    #[tokio::test]
    async fn test_canceled_prediction() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/models/black-forest-labs/flux-redux-dev/predictions")
            .with_status(201)
            .with_body(json!({"id": "p5", "status": "canceled", "error": null}).to_string())
            .create_async()
            .await;

        let err = client(&server).run(redux_request()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Failed { ref status, .. } if status == "canceled"));
        assert_eq!(err.to_string(), "prediction p5 canceled: no error reported");
    }

    #[tokio::test]
    async fn test_poll_timeout() {
        let mut server = mockito::Server::new_async().await;
        let poll_url = format!("{}/predictions/p6", server.url());
        let _create = server
            .mock("POST", "/models/black-forest-labs/flux-redux-dev/predictions")
            .with_status(201)
            .with_body(
                json!({"id": "p6", "status": "starting", "urls": {"get": poll_url}})
                    .to_string(),
            )
            .create_async()
            .await;
        let poll = server
            .mock("GET", "/predictions/p6")
            .expect(0)
            .create_async()
            .await;

        let mut settings = ReplicateSettings::new("r8_test").with_api_base(server.url());
        settings.poll_timeout_secs = 0;
        let client = ReplicateClient::new(settings).unwrap();

        let err = client.run(redux_request()).await.unwrap_err();
        poll.assert_async().await;
        match err {
            InvocationError::Timeout { id, timeout } => {
                assert_eq!(id, "p6");
                assert_eq!(timeout, Duration::ZERO);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_running_prediction_without_poll_url() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/models/black-forest-labs/flux-redux-dev/predictions")
            .with_status(201)
            .with_body(json!({"id": "p7", "status": "processing"}).to_string())
            .create_async()
            .await;

        let err = client(&server).run(redux_request()).await.unwrap_err();
        assert!(matches!(err, InvocationError::MissingPollUrl(ref id) if id == "p7"));
        assert_eq!(err.to_string(), "prediction p7 has no poll URL");
    }
}
