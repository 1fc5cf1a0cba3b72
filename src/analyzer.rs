use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 10;
const CACHE_KEY_PREFIX_CHARS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Quick,
    Comprehensive,
    Exhaustive,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Quick => "quick",
            AnalysisMode::Comprehensive => "comprehensive",
            AnalysisMode::Exhaustive => "exhaustive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quick" => Some(AnalysisMode::Quick),
            "comprehensive" => Some(AnalysisMode::Comprehensive),
            "exhaustive" => Some(AnalysisMode::Exhaustive),
            _ => None,
        }
    }
}

impl Default for AnalysisMode {
    fn default() -> Self {
        AnalysisMode::Comprehensive
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    /// Base64-encoded document content.
    pub document_data: String,
    pub mime_type: String,
    pub mode: AnalysisMode,
}

/// The black-box analysis boundary: binary content in, raw structured
/// payload out, or failure. Callers substitute the fixed fallback result on
/// any error.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> AppResult<Value>;
    fn model_name(&self) -> &str;
}

pub struct AnalysisClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    cache: Option<Mutex<HashMap<String, Value>>>,
}

impl AnalysisClient {
    /// `None` when no API key is configured; the ingestion gate then serves
    /// the fallback result without any network round trip.
    pub fn maybe_new(config: &AppConfig) -> AppResult<Option<Self>> {
        let api_key = match config.analysis_api_key.clone() {
            Some(key) => key,
            None => return Ok(None),
        };

        let http = Client::builder()
            .user_agent(concat!("disaster-ai/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.analysis_timeout_secs))
            .build()?;

        Ok(Some(Self {
            http,
            endpoint: config.analysis_endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: config.analysis_model.clone(),
            cache: config
                .analysis_cache_enabled
                .then(|| Mutex::new(HashMap::new())),
        }))
    }

    async fn request_once(&self, request: &AnalysisRequest) -> AppResult<Value> {
        let url = format!("{}/{}:analyze", self.endpoint, self.model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({
                "document": request.document_data,
                "mimeType": request.mime_type,
                "mode": request.mode.as_str(),
            }))
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        parse_model_response(&body)
    }
}

#[async_trait]
impl DocumentAnalyzer for AnalysisClient {
    async fn analyze(&self, request: &AnalysisRequest) -> AppResult<Value> {
        let cache_key = cache_key(request);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(&cache_key).cloned() {
                debug!(model = %self.model, "analysis cache hit");
                return Ok(hit);
            }
        }

        let mut attempt = 0;
        let payload = loop {
            attempt += 1;
            match self.request_once(request).await {
                Ok(payload) => break payload,
                Err(err) if attempt < MAX_ATTEMPTS && should_retry(&err) => {
                    let wait = (BASE_BACKOFF_SECS << (attempt - 1)).min(MAX_BACKOFF_SECS);
                    warn!(?err, attempt, wait_secs = wait, "analysis attempt failed; retrying");
                    sleep(Duration::from_secs(wait)).await;
                }
                Err(err) => return Err(err),
            }
        };

        if let Some(cache) = &self.cache {
            cache.lock().insert(cache_key, payload.clone());
        }
        Ok(payload)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn should_retry(err: &AppError) -> bool {
    match err {
        AppError::Http(http) => http
            .status()
            .map(|status| status.is_server_error())
            .unwrap_or(true),
        _ => false,
    }
}

fn cache_key(request: &AnalysisRequest) -> String {
    let prefix: String = request
        .document_data
        .chars()
        .take(CACHE_KEY_PREFIX_CHARS)
        .collect();
    let digest = Sha256::digest(format!("{}:{prefix}", request.mime_type).as_bytes());
    format!("{digest:x}")
}

/// Model output is nominally raw JSON, but real responses show up wrapped in
/// markdown fences or with prose around the object. Strip the wrapping, then
/// as a last resort parse the outermost brace span.
pub fn parse_model_response(body: &str) -> AppResult<Value> {
    let mut text = body.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped.trim_start();
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped.trim_start();
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped.trim_end();
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    let start = text.find('{');
    let end = text.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(AppError::Parse(format!(
        "response is not valid JSON: {}",
        text.chars().take(120).collect::<String>()
    )))
}

#[cfg(test)]
mod tests {
    use httptest::matchers::{all_of, request};
    use httptest::responders::json_encoded;
    use httptest::{Expectation, Server};
    use serde_json::json;

    use super::*;

    fn client_for(server: &Server, cache_enabled: bool) -> AnalysisClient {
        std::env::remove_var("ANALYSIS_API_KEY");
        let mut config = AppConfig::from_env();
        config.analysis_api_key = Some(SecretString::from("test-key"));
        config.analysis_endpoint = server.url("/v1/models").to_string();
        config.analysis_model = "geo-model".into();
        config.analysis_cache_enabled = cache_enabled;
        AnalysisClient::maybe_new(&config)
            .expect("client creation")
            .expect("api key configured")
    }

    fn sample_request() -> AnalysisRequest {
        AnalysisRequest {
            document_data: "ZG9jdW1lbnQ=".into(),
            mime_type: "application/pdf".into(),
            mode: AnalysisMode::default(),
        }
    }

    #[test]
    fn parses_raw_fenced_and_embedded_json() {
        let expected = json!({ "riskScore": 42 });
        let cases = [
            r#"{ "riskScore": 42 }"#,
            "```json\n{ \"riskScore\": 42 }\n```",
            "```\n{ \"riskScore\": 42 }\n```",
            r#"Here is the result: { "riskScore": 42 } as requested."#,
        ];
        for case in cases {
            assert_eq!(parse_model_response(case).unwrap(), expected);
        }
    }

    #[test]
    fn rejects_unparseable_bodies() {
        assert!(parse_model_response("no json here").is_err());
        assert!(parse_model_response("{ truncated").is_err());
    }

    #[test]
    fn non_http_errors_are_not_retryable() {
        assert!(!should_retry(&AppError::Parse("bad".into())));
        assert!(!should_retry(&AppError::Config("bad".into())));
    }

    #[test]
    fn missing_api_key_disables_the_client() {
        std::env::remove_var("ANALYSIS_API_KEY");
        let mut config = AppConfig::from_env();
        config.analysis_api_key = None;
        assert!(AnalysisClient::maybe_new(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn analyze_posts_document_and_parses_payload() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of!(
                request::method("POST"),
                request::path("/v1/models/geo-model:analyze")
            ))
            .respond_with(json_encoded(json!({
                "summary": "Two zones mapped.",
                "riskScore": 61
            }))),
        );

        let client = client_for(&server, false);
        let payload = client.analyze(&sample_request()).await.unwrap();
        assert_eq!(payload["riskScore"], 61);
    }

    #[tokio::test]
    async fn identical_documents_hit_upstream_once() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of!(
                request::method("POST"),
                request::path("/v1/models/geo-model:analyze")
            ))
            .times(1)
            .respond_with(json_encoded(json!({ "riskScore": 12 }))),
        );

        let client = client_for(&server, true);
        let first = client.analyze(&sample_request()).await.unwrap();
        let second = client.analyze(&sample_request()).await.unwrap();
        assert_eq!(first, second);
    }
}
