//! Gemini dispatcher over the Generative Language REST API.

use serde_json::{Value, json};
use tracing::{debug, error, instrument, warn};

use crate::config::Settings;
use crate::dispatch::{Dispatcher, PromptRequest, non_blank};
use crate::error::CoreError;

/// Model used when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upper bound on the changelog length requested from the model.
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Sends prompts to Gemini's `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiDispatcher {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiDispatcher {
    /// Create a dispatcher for `model` (or [`DEFAULT_GEMINI_MODEL`]).
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_owned()),
            base_url: GEMINI_API_BASE.to_owned(),
        }
    }

    /// Create a dispatcher with the model and API root from `settings`.
    pub fn configured(api_key: impl Into<String>, settings: &Settings) -> Self {
        let dispatcher = Self::new(api_key, settings.model.clone());
        match settings.api_base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(base_url) => dispatcher.with_base_url(base_url.trim()),
            None => dispatcher,
        }
    }

    /// Point the dispatcher at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Returns the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Check the API key by listing the available models.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if Gemini rejects the key and
    /// `CoreError::Dispatch` if the API cannot be reached.
    #[instrument(skip_all)]
    pub async fn verify_key(&self) -> Result<(), CoreError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gemini key check failed");
                CoreError::Dispatch(format!("could not reach gemini to check the API key: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "gemini rejected the API key");
            return Err(CoreError::Config(format!(
                "gemini rejected the API key ({status})"
            )));
        }
        debug!("api key accepted");
        Ok(())
    }
}

impl Dispatcher for GeminiDispatcher {
    #[instrument(skip_all, fields(model = %self.model, payload_len = request.payload.len()))]
    async fn dispatch(&self, request: &PromptRequest) -> Result<String, CoreError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gemini request failed");
                CoreError::Dispatch(format!(
                    "gemini request failed: {e}. Check your network connection and API key."
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "gemini returned an error status");
            return Err(CoreError::Dispatch(format!("gemini returned {status}: {body}")));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| CoreError::Dispatch(format!("invalid gemini response: {e}")))?;
        let text = extract_text(&value)?;
        debug!(chars = text.len(), "received gemini response");
        Ok(text)
    }
}

fn request_body(request: &PromptRequest) -> Value {
    json!({
        "systemInstruction": {
            "parts": [{ "text": request.instructions }]
        },
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.payload }]
        }],
        "generationConfig": {
            "maxOutputTokens": MAX_OUTPUT_TOKENS
        }
    })
}

/// Join the text parts of the first candidate.
fn extract_text(value: &Value) -> Result<String, CoreError> {
    let parts = value["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = value["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or("no candidates");
            CoreError::Dispatch(format!("gemini returned no text ({reason})"))
        })?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    non_blank(text, "gemini")
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    /// Answer a single HTTP request with `status` and `body`; the handle
    /// yields the request head as received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (base_url, handle)
    }

    #[test]
    fn test_should_build_request_with_system_instruction() {
        let request = PromptRequest {
            instructions: "Agrupa por fecha.".to_owned(),
            payload: "--- Repository: api ---\na1 fix".to_owned(),
        };
        let body = request_body(&request);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Agrupa por fecha.");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "--- Repository: api ---\na1 fix"
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn test_should_join_candidate_text_parts() {
        let value = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "# (Fecha: 01/03/2024)\n" }, { "text": "## Repositorio: api" }] }
            }]
        });
        let text = extract_text(&value).expect("should extract");
        assert_eq!(text, "# (Fecha: 01/03/2024)\n## Repositorio: api");
    }

    #[test]
    fn test_should_fail_on_blocked_prompt() {
        let value = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = extract_text(&value).unwrap_err();
        assert!(matches!(err, CoreError::Dispatch(ref msg) if msg.contains("SAFETY")));
    }

    #[test]
    fn test_should_fail_on_blank_text() {
        let value = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(matches!(extract_text(&value), Err(CoreError::Dispatch(_))));
    }

    #[test]
    fn test_should_build_endpoint_from_model_and_base_url() {
        let dispatcher = GeminiDispatcher::new("k", None);
        assert_eq!(dispatcher.model(), DEFAULT_GEMINI_MODEL);
        assert_eq!(
            dispatcher.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        let dispatcher = GeminiDispatcher::new("k", Some("gemini-2.5-pro".to_owned()))
            .with_base_url("http://localhost:8080/");
        assert_eq!(
            dispatcher.endpoint(),
            "http://localhost:8080/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn test_should_take_model_and_base_url_from_settings() {
        let settings = Settings {
            model: Some("gemini-2.5-pro".to_owned()),
            api_base_url: Some("http://proxy.local/v1beta/".to_owned()),
            ..Settings::default()
        };
        let dispatcher = GeminiDispatcher::configured("k", &settings);
        assert_eq!(
            dispatcher.endpoint(),
            "http://proxy.local/v1beta/models/gemini-2.5-pro:generateContent"
        );

        let dispatcher = GeminiDispatcher::configured("k", &Settings::default());
        assert!(dispatcher.endpoint().starts_with(GEMINI_API_BASE));
    }

    #[tokio::test]
    async fn test_should_report_transport_failure() {
        // Port 9 on localhost is the discard service and is not listening in test environments.
        let dispatcher = GeminiDispatcher::new("k", None).with_base_url("http://127.0.0.1:9");
        let request = PromptRequest {
            instructions: "i".to_owned(),
            payload: "p".to_owned(),
        };
        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(matches!(err, CoreError::Dispatch(_)));
    }

    #[tokio::test]
    async fn test_should_accept_key_that_lists_models() {
        let (base_url, server) = serve_once("200 OK", r#"{"models":[]}"#).await;
        let dispatcher = GeminiDispatcher::new("good-key", None).with_base_url(base_url);

        dispatcher.verify_key().await.expect("key should be accepted");

        let head = server.await.unwrap().to_lowercase();
        assert!(head.starts_with("get /models "), "unexpected request: {head}");
        assert!(head.contains("x-goog-api-key: good-key"));
    }

    #[tokio::test]
    async fn test_should_reject_key_refused_by_gemini() {
        let (base_url, server) = serve_once("400 Bad Request", r#"{"error":{"status":"INVALID_ARGUMENT"}}"#).await;
        let dispatcher = GeminiDispatcher::new("bad-key", None).with_base_url(base_url);

        let err = dispatcher.verify_key().await.unwrap_err();

        assert!(matches!(err, CoreError::Config(ref msg) if msg.contains("400")));
        server.await.unwrap();
    }
}
