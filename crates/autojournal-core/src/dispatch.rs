//! Language-model dispatch.
//!
//! A [`Dispatcher`] turns the rendered instructions plus the aggregated
//! history into changelog text. Failures are never masked: a dispatcher that
//! gets no usable text back returns `CoreError::Dispatch`.

use std::future::Future;

use serde::Serialize;
use tracing::debug;

use crate::agent::ClaudeDispatcher;
use crate::config::{Provider, Settings};
use crate::error::CoreError;
use crate::gemini::GeminiDispatcher;

/// What is sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptRequest {
    /// System-level formatting instructions.
    pub instructions: String,
    /// User content: the window description and the aggregated history.
    pub payload: String,
}

/// Sends a prompt to a language model.
pub trait Dispatcher {
    /// Return the model's response text.
    fn dispatch(&self, request: &PromptRequest) -> impl Future<Output = Result<String, CoreError>>;
}

/// The dispatcher selected by [`Settings::provider`].
#[derive(Debug)]
pub enum ModelDispatcher {
    Gemini(GeminiDispatcher),
    Claude(ClaudeDispatcher),
}

impl ModelDispatcher {
    /// Build the configured dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if the Gemini provider is selected without an API key.
    pub fn from_settings(settings: &Settings) -> Result<Self, CoreError> {
        debug!(provider = ?settings.provider, model = ?settings.model, "selecting dispatcher");
        match settings.provider {
            Provider::Gemini => {
                let key = settings
                    .api_key
                    .as_deref()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        CoreError::Config(
                            "no Gemini API key configured; run `autojournal set-key <KEY>` or pass --api-key"
                                .to_owned(),
                        )
                    })?;
                Ok(Self::Gemini(GeminiDispatcher::configured(key, settings)))
            }
            Provider::Claude => Ok(Self::Claude(ClaudeDispatcher::new(settings.model.clone()))),
        }
    }
}

impl Dispatcher for ModelDispatcher {
    async fn dispatch(&self, request: &PromptRequest) -> Result<String, CoreError> {
        match self {
            Self::Gemini(d) => d.dispatch(request).await,
            Self::Claude(d) => d.dispatch(request).await,
        }
    }
}

/// Reject responses with no visible text.
pub(crate) fn non_blank(text: String, provider: &str) -> Result<String, CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::Dispatch(format!("{provider} returned an empty response")));
    }
    Ok(text)
}
