//! Claude dispatcher (internal).
//!
//! Wraps `claude-agent-sdk-rs` to run a single prompt-only session: the
//! changelog instructions become the system prompt, tool use is disabled via
//! plan mode, and the final result message is returned as the response.

use claude_agent_sdk_rs::{ClaudeAgentOptions, Message, PermissionMode, SystemPrompt};
use tracing::{debug, error, instrument};

use crate::dispatch::{Dispatcher, PromptRequest, non_blank};
use crate::error::CoreError;

/// Sends prompts to Claude through the agent SDK.
#[derive(Debug, Clone, Default)]
pub struct ClaudeDispatcher {
    /// Model override; the SDK default is used when `None`.
    model: Option<String>,
}

impl ClaudeDispatcher {
    /// Create a dispatcher with an optional model override.
    pub fn new(model: Option<String>) -> Self {
        Self { model }
    }

    /// Build SDK options for a prompt-only session.
    fn build_options(&self, instructions: &str) -> ClaudeAgentOptions {
        ClaudeAgentOptions {
            system_prompt: Some(SystemPrompt::Text(instructions.to_owned())),
            permission_mode: Some(PermissionMode::Plan),
            model: self.model.clone(),
            ..Default::default()
        }
    }
}

impl Dispatcher for ClaudeDispatcher {
    #[instrument(skip_all, fields(model = ?self.model, payload_len = request.payload.len()))]
    async fn dispatch(&self, request: &PromptRequest) -> Result<String, CoreError> {
        let options = self.build_options(&request.instructions);

        let messages = claude_agent_sdk_rs::query(request.payload.as_str(), Some(options))
            .await
            .map_err(|e| {
                error!(error = %e, "claude query failed");
                CoreError::Dispatch(format!(
                    "claude query failed: {e}. Check your network connection and API credentials."
                ))
            })?;

        debug!(messages = messages.len(), "claude session finished");
        result_text(&messages)
    }
}

/// Text of the final result message.
fn result_text(messages: &[Message]) -> Result<String, CoreError> {
    let result = messages
        .iter()
        .rev()
        .find_map(|m| match m {
            Message::Result(r) => Some(r),
            _ => None,
        })
        .ok_or_else(|| CoreError::Dispatch("claude session ended without result".to_owned()))?;

    if result.is_error {
        return Err(CoreError::Dispatch(format!(
            "claude session failed: {}",
            result.result.as_deref().unwrap_or("unknown error")
        )));
    }

    non_blank(result.result.clone().unwrap_or_default(), "claude")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_build_prompt_only_options() {
        let dispatcher = ClaudeDispatcher::new(Some("claude-sonnet-4-20250514".to_owned()));
        let options = dispatcher.build_options("Agrupa por fecha.");

        assert_eq!(options.model.as_deref(), Some("claude-sonnet-4-20250514"));
        assert!(matches!(
            options.system_prompt,
            Some(SystemPrompt::Text(ref text)) if text == "Agrupa por fecha."
        ));
        assert!(matches!(options.permission_mode, Some(PermissionMode::Plan)));
    }

    #[test]
    fn test_should_use_sdk_default_model() {
        let options = ClaudeDispatcher::default().build_options("x");
        assert!(options.model.is_none());
    }

    #[test]
    fn test_should_fail_without_result_message() {
        let err = result_text(&[]).unwrap_err();
        assert!(matches!(err, CoreError::Dispatch(ref msg) if msg.contains("without result")));
    }
}
