use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("history tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("invalid date window: {0}")]
    InvalidWindow(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("nothing to summarize: no repository had history in the window")]
    EmptyPayload,

    #[error("model dispatch failed: {0}")]
    Dispatch(String),

    #[error("could not persist output to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("prompt error: {0}")]
    Prompt(#[from] autojournal_pm::PmError),

    #[error("invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
