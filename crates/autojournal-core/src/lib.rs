//! Core pipeline for autojournal.
//!
//! Collects `git log` output for a date window across many repositories,
//! sends it to a language model with changelog instructions, and writes the
//! answer to a Markdown file without ever overwriting an earlier one.

mod agent;
mod aggregate;
pub mod clock;
mod config;
mod dispatch;
mod engine;
mod error;
mod gemini;
mod git;
mod output;
#[cfg(test)]
mod test_support;

pub use agent::ClaudeDispatcher;
pub use aggregate::{AggregatedPayload, Aggregator, repository_header};
pub use config::{
    DEFAULT_HOME_DIR, DEFAULT_OUTPUT_DIR, DateWindow, Provider, RunOptions, SETTINGS_FILE,
    Settings, load_settings, output_root, save_settings, settings_path,
};
pub use dispatch::{Dispatcher, ModelDispatcher, PromptRequest};
pub use engine::{Engine, RunOutcome, RunReport};
pub use error::CoreError;
pub use gemini::{DEFAULT_GEMINI_MODEL, GeminiDispatcher};
pub use git::{
    GitCollector, LogOutcome, LogSource, NOT_A_REPOSITORY, RepositoryLogEntry, RepositoryPath,
};
pub use output::{OutputWriter, strip_code_fences, suffixed_path};
