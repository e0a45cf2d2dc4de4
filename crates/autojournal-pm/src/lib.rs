//! Prompt templates for autojournal.
//!
//! Ships the built-in changelog instruction and task templates and renders
//! them (or user overrides) with minijinja.

mod error;
mod manager;
mod template;

pub use error::PmError;
pub use manager::{PromptManager, SYSTEM_TEMPLATE, TASK_TEMPLATE};
pub use template::PromptTemplate;
