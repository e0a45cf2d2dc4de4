//! Changelog pipeline.
//!
//! The [`Engine`] ties the stages together: collect history from every
//! configured repository, render the prompt, dispatch it to the model and
//! persist the answer.

use std::path::PathBuf;

use autojournal_pm::{PromptManager, PromptTemplate, SYSTEM_TEMPLATE, TASK_TEMPLATE};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{AggregatedPayload, Aggregator};
use crate::clock;
use crate::config::{RunOptions, Settings};
use crate::dispatch::{Dispatcher, ModelDispatcher, PromptRequest, non_blank};
use crate::error::CoreError;
use crate::git::{GitCollector, LogSource, RepositoryLogEntry, RepositoryPath};
use crate::output::{OutputWriter, strip_code_fences};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The changelog was written to this path.
    Written(PathBuf),
    /// No repository had history in the window; the model was not called.
    NothingToSummarize,
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One entry per configured repository, in configuration order.
    pub entries: Vec<RepositoryLogEntry>,
    /// What the run produced.
    pub outcome: RunOutcome,
}

/// Drives the collect → summarize → persist pipeline.
///
/// Created from loaded [`Settings`]; per-run overrides are passed as
/// [`RunOptions`] to each stage and never change the stored settings.
///
/// # Examples
///
/// ```no_run
/// use autojournal_core::{Engine, RunOptions, Settings};
///
/// # async fn example() -> Result<(), autojournal_core::CoreError> {
/// let settings = Settings::default()
///     .with_api_key("key")
///     .with_repository("/work/api");
/// let engine = Engine::new(settings)?;
/// let report = engine.run(&RunOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine<S = GitCollector> {
    /// Stored settings.
    settings: Settings,
    /// Changelog templates, with the user's instruction override applied.
    prompt_manager: PromptManager,
    /// Runs the history query over all repositories.
    aggregator: Aggregator<S>,
    /// Collision-safe output.
    writer: OutputWriter,
    /// Directory the default output path is resolved against.
    output_root: PathBuf,
}

impl Engine<GitCollector> {
    /// Create an engine that queries repositories with `git`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if the configured prompt template is invalid.
    pub fn new(settings: Settings) -> Result<Self, CoreError> {
        Self::with_source(settings, GitCollector::new())
    }
}

impl<S: LogSource> Engine<S> {
    /// Create an engine over a custom history source.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if the templates directory or the
    /// configured prompt template is invalid.
    #[instrument(skip_all)]
    pub fn with_source(settings: Settings, source: S) -> Result<Self, CoreError> {
        let mut prompt_manager = PromptManager::new()?;

        if let Some(dir) = &settings.templates_dir {
            prompt_manager.load_dir(dir)?;
        }

        if let Some(template) = settings
            .prompt_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
        {
            prompt_manager.add_template(PromptTemplate::new(SYSTEM_TEMPLATE, template))?;
            debug!("using configured prompt template");
        }
        debug!(templates = ?prompt_manager.list_templates(), "prompt templates ready");

        Ok(Self {
            settings,
            prompt_manager,
            aggregator: Aggregator::new(source),
            writer: OutputWriter::new(),
            output_root: PathBuf::new(),
        })
    }

    /// Resolve the default output path against `root` instead of the
    /// working directory.
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Returns the stored settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Collect history from every configured repository.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidWindow` for a blank date expression and
    /// `CoreError::ToolUnavailable` when git is missing.
    #[instrument(skip_all)]
    async fn collect(&self, options: &RunOptions) -> Result<AggregatedPayload, CoreError> {
        let settings = options.apply(&self.settings);
        let window = settings.window()?;
        let paths: Vec<RepositoryPath> = settings
            .repositories
            .iter()
            .map(RepositoryPath::new)
            .collect();

        if paths.is_empty() {
            warn!("no repositories configured");
        }

        self.aggregator.aggregate(&paths, &window).await
    }

    /// Render the instructions and the task prompt for `payload`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if a template fails to render.
    fn build_request(
        &self,
        payload: &AggregatedPayload,
        options: &RunOptions,
    ) -> Result<PromptRequest, CoreError> {
        let settings = options.apply(&self.settings);
        let window = settings.window()?;
        let context = json!({
            "since": window.since(),
            "until": window.until(),
            "username": settings.username,
            "payload": payload.text(),
        });

        Ok(PromptRequest {
            instructions: self.prompt_manager.render(SYSTEM_TEMPLATE, &context)?,
            payload: self.prompt_manager.render(TASK_TEMPLATE, &context)?,
        })
    }

    /// Ask the model for a changelog of `payload`, with code fences removed.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyPayload` without calling the dispatcher when
    /// the payload is empty, `CoreError::Dispatch` when nothing is left once
    /// the fences are removed, or the dispatcher's error.
    #[instrument(skip_all, fields(repos = payload.contributing()))]
    async fn summarize<D: Dispatcher>(
        &self,
        payload: &AggregatedPayload,
        options: &RunOptions,
        dispatcher: &D,
    ) -> Result<String, CoreError> {
        if payload.is_empty() {
            return Err(CoreError::EmptyPayload);
        }

        let request = self.build_request(payload, options)?;
        info!(chars = request.payload.len(), "dispatching prompt");
        let response = dispatcher.dispatch(&request).await?;
        non_blank(strip_code_fences(&response), "the model")
    }

    /// Write `changelog` to the configured output path (or a free sibling).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Persist` if the file cannot be written.
    fn persist(&self, changelog: &str, options: &RunOptions) -> Result<PathBuf, CoreError> {
        let target = self.output_path(options, &clock::today_utc());
        self.writer.write(changelog, &target)
    }

    /// Where a run on `date` writes unless the target is already taken.
    pub fn output_path(&self, options: &RunOptions, date: &str) -> PathBuf {
        let settings = options.apply(&self.settings);
        match &settings.save_path {
            Some(path) => path.clone(),
            None => self.output_root.join(settings.default_output_file(date)),
        }
    }

    /// Run the whole pipeline with the dispatcher selected by the settings.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if the provider is not usable, or any error
    /// of [`run_with`](Self::run_with).
    pub async fn run(&self, options: &RunOptions) -> Result<RunReport, CoreError> {
        let dispatcher = ModelDispatcher::from_settings(&options.apply(&self.settings))?;
        self.run_with(options, &dispatcher).await
    }

    /// Run the whole pipeline with an explicit dispatcher.
    ///
    /// An empty payload ends the run with [`RunOutcome::NothingToSummarize`]
    /// and the dispatcher is never called.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ToolUnavailable`, `CoreError::Dispatch` or
    /// `CoreError::Persist` from the corresponding stage.
    #[instrument(skip_all)]
    pub async fn run_with<D: Dispatcher>(
        &self,
        options: &RunOptions,
        dispatcher: &D,
    ) -> Result<RunReport, CoreError> {
        let payload = self.collect(options).await?;

        if payload.is_empty() {
            info!("nothing to summarize");
            let (_, entries) = payload.into_parts();
            return Ok(RunReport {
                entries,
                outcome: RunOutcome::NothingToSummarize,
            });
        }

        let changelog = self.summarize(&payload, options, dispatcher).await?;
        let path = self.persist(&changelog, options)?;

        let (_, entries) = payload.into_parts();
        Ok(RunReport {
            entries,
            outcome: RunOutcome::Written(path),
        })
    }
}
