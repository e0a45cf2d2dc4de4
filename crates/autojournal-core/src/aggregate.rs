//! Multi-repository aggregation.
//!
//! Runs a [`LogSource`] over an ordered list of repositories and joins the
//! non-empty histories into one payload, each block introduced by a header
//! naming its repository.

use tracing::{error, info, instrument, warn};

use crate::config::DateWindow;
use crate::error::CoreError;
use crate::git::{LogOutcome, LogSource, RepositoryLogEntry, RepositoryPath};

/// Header line introducing one repository's history in the payload.
pub fn repository_header(name: &str) -> String {
    format!("\n--- Repository: {name} ---\n")
}

/// Concatenated history of all repositories for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedPayload {
    text: String,
    entries: Vec<RepositoryLogEntry>,
}

impl AggregatedPayload {
    /// The payload text; empty when no repository had history.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether there is nothing to summarize.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Every entry collected, in input order, including failed ones.
    pub fn entries(&self) -> &[RepositoryLogEntry] {
        &self.entries
    }

    /// Number of repositories that contributed a block.
    pub fn contributing(&self) -> usize {
        self.entries.iter().filter(|e| e.has_history()).count()
    }

    /// Split into the payload text and the collected entries.
    pub fn into_parts(self) -> (String, Vec<RepositoryLogEntry>) {
        (self.text, self.entries)
    }
}

/// Runs a [`LogSource`] over many repositories, one at a time.
#[derive(Debug, Clone, Default)]
pub struct Aggregator<S> {
    source: S,
}

impl<S: LogSource> Aggregator<S> {
    /// Create an aggregator over `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Returns the underlying log source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Collect every path in order and build the payload.
    ///
    /// Repositories that fail or have no history in the window are recorded
    /// in the entries but add nothing to the text.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ToolUnavailable` as soon as the source reports that
    /// git is missing; anything gathered so far is discarded.
    #[instrument(skip_all, fields(repos = paths.len(), since = window.since(), until = window.until()))]
    pub async fn aggregate(
        &self,
        paths: &[RepositoryPath],
        window: &DateWindow,
    ) -> Result<AggregatedPayload, CoreError> {
        let mut payload = AggregatedPayload::default();

        for path in paths {
            let entry = self.source.collect(path, window).await;

            match &entry.outcome {
                LogOutcome::ToolUnavailable(reason) => {
                    error!(repo = entry.name(), reason = %reason, "history tool unavailable, aborting");
                    return Err(CoreError::ToolUnavailable(reason.clone()));
                }
                LogOutcome::NotARepository => {
                    warn!(path = %path.raw().display(), "skipping: not a git repository");
                }
                LogOutcome::QueryFailed(reason) => {
                    warn!(repo = entry.name(), reason = %reason, "git log failed, skipping");
                }
                LogOutcome::Collected(_) if !entry.has_history() => {
                    info!(repo = entry.name(), "no commits in window");
                }
                LogOutcome::Collected(history) => {
                    info!(repo = entry.name(), commits = history.lines().count(), "collected history");
                    payload.text.push_str(&repository_header(entry.name()));
                    payload.text.push_str(history);
                }
            }

            payload.entries.push(entry);
        }

        Ok(payload)
    }
}
