//! Repository log collection.
//!
//! Decides whether a path is a usable git repository and, if so, runs
//! `git log` for a [`DateWindow`] inside it. Every outcome is reported as a
//! [`LogOutcome`]; the only condition that callers are expected to treat as
//! fatal is [`LogOutcome::ToolUnavailable`]. Git commands are executed
//! asynchronously via `tokio::process::Command`.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::config::DateWindow;

/// Diagnostic reported for paths that are not git repositories.
pub const NOT_A_REPOSITORY: &str = "not a repository";

/// One commit per line: short hash, committer date, author, subject.
///
/// `--since`/`--until` filter on the committer date, so that is the date shown.
const LOG_FORMAT: &str = "--pretty=format:%h %cd %an: %s";

/// A candidate repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryPath {
    /// The path as configured.
    raw: PathBuf,
    /// Canonical path when it exists, otherwise the absolute form of `raw`.
    absolute: PathBuf,
    /// Last component of `absolute`.
    name: String,
}

impl RepositoryPath {
    /// Resolve a configured path. Never fails: missing paths keep their
    /// absolute (non-canonical) form.
    pub fn new(raw: impl Into<PathBuf>) -> Self {
        let raw = raw.into();
        let absolute = std::fs::canonicalize(&raw)
            .or_else(|_| std::path::absolute(&raw))
            .unwrap_or_else(|_| raw.clone());
        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| absolute.display().to_string());

        Self {
            raw,
            absolute,
            name,
        }
    }

    /// Returns the path as configured.
    pub fn raw(&self) -> &Path {
        &self.raw
    }

    /// Returns the normalized absolute path.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Returns the short repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the path is a directory holding git metadata.
    ///
    /// `.git` may be a directory or, for worktrees and submodules, a file.
    pub fn is_repository(&self) -> bool {
        self.absolute.is_dir() && self.absolute.join(".git").exists()
    }
}

/// Result of querying one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    /// The query succeeded; the text may be empty when the window has no commits.
    Collected(String),
    /// The path is missing, not a directory, or not a git repository.
    NotARepository,
    /// Git ran but failed for this repository.
    QueryFailed(String),
    /// The git executable could not be found.
    ToolUnavailable(String),
}

/// The history query result for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLogEntry {
    /// The repository that was queried.
    pub repository: RepositoryPath,
    /// What happened.
    pub outcome: LogOutcome,
}

impl RepositoryLogEntry {
    /// Create an entry for `repository`.
    pub fn new(repository: RepositoryPath, outcome: LogOutcome) -> Self {
        Self {
            repository,
            outcome,
        }
    }

    /// Returns the short repository name.
    pub fn name(&self) -> &str {
        self.repository.name()
    }

    /// Whether the query succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, LogOutcome::Collected(_))
    }

    /// Raw history text; empty unless the query succeeded.
    pub fn history(&self) -> &str {
        match &self.outcome {
            LogOutcome::Collected(text) => text,
            _ => "",
        }
    }

    /// Whether the entry contributes text to the payload.
    pub fn has_history(&self) -> bool {
        !self.history().trim().is_empty()
    }

    /// Human-readable reason for a failed entry.
    pub fn diagnostic(&self) -> Option<&str> {
        match &self.outcome {
            LogOutcome::Collected(_) => None,
            LogOutcome::NotARepository => Some(NOT_A_REPOSITORY),
            LogOutcome::QueryFailed(msg) | LogOutcome::ToolUnavailable(msg) => Some(msg),
        }
    }
}

/// Source of per-repository history.
pub trait LogSource {
    /// Query `path` over `window`. Failures are reported in the entry, never panicked.
    fn collect(
        &self,
        path: &RepositoryPath,
        window: &DateWindow,
    ) -> impl Future<Output = RepositoryLogEntry>;
}

/// Collects history by running the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCollector {
    /// Program to execute; `git` resolved through `PATH` by default.
    program: PathBuf,
}

impl Default for GitCollector {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl GitCollector {
    /// Create a collector that runs `git` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collector that runs a specific git executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run_log(&self, path: &RepositoryPath, window: &DateWindow) -> LogOutcome {
        let [since, until] = window.git_args();

        let output = match tokio::process::Command::new(&self.program)
            .args(["log", "--no-color", "--date=short", LOG_FORMAT])
            .arg(since)
            .arg(until)
            .current_dir(path.absolute())
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return LogOutcome::ToolUnavailable(format!(
                    "command '{}' not found: {e}. Is git installed and in your PATH?",
                    self.program.display()
                ));
            }
            Err(e) => {
                return LogOutcome::QueryFailed(format!(
                    "failed to run '{}': {e}",
                    self.program.display()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{stdout}{stderr}").trim().to_owned();
            if combined.to_lowercase().contains("not a git repository") {
                return LogOutcome::NotARepository;
            }
            if combined.is_empty() {
                return LogOutcome::QueryFailed(format!("git log exited with {}", output.status));
            }
            return LogOutcome::QueryFailed(combined);
        }

        LogOutcome::Collected(stdout.into_owned())
    }
}

impl LogSource for GitCollector {
    #[instrument(skip(self, window), fields(repo = %path.name()))]
    async fn collect(&self, path: &RepositoryPath, window: &DateWindow) -> RepositoryLogEntry {
        if !path.is_repository() {
            debug!(path = %path.absolute().display(), "no git metadata, skipping");
            return RepositoryLogEntry::new(path.clone(), LogOutcome::NotARepository);
        }

        debug!(
            path = %path.absolute().display(),
            since = window.since(),
            until = window.until(),
            "running git log"
        );
        let outcome = self.run_log(path, window).await;
        RepositoryLogEntry::new(path.clone(), outcome)
    }
}
