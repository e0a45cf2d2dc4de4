//! Configuration types for autojournal-core.
//!
//! This module defines [`Settings`] (the persisted store, `config.yaml` under
//! the autojournal home directory), [`RunOptions`] (per-invocation overrides
//! from the CLI) and [`DateWindow`]. Options in `RunOptions` take precedence
//! over the stored settings for a single run and are never written back.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::error::CoreError;

/// Default name of the autojournal home directory, relative to the working directory.
pub const DEFAULT_HOME_DIR: &str = ".autojournal";

/// Settings file name inside the home directory.
pub const SETTINGS_FILE: &str = "config.yaml";

/// Directory for generated changelogs, next to the home directory.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

// ── Persisted settings ───────────────────────────────────────

/// Persisted autojournal settings, deserialized from `config.yaml`.
///
/// All fields have serde defaults so that a partial (or empty) file produces
/// usable settings. The setter methods consume and return the settings so a
/// modified copy can be saved with [`save_settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Credential for the language-model provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Repository paths, queried in this order.
    #[serde(default)]
    pub repositories: Vec<PathBuf>,

    /// Start of the history window (any expression `git log --since` accepts).
    #[serde(default = "default_since")]
    pub since: String,

    /// End of the history window.
    #[serde(default = "default_until")]
    pub until: String,

    /// Replacement for the built-in changelog instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,

    /// Directory of `.j2`/`.jinja` files overriding the built-in templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,

    /// Explicit output file. Defaults to `outputs/cambios-<username>-<date>.md`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<PathBuf>,

    /// Name used in the default output file name and in the prompt.
    #[serde(default = "default_username")]
    pub username: String,

    /// Language-model provider.
    #[serde(default)]
    pub provider: Provider,

    /// Provider model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Gemini API root override (proxies, local stubs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            repositories: Vec::new(),
            since: default_since(),
            until: default_until(),
            prompt_template: None,
            templates_dir: None,
            save_path: None,
            username: default_username(),
            provider: Provider::default(),
            model: None,
            api_base_url: None,
        }
    }
}

impl Settings {
    /// Store a new API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Replace the start of the history window.
    pub fn with_since(mut self, since: impl Into<String>) -> Self {
        self.since = since.into();
        self
    }

    /// Replace the end of the history window.
    pub fn with_until(mut self, until: impl Into<String>) -> Self {
        self.until = until.into();
        self
    }

    /// Append a repository path unless it is already listed.
    pub fn with_repository(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !self.repositories.contains(&path) {
            self.repositories.push(path);
        }
        self
    }

    /// Remove every occurrence of a repository path.
    pub fn without_repository(mut self, path: &Path) -> Self {
        self.repositories.retain(|p| p != path);
        self
    }

    /// The configured history window.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidWindow` if either bound is empty.
    pub fn window(&self) -> Result<DateWindow, CoreError> {
        DateWindow::new(&self.since, &self.until)
    }

    /// Default output file for a run on `date` (`YYYY-MM-DD`), relative to
    /// the output root.
    pub fn default_output_file(&self, date: &str) -> PathBuf {
        PathBuf::from(DEFAULT_OUTPUT_DIR).join(format!("cambios-{}-{date}.md", self.username))
    }
}

/// Language-model provider used to write the changelog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provider {
    /// Google Gemini over the Generative Language REST API (default).
    #[default]
    Gemini,
    /// Claude through the agent SDK, with tool use disabled.
    Claude,
}

// ── Date window ──────────────────────────────────────────────

/// The `since`/`until` pair bounding the history query.
///
/// Both bounds are free-form expressions interpreted by git ("2 weeks ago",
/// "today", "2026-10-01"). No ordering is enforced. Dates written as
/// `DD/MM/YYYY` are rewritten to `YYYY-MM-DD`, since git would otherwise read
/// them month-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    since: String,
    until: String,
}

impl DateWindow {
    /// Build a window from two date expressions.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidWindow` if either expression is blank.
    pub fn new(since: &str, until: &str) -> Result<Self, CoreError> {
        Ok(Self {
            since: normalize_date_expr("since", since)?,
            until: normalize_date_expr("until", until)?,
        })
    }

    /// Returns the start expression.
    pub fn since(&self) -> &str {
        &self.since
    }

    /// Returns the end expression.
    pub fn until(&self) -> &str {
        &self.until
    }

    /// `git log` arguments selecting this window.
    pub(crate) fn git_args(&self) -> [String; 2] {
        [
            format!("--since={}", self.since),
            format!("--until={}", self.until),
        ]
    }
}

fn normalize_date_expr(field: &str, expr: &str) -> Result<String, CoreError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(CoreError::InvalidWindow(format!("{field} must not be empty")));
    }

    let parts: Vec<&str> = expr.split('/').collect();
    if let [day, month, year] = parts.as_slice()
        && (1..=2).contains(&day.len())
        && (1..=2).contains(&month.len())
        && year.len() == 4
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()))
    {
        return Ok(format!("{year}-{month:0>2}-{day:0>2}"));
    }

    Ok(expr.to_owned())
}

// ── Run options (CLI-level) ──────────────────────────────────

/// Per-run overrides provided by the CLI layer.
///
/// # Examples
///
/// ```
/// use autojournal_core::RunOptions;
///
/// let options = RunOptions::builder()
///     .since("2 weeks ago")
///     .until("today")
///     .build();
/// assert_eq!(options.since(), Some("2 weeks ago"));
/// ```
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct RunOptions {
    /// Override the start of the window.
    #[builder(default, setter(strip_option, into))]
    since: Option<String>,

    /// Override the end of the window.
    #[builder(default, setter(strip_option, into))]
    until: Option<String>,

    /// Override the output file.
    #[builder(default, setter(strip_option, into))]
    output: Option<PathBuf>,

    /// Override the stored API key.
    #[builder(default, setter(strip_option, into))]
    api_key: Option<String>,
}

impl RunOptions {
    /// Build options from optional CLI values.
    ///
    /// Uses struct initialization because typed-builder changes type on each
    /// setter call, which makes conditional fields awkward.
    pub fn from_overrides(
        since: Option<String>,
        until: Option<String>,
        output: Option<PathBuf>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            since,
            until,
            output,
            api_key,
        }
    }

    /// Returns the since override, if set.
    pub fn since(&self) -> Option<&str> {
        self.since.as_deref()
    }

    /// Returns the until override, if set.
    pub fn until(&self) -> Option<&str> {
        self.until.as_deref()
    }

    /// Returns the output override, if set.
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Returns the API key override, if set.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Apply these overrides on top of `settings`.
    pub fn apply(&self, settings: &Settings) -> Settings {
        let mut merged = settings.clone();
        if let Some(since) = &self.since {
            merged = merged.with_since(since.as_str());
        }
        if let Some(until) = &self.until {
            merged = merged.with_until(until.as_str());
        }
        if let Some(output) = &self.output {
            merged.save_path = Some(output.clone());
        }
        if let Some(key) = &self.api_key {
            merged = merged.with_api_key(key.as_str());
        }
        merged
    }
}

// ── Default value functions for serde ────────────────────────

fn default_since() -> String {
    "1 week ago".to_owned()
}

fn default_until() -> String {
    "now".to_owned()
}

fn default_username() -> String {
    "user".to_owned()
}

// ── Settings persistence ─────────────────────────────────────

/// Path of the settings file inside `home`.
pub fn settings_path(home: &Path) -> PathBuf {
    home.join(SETTINGS_FILE)
}

/// Directory that default output paths are resolved against: the parent of
/// `home`. A bare relative home such as `.autojournal` yields an empty path,
/// i.e. the working directory.
pub fn output_root(home: &Path) -> PathBuf {
    home.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Load [`Settings`] from a YAML file.
///
/// If the file does not exist, returns the default settings.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
pub fn load_settings(path: &Path) -> Result<Settings, CoreError> {
    if !path.exists() {
        debug!(path = %path.display(), "settings file missing, using defaults");
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings = serde_yaml::from_str(&content)?;
    Ok(settings)
}

/// Write [`Settings`] to a YAML file, creating its directory if needed.
///
/// # Errors
///
/// Returns `CoreError::Io` if the directory or file cannot be written.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), CoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_yaml::to_string(settings)?;
    std::fs::write(path, content)?;
    debug!(path = %path.display(), "saved settings");
    Ok(())
}
