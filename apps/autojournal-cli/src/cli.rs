use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use autojournal_core::{
    CoreError, DEFAULT_HOME_DIR, Engine, GeminiDispatcher, LogOutcome, Provider,
    RepositoryLogEntry, RunOptions, RunOutcome, Settings, load_settings, output_root,
    save_settings, settings_path,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::prompt::{prompt_repositories, read_api_key};

#[derive(Debug, Parser)]
#[command(
    name = "autojournal",
    version,
    about = "Make a changelog automatically from the git history of your repositories",
    after_help = "Dates accept DD/MM/YYYY, YYYY-MM-DD or phrases like 'today' and '2 weeks ago'."
)]
pub struct Cli {
    /// Directory holding config.yaml and logs
    #[arg(long, global = true, default_value = DEFAULT_HOME_DIR, env = "AUTOJOURNAL_HOME")]
    pub home: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Collect recent commits, ask the model for a changelog and save it
    Run {
        /// Start of the window (overrides the stored value for this run)
        #[arg(short, long)]
        since: Option<String>,

        /// End of the window (overrides the stored value for this run)
        #[arg(short, long)]
        until: Option<String>,

        /// Output file (defaults to outputs/cambios-<username>-<date>.md)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// API key for this run
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Store the model API key
    SetKey {
        /// The API key
        key: String,

        /// Store the key without checking it against Gemini
        #[arg(long)]
        no_verify: bool,
    },

    /// Store the default date window
    Window {
        /// Start of the window
        #[arg(short, long)]
        since: Option<String>,

        /// End of the window
        #[arg(short, long)]
        until: Option<String>,
    },

    /// Manage the list of repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum RepoCommand {
    /// Add one or more repository paths
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove a repository path
    Remove { path: PathBuf },

    /// List configured repositories
    List,
}

impl Cli {
    /// Home directory and, for commands that run the pipeline, the log slug.
    ///
    /// A run with window overrides logs under `run/<window>` so its log file
    /// can be told apart from runs over the stored window.
    pub fn log_context(&self) -> (PathBuf, Option<String>) {
        let slug = match &self.command {
            Commands::Run { since, until, .. } => {
                Some(run_log_slug(since.as_deref(), until.as_deref()))
            }
            _ => None,
        };
        (self.home.clone(), slug)
    }

    pub async fn run(self) -> Result<()> {
        let path = settings_path(&self.home);
        let settings = load_settings(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;

        match self.command {
            Commands::Run {
                since,
                until,
                output,
                api_key,
            } => {
                let options = RunOptions::from_overrides(since, until, output, api_key);
                run_journal(&self.home, &path, settings, &options).await
            }
            Commands::SetKey { key, no_verify } => {
                let key = key.trim();
                if key.is_empty() {
                    bail!("the API key must not be empty");
                }
                if !no_verify && settings.provider == Provider::Gemini {
                    GeminiDispatcher::configured(key, &settings)
                        .verify_key()
                        .await
                        .context("the API key was not saved")?;
                }
                save(&path, &settings.with_api_key(key))?;
                println!("API key has been saved to {}", path.display());
                Ok(())
            }
            Commands::Window { since, until } => {
                if since.is_none() && until.is_none() {
                    bail!("nothing to change: pass --since and/or --until");
                }
                let mut settings = settings;
                if let Some(since) = since {
                    settings = settings.with_since(since);
                }
                if let Some(until) = until {
                    settings = settings.with_until(until);
                }
                settings.window()?;
                save(&path, &settings)?;
                println!(
                    "Default window set: since {} until {}",
                    settings.since, settings.until
                );
                Ok(())
            }
            Commands::Repo { command } => repo_command(&path, settings, command),
        }
    }
}

fn repo_command(path: &Path, settings: Settings, command: RepoCommand) -> Result<()> {
    match command {
        RepoCommand::Add { paths } => {
            let mut settings = settings;
            for repo in paths {
                println!("Added {}", repo.display());
                settings = settings.with_repository(repo);
            }
            save(path, &settings)
        }
        RepoCommand::Remove { path: repo } => {
            if !settings.repositories.contains(&repo) {
                bail!("{} is not in the repository list", repo.display());
            }
            save(path, &settings.without_repository(&repo))?;
            println!("Removed {}", repo.display());
            Ok(())
        }
        RepoCommand::List => {
            if settings.repositories.is_empty() {
                println!("No repositories configured.");
            }
            for repo in &settings.repositories {
                println!("{}", repo.display());
            }
            Ok(())
        }
    }
}

fn save(path: &Path, settings: &Settings) -> Result<()> {
    save_settings(path, settings)
        .with_context(|| format!("failed to save settings to {}", path.display()))
}

async fn run_journal(
    home: &Path,
    settings_file: &Path,
    settings: Settings,
    options: &RunOptions,
) -> Result<()> {
    let mut settings = settings;
    let interactive = io::stdin().is_terminal();
    if interactive && settings.repositories.is_empty() {
        settings = prompt_repositories(settings, io::stdin().lock(), io::stdout())?;
        save(settings_file, &settings)?;
    }
    if settings.repositories.is_empty() {
        bail!("no repositories configured; add one with `autojournal repo add <PATH>`");
    }
    if interactive && needs_api_key(&options.apply(&settings)) {
        settings = prompt_api_key(settings).await?;
        save(settings_file, &settings)?;
        println!("API key has been saved to {}", settings_file.display());
    }

    let engine = Engine::new(settings)?.with_output_root(output_root(home));
    let window = options.apply(engine.settings()).window()?;
    println!(
        "Getting logs since {} until {}",
        window.since(),
        window.until()
    );

    let report = engine.run(options).await?;
    for entry in &report.entries {
        print_entry(entry);
    }

    match report.outcome {
        RunOutcome::Written(path) => {
            info!(path = %path.display(), "run complete");
            println!("Changelog saved to {}", path.display());
        }
        RunOutcome::NothingToSummarize => {
            println!("Nothing to summarize: no commits found in the window.");
        }
    }
    Ok(())
}

/// Whether the selected provider still lacks a usable API key.
fn needs_api_key(settings: &Settings) -> bool {
    settings.provider == Provider::Gemini
        && settings
            .api_key
            .as_deref()
            .is_none_or(|key| key.trim().is_empty())
}

/// Ask for a Gemini key until one is accepted by the API.
async fn prompt_api_key(settings: Settings) -> Result<Settings> {
    loop {
        let Some(key) = read_api_key(io::stdin().lock(), io::stdout())? else {
            bail!("no API key entered; run `autojournal set-key <KEY>`");
        };
        match GeminiDispatcher::configured(key.as_str(), &settings)
            .verify_key()
            .await
        {
            Ok(()) => return Ok(settings.with_api_key(key)),
            Err(CoreError::Config(reason)) => {
                warn!(%reason, "entered API key was rejected");
                println!("{reason}. Please try again");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Log slug for a run: `run`, or `run/<since>_<until>` with the overridden
/// bounds reduced to lowercase alphanumerics and dashes.
fn run_log_slug(since: Option<&str>, until: Option<&str>) -> String {
    let parts: Vec<String> = [("since", since), ("until", until)]
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| format!("{label}-{}", slugify(v))))
        .collect();
    if parts.is_empty() {
        "run".to_owned()
    } else {
        format!("run/{}", parts.join("_"))
    }
}

fn slugify(value: &str) -> String {
    let mut slug = String::new();
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_owned()
}

fn print_entry(entry: &RepositoryLogEntry) {
    match &entry.outcome {
        LogOutcome::Collected(history) if entry.has_history() => {
            println!("--- {}: {} commits ---", entry.name(), history.lines().count());
        }
        LogOutcome::Collected(_) => println!("--- {}: no commits in window ---", entry.name()),
        LogOutcome::NotARepository => println!(
            "--- Skipping {}: not a git repository ---",
            entry.repository.raw().display()
        ),
        LogOutcome::QueryFailed(reason) => {
            println!("--- Error in {}: {reason} ---", entry.name());
        }
        LogOutcome::ToolUnavailable(reason) => println!("--- {reason} ---"),
    }
}
