//! Interactive repository and API key entry for first runs.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use autojournal_core::Settings;

/// Ask for repository paths, one per line, until an empty line.
///
/// An empty line is only accepted once at least one path is configured.
/// End of input stops the loop regardless.
pub fn prompt_repositories(
    settings: Settings,
    mut input: impl BufRead,
    mut out: impl Write,
) -> Result<Settings> {
    let mut settings = settings;
    loop {
        write!(
            out,
            "Please paste the project path here (finish with an empty line)\n: "
        )?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }

        let path = line.trim();
        if path.is_empty() {
            if !settings.repositories.is_empty() {
                break;
            }
            writeln!(out, "No paths entered. Please try again")?;
            continue;
        }
        settings = settings.with_repository(PathBuf::from(path));
    }
    Ok(settings)
}

/// Ask for an API key until a non-blank line is entered.
///
/// Returns `None` at end of input.
pub fn read_api_key(mut input: impl BufRead, mut out: impl Write) -> Result<Option<String>> {
    loop {
        write!(out, "Please paste your Gemini API key here\n: ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(None);
        }

        let key = line.trim();
        if !key.is_empty() {
            return Ok(Some(key.to_owned()));
        }
        writeln!(out, "No key entered. Please try again")?;
    }
}
