//! Changelog persistence.
//!
//! [`OutputWriter`] never overwrites an existing file: when the requested
//! path is taken it writes to `<stem>_1.<ext>`, `<stem>_2.<ext>`, … instead.
//! Candidates are opened with create-new semantics, so a name claimed by
//! another process between the probe and the open is skipped, not clobbered.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument};

use crate::error::CoreError;

/// Highest numeric suffix tried before giving up.
const MAX_SUFFIX: u32 = 10_000;

/// Remove one enclosing Markdown code fence, if present.
///
/// A first line starting with three backticks (optionally followed by a
/// language tag) and a last line consisting only of three backticks are
/// dropped. A fence that opens and closes on a single line keeps everything
/// between the backticks. Text without a leading fence is returned unchanged.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text.to_owned();
    };

    // Drop the rest of the opening line (language tag).
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);

    let mut out = body.trim_end().to_owned();
    out.push('\n');
    out
}

/// Sibling of `target` with `_n` inserted before the extension.
pub fn suffixed_path(target: &Path, n: u32) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    target.with_file_name(name)
}

/// Writes changelogs to collision-free paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputWriter;

impl OutputWriter {
    /// Create a writer.
    pub fn new() -> Self {
        Self
    }

    /// Write `content` to `target` or, if it exists, to the first free
    /// `_n`-suffixed sibling. Missing parent directories are created.
    ///
    /// Returns the path actually written.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Persist` with the attempted path if a directory
    /// cannot be created or the file cannot be written. A file that was
    /// created but not fully written is removed.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub fn write(&self, content: &str, target: &Path) -> Result<PathBuf, CoreError> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| persist_error(parent, source))?;
        }

        for n in 0..=MAX_SUFFIX {
            let candidate = if n == 0 {
                target.to_path_buf()
            } else {
                suffixed_path(target, n)
            };
            if candidate.exists() {
                debug!(path = %candidate.display(), "path taken, trying next suffix");
                continue;
            }

            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(persist_error(&candidate, source)),
            };

            let written = file
                .write_all(content.as_bytes())
                .and_then(|()| file.sync_all());
            drop(file);
            if let Err(source) = written {
                let _ = fs::remove_file(&candidate);
                return Err(persist_error(&candidate, source));
            }

            info!(path = %candidate.display(), "changelog written");
            return Ok(candidate);
        }

        Err(persist_error(
            target,
            io::Error::new(
                ErrorKind::AlreadyExists,
                format!("no free file name after {MAX_SUFFIX} attempts"),
            ),
        ))
    }
}

fn persist_error(path: &Path, source: io::Error) -> CoreError {
    error!(path = %path.display(), error = %source, "could not persist output");
    CoreError::Persist {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_strip_enclosing_fence_with_language_tag() {
        let text = "```markdown\n# (Fecha: 01/03/2024)\n## Repositorio: api\n```\n";
        assert_eq!(
            strip_code_fences(text),
            "# (Fecha: 01/03/2024)\n## Repositorio: api\n"
        );
    }

    #[test]
    fn test_should_strip_bare_fence() {
        assert_eq!(strip_code_fences("```\n- cambio\n```"), "- cambio\n");
    }

    #[test]
    fn test_should_keep_text_of_single_line_fence() {
        assert_eq!(
            strip_code_fences("```# (Fecha: 01/03/2024) - cambio en api```"),
            "# (Fecha: 01/03/2024) - cambio en api\n"
        );
    }

    #[test]
    fn test_should_leave_nothing_for_fence_without_content() {
        assert!(strip_code_fences("```markdown\n```").trim().is_empty());
        assert!(strip_code_fences("```").trim().is_empty());
    }

    #[test]
    fn test_should_leave_unfenced_text_untouched() {
        let text = "# Fecha\n\nuse `code` inline\n";
        assert_eq!(strip_code_fences(text), text);
    }

    #[test]
    fn test_should_insert_suffix_before_extension() {
        assert_eq!(
            suffixed_path(Path::new("outputs/log.md"), 1),
            PathBuf::from("outputs/log_1.md")
        );
        assert_eq!(
            suffixed_path(Path::new("outputs/cambios-ana-2026-10-17.md"), 12),
            PathBuf::from("outputs/cambios-ana-2026-10-17_12.md")
        );
        assert_eq!(suffixed_path(Path::new("notes"), 2), PathBuf::from("notes_2"));
    }

    #[test]
    fn test_should_create_missing_parents() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let target = dir.path().join("a").join("b").join("log.md");

        let written = OutputWriter::new()
            .write("# Fecha\n- uno\n", &target)
            .expect("should write");

        assert_eq!(written, target);
        assert_eq!(fs::read(&written).expect("should read"), b"# Fecha\n- uno\n");
    }

    #[test]
    fn test_should_never_overwrite_existing_files() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let target = dir.path().join("outputs").join("log.md");
        let writer = OutputWriter::new();

        let first = writer.write("first", &target).expect("first write");
        let second = writer.write("second", &target).expect("second write");
        let third = writer.write("third", &target).expect("third write");

        assert_eq!(first, target);
        assert_eq!(second, dir.path().join("outputs").join("log_1.md"));
        assert_eq!(third, dir.path().join("outputs").join("log_2.md"));
        assert_eq!(fs::read_to_string(&first).expect("read"), "first");
        assert_eq!(fs::read_to_string(&second).expect("read"), "second");
        assert_eq!(fs::read_to_string(&third).expect("read"), "third");
    }

    #[test]
    fn test_should_fill_first_free_suffix() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let target = dir.path().join("log.md");
        fs::write(&target, "base").expect("write");
        fs::write(dir.path().join("log_1.md"), "one").expect("write");

        let written = OutputWriter::new().write("new", &target).expect("should write");
        assert_eq!(written, dir.path().join("log_2.md"));
        assert_eq!(fs::read_to_string(&target).expect("read"), "base");
    }

    #[test]
    fn test_should_report_path_when_parent_cannot_be_created() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "a file, not a directory").expect("write");
        let target = blocker.join("log.md");

        let err = OutputWriter::new().write("x", &target).unwrap_err();
        assert!(matches!(err, CoreError::Persist { ref path, .. } if path == &blocker));
        assert!(err.to_string().contains("blocker"));
    }
}
