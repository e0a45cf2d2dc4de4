//! Fixtures shared by the unit tests: throwaway git repositories with
//! commits at fixed dates.

use std::path::Path;
use std::process::Command;

use crate::config::DateWindow;

/// Window covering the whole of 2024.
pub(crate) fn test_window() -> DateWindow {
    DateWindow::new("2024-01-01", "2024-12-31").expect("valid window")
}

fn git(dir: &Path, args: &[&str], dates: Option<(&str, &str)>) {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@example.com");
    if let Some((authored, committed)) = dates {
        cmd.env("GIT_AUTHOR_DATE", authored)
            .env("GIT_COMMITTER_DATE", committed);
    }
    let status = cmd.status().expect("git should be installed for tests");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

/// Create `dir` and initialise an empty repository in it.
pub(crate) fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).expect("should create repo dir");
    git(dir, &["init", "-q"], None);
}

/// Record an empty commit with `message` at `date` (ISO 8601).
pub(crate) fn commit_at(dir: &Path, message: &str, date: &str) {
    commit_with_dates(dir, message, date, date);
}

/// Record an empty commit whose author and committer dates differ.
pub(crate) fn commit_with_dates(dir: &Path, message: &str, authored: &str, committed: &str) {
    git(
        dir,
        &[
            "-c",
            "commit.gpgsign=false",
            "commit",
            "-q",
            "--allow-empty",
            "-m",
            message,
        ],
        Some((authored, committed)),
    );
}
