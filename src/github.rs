//! GitHub issue tracker, driven through the `gh` CLI.
//!
//! Authenticated with the token from the environment (`GH_TOKEN`) and
//! pinned to one repository with `--repo`.

use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// An open issue, as far as deduplication cares.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
    pub author: String,
}

/// A pull request about to be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub base: String,
    pub head: String,
    pub title: String,
    pub body: String,
}

pub trait IssueTracker {
    fn open_issues(&self) -> Result<Vec<IssueSummary>>;

    /// Create an issue and return its number.
    fn create_issue(&self, title: &str, body: &str) -> Result<u64>;

    /// Open a pull request and return its number.
    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<u64>;
}

/// The open issue titled exactly `title` and authored by `author`, if any.
pub fn find_open_issue(
    tracker: &dyn IssueTracker,
    title: &str,
    author: &str,
) -> Result<Option<IssueSummary>> {
    Ok(tracker
        .open_issues()?
        .into_iter()
        .find(|issue| issue.title == title && issue.author == author))
}

/// `gh`-backed tracker for one repository.
pub struct GhTracker {
    repository: String,
    token: String,
}

impl GhTracker {
    pub fn new(repository: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            token: token.into(),
        }
    }

    /// Run `gh` and return its stdout on success.
    fn gh(&self, args: &[&str]) -> Result<String> {
        debug!(args = %args.join(" "), "running gh");
        let output = Command::new("gh")
            .args(args)
            .env("GH_TOKEN", &self.token)
            .env("GH_PROMPT_DISABLED", "1")
            .output()?;

        if !output.status.success() {
            return Err(Error::Gh {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// jq program flattening REST issues into [`IssueSummary`] lines, skipping pull requests.
const OPEN_ISSUES_JQ: &str =
    ".[] | select(.pull_request == null) | {number, title, author: .user.login}";

impl IssueTracker for GhTracker {
    fn open_issues(&self) -> Result<Vec<IssueSummary>> {
        // The REST API reports the Actions bot as `github-actions[bot]`;
        // `gh issue list` would report `app/github-actions` instead.
        let endpoint = format!("repos/{}/issues?state=open&per_page=100", self.repository);
        let output = self.gh(&["api", &endpoint, "--paginate", "--jq", OPEN_ISSUES_JQ])?;
        parse_issue_lines(&output)
    }

    fn create_issue(&self, title: &str, body: &str) -> Result<u64> {
        let output = self.gh(&[
            "issue",
            "create",
            "--repo",
            &self.repository,
            "--title",
            title,
            "--body",
            body,
        ])?;
        parse_number("issue", &output)
    }

    fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<u64> {
        let output = self.gh(&[
            "pr",
            "create",
            "--repo",
            &self.repository,
            "--base",
            &draft.base,
            "--head",
            &draft.head,
            "--title",
            &draft.title,
            "--body",
            &draft.body,
        ])?;
        parse_number("pull request", &output)
    }
}

fn parse_issue_lines(output: &str) -> Result<Vec<IssueSummary>> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(Error::from))
        .collect()
}

/// Extract the number from the URL `gh` prints on creation.
///
/// Example: `https://github.com/owner/repo/issues/42` → `42`.
fn parse_number(kind: &'static str, output: &str) -> Result<u64> {
    output
        .trim()
        .lines()
        .last()
        .and_then(|url| url.trim().rsplit('/').next())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::TrackerOutput {
            kind,
            output: output.to_string(),
        })
}
