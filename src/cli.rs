//! Command-line interface.
//!
//! One invocation checks one package:
//!
//! ```text
//! os-patches-bot <PACKAGE> [SERIES] [UPSTREAM_SERIES]
//! ```
//!
//! Credentials come from the environment, the way GitHub Actions provides them.

use std::path::PathBuf;

use clap::Parser;

use crate::workflow::Request;

/// Check a patched package against upstream and propose updates.
#[derive(Debug, Parser)]
#[command(name = "os-patches-bot", version, after_long_help = USAGE_HELP)]
pub struct Cli {
    /// Source package to check.
    pub package: String,

    /// Series the patched package is published in. Defaults to the configured
    /// default series when omitted or empty.
    pub series: Option<String>,

    /// Series to compare against upstream. Defaults to SERIES.
    pub upstream_series: Option<String>,

    /// Settings file (TOML).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Working tree of the patches repository.
    #[arg(long, default_value = ".")]
    pub repo_dir: PathBuf,

    /// GitHub token used for issues and pull requests.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Repository issues and pull requests are opened in (`owner/name`).
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: String,

    /// Log debug output.
    #[arg(short, long)]
    pub verbose: bool,
}

const USAGE_HELP: &str = r#"Examples:
  os-patches-bot gnome-shell
  os-patches-bot gnome-shell noble
  os-patches-bot gnome-shell jammy noble

Log level follows RUST_LOG when set."#;

impl Cli {
    /// The run request, with series defaults applied.
    pub fn request(&self, default_series: &str) -> Request {
        Request::new(
            self.package.clone(),
            self.series.as_deref(),
            self.upstream_series.as_deref(),
            default_series,
        )
    }
}
