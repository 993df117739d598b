mod archive;
mod cli;
mod config;
mod control;
mod error;
mod git;
mod github;
mod launchpad;
mod version;
mod workflow;

use std::process;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use archive::TarExtractor;
use cli::Cli;
use config::Settings;
use git::GitCli;
use github::GhTracker;
use launchpad::{HttpFetcher, LaunchpadArchive, http_agent};
use workflow::{Outcome, Workflow};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(outcome) => report(&outcome),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> error::Result<Outcome> {
    let settings = Settings::load(cli.config.as_deref())?;
    let request = cli.request(&settings.default_series);
    info!(
        package = %request.package,
        series = %request.series,
        upstream_series = %request.upstream_series,
        "checking package"
    );

    let agent = http_agent();
    let patched = LaunchpadArchive::ppa(
        agent.clone(),
        &settings.launchpad_api,
        &settings.launchpad_web,
        &settings.distribution,
        &settings.ppa_owner,
        &settings.ppa_name,
    );
    let upstream = LaunchpadArchive::primary(
        agent.clone(),
        &settings.launchpad_api,
        &settings.launchpad_web,
        &settings.distribution,
    );
    let fetcher = HttpFetcher::new(agent);
    let tracker = GhTracker::new(&cli.repository, &cli.token);
    let vcs = GitCli::new(&cli.repo_dir);

    Workflow {
        settings: &settings,
        patched: &patched,
        upstream: &upstream,
        fetcher: &fetcher,
        tracker: &tracker,
        vcs: &vcs,
        extractor: &TarExtractor,
        work_tree: &cli.repo_dir,
    }
    .run(&request)
}

/// One status line on stdout per run.
fn report(outcome: &Outcome) {
    match outcome {
        Outcome::NotDeployed { issue: Some(issue) } => {
            println!("Package not found in os-patches - created issue {issue}");
        }
        Outcome::NotDeployed { issue: None } => {
            println!("Package not found in os-patches - issue already open");
        }
        Outcome::NoUpstream => println!("Package not published upstream"),
        Outcome::UpToDate { patched, upstream } => {
            println!("Up to date: patched {patched}, upstream {upstream}");
        }
        Outcome::AlreadyTracked { version, issue } => {
            println!("Version {version} already tracked in issue {issue}");
        }
        Outcome::UpdateProposed {
            version,
            issue,
            pull_request,
        } => {
            println!("Proposed {version} in pull request {pull_request} (issue {issue})");
        }
    }
}
