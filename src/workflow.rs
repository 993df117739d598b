//! The update check: compare the patched package with upstream and, when
//! upstream moved ahead, propose the new source as a pull request.
//!
//! Every collaborator is injected, so a run touches nothing but what it is
//! handed. The run is strictly sequential and stops at the first error; the
//! working tree is left on whatever branch the last successful step chose.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::archive::Extractor;
use crate::config::Settings;
use crate::control::Dsc;
use crate::error::{Error, Result};
use crate::git::Vcs;
use crate::github::{IssueTracker, PullRequestDraft, find_open_issue};
use crate::launchpad::{
    PackageArchive, Pocket, PublishedSource, SourceFetcher, SourceQuery, file_sha256,
};
use crate::version::DebianVersion;


/// What a run was asked to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub package: String,
    pub series: String,
    pub upstream_series: String,
}

impl Request {
    /// Apply the series defaults: an omitted or empty series is the default
    /// series, an omitted or empty upstream series is the series.
    pub fn new(
        package: impl Into<String>,
        series: Option<&str>,
        upstream_series: Option<&str>,
        default_series: &str,
    ) -> Self {
        let series = series
            .filter(|s| !s.is_empty())
            .unwrap_or(default_series)
            .to_string();
        let upstream_series = upstream_series
            .filter(|s| !s.is_empty())
            .map_or_else(|| series.clone(), str::to_string);

        Self {
            package: package.into(),
            series,
            upstream_series,
        }
    }

    /// Long-lived branch carrying the patched package.
    pub fn base_branch(&self) -> String {
        format!("{}-{}", self.package, self.upstream_series)
    }

    /// Branch the update is proposed from.
    pub fn update_branch(&self) -> String {
        format!("bot/update/{}-{}", self.package, self.upstream_series)
    }

    pub fn not_found_title(&self) -> String {
        format!("Package {} not found in os-patches PPA", self.package)
    }

    pub fn new_version_title(&self) -> String {
        format!(
            "📦 New version of {} available [{}]",
            self.package, self.upstream_series
        )
    }
}

/// How a run ended. Every variant is a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The package is not published downstream. `issue` is the number of the
    /// issue created by this run, `None` when one was already open.
    NotDeployed { issue: Option<u64> },

    /// No upstream pocket publishes the package.
    NoUpstream,

    /// Upstream is not newer than the patched version.
    UpToDate { patched: String, upstream: String },

    /// Upstream is newer, but its issue is already open, so the update is
    /// assumed to be in flight.
    AlreadyTracked { version: String, issue: u64 },

    /// An issue and a pull request were opened for the new version.
    UpdateProposed {
        version: String,
        issue: u64,
        pull_request: u64,
    },
}

/// The collaborators a run works with.
pub struct Workflow<'a> {
    pub settings: &'a Settings,
    /// Downstream archive holding the patched packages.
    pub patched: &'a dyn PackageArchive,
    /// Upstream distribution archive.
    pub upstream: &'a dyn PackageArchive,
    pub fetcher: &'a dyn SourceFetcher,
    pub tracker: &'a dyn IssueTracker,
    pub vcs: &'a dyn Vcs,
    pub extractor: &'a dyn Extractor,
    /// Root of the working tree the source is unpacked into.
    pub work_tree: &'a Path,
}

impl Workflow<'_> {
    pub fn run(&self, request: &Request) -> Result<Outcome> {
        self.prepare_git();

        let Some(patched) = self.patched_source(request)? else {
            return self.report_not_deployed(request);
        };

        let Some((pocket, upstream)) = self.upstream_source(request)? else {
            warn!(
                package = %request.package,
                series = %request.upstream_series,
                "package not published in any upstream pocket"
            );
            return Ok(Outcome::NoUpstream);
        };

        let patched_version: DebianVersion = patched.version.parse()?;
        let upstream_version: DebianVersion = upstream.version.parse()?;
        if upstream_version.cmp(&patched_version) != Ordering::Greater {
            info!(
                package = %request.package,
                patched = %patched.version,
                upstream = %upstream.version,
                %pocket,
                "up to date"
            );
            return Ok(Outcome::UpToDate {
                patched: patched.version,
                upstream: upstream.version,
            });
        }

        let title = request.new_version_title();
        if let Some(existing) = find_open_issue(self.tracker, &title, &self.settings.bot_login)? {
            info!(issue = existing.number, %title, "update already tracked");
            return Ok(Outcome::AlreadyTracked {
                version: upstream.version,
                issue: existing.number,
            });
        }

        let body = format!(
            "The package `{}` in `{}` can be upgraded to version `{}`.\nPrevious version: `{}`.",
            request.package, request.upstream_series, upstream.version, patched.version
        );
        let issue = self.tracker.create_issue(&title, &body)?;
        info!(
            package = %request.package,
            version = %upstream.version,
            previous = %patched.version,
            %pocket,
            issue,
            "new upstream version, created issue"
        );

        let tarball = self.download_source(request, &upstream, &upstream_version)?;
        let pull_request = self.propose_update(request, &tarball, &upstream, &patched, issue)?;

        Ok(Outcome::UpdateProposed {
            version: upstream.version,
            issue,
            pull_request,
        })
    }

    /// Identity and safe-directory setup. Failures here never abort a run.
    fn prepare_git(&self) {
        let settings = self.settings;
        if let Err(e) = self
            .vcs
            .configure_identity(&settings.bot_login, &settings.bot_email)
        {
            warn!(error = %e, "could not configure git identity");
        }
        if let Err(e) = self.vcs.add_safe_directory(&settings.safe_directory) {
            warn!(error = %e, "could not mark safe directory");
        }
    }

    fn patched_source(&self, request: &Request) -> Result<Option<PublishedSource>> {
        let query = SourceQuery {
            package: request.package.clone(),
            series: request.series.clone(),
            pocket: None,
        };
        Ok(self.patched.published_sources(&query)?.into_iter().next())
    }

    /// The first pocket, in priority order, that publishes the package.
    fn upstream_source(&self, request: &Request) -> Result<Option<(Pocket, PublishedSource)>> {
        for pocket in Pocket::PRIORITY {
            let query = SourceQuery {
                package: request.package.clone(),
                series: request.upstream_series.clone(),
                pocket: Some(pocket),
            };
            if let Some(source) = self.upstream.published_sources(&query)?.into_iter().next() {
                return Ok(Some((pocket, source)));
            }
        }
        Ok(None)
    }

    fn report_not_deployed(&self, request: &Request) -> Result<Outcome> {
        let title = request.not_found_title();
        if let Some(existing) = find_open_issue(self.tracker, &title, &self.settings.bot_login)? {
            info!(
                package = %request.package,
                issue = existing.number,
                "package not found in os-patches, already reported"
            );
            return Ok(Outcome::NotDeployed { issue: None });
        }

        let body = format!(
            "{} found in the import list, but not in the PPA. Not deployed yet or removed by accident?",
            request.package
        );
        let issue = self.tracker.create_issue(&title, &body)?;
        info!(package = %request.package, issue, "package not found in os-patches, created issue");
        Ok(Outcome::NotDeployed { issue: Some(issue) })
    }

    /// Fetch the `.dsc` and download the first file it lists into the work tree.
    fn download_source(
        &self,
        request: &Request,
        upstream: &PublishedSource,
        version: &DebianVersion,
    ) -> Result<PathBuf> {
        let dsc_url = format!(
            "{}/+files/{}_{}.dsc",
            self.upstream.web_link(),
            upstream.name,
            version.without_epoch()
        );
        let text = self.fetcher.fetch_text(&dsc_url)?;
        let dsc = Dsc::parse(&text).map_err(|source| Error::Control {
            url: dsc_url.clone(),
            source,
        })?;
        debug!(source = ?dsc.field("Source"), files = dsc.files.len(), "parsed control file");
        let entry = &dsc.files[0];
        let filename = &entry.name;

        let url = format!(
            "{}/{}/{}/{}",
            self.settings.sourcefiles_root.trim_end_matches('/'),
            request.package,
            upstream.version,
            filename
        );
        info!(%url, "downloading source");

        let dest = self.work_tree.join(filename);
        self.fetcher.download(&url, &dest)?;

        let size = fs::metadata(&dest)?.len();
        if size != entry.size {
            let _ = fs::remove_file(&dest);
            return Err(Error::SizeMismatch {
                file: filename.clone(),
                expected: entry.size,
                actual: size,
            });
        }

        if let Some(expected) = dsc.sha256_of(filename) {
            let actual = file_sha256(&dest)?;
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = fs::remove_file(&dest);
                return Err(Error::Checksum {
                    file: filename.clone(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        Ok(dest)
    }

    fn propose_update(
        &self,
        request: &Request,
        tarball: &Path,
        upstream: &PublishedSource,
        patched: &PublishedSource,
        issue: u64,
    ) -> Result<u64> {
        let base = request.base_branch();
        let head = request.update_branch();

        self.vcs.fetch_all()?;
        self.vcs.switch(&base)?;
        self.vcs.create_branch(&head)?;

        self.extractor.extract(tarball, self.work_tree)?;

        self.vcs.add_all()?;
        self.vcs
            .commit(&format!("Update to {} {}", request.package, upstream.version))?;
        self.vcs.push(&self.settings.remote, &head)?;

        let draft = PullRequestDraft {
            base,
            head,
            title: format!("📦 Update {}", request.package),
            body: format!(
                "A new version of `{} {}` replaces `{}`.\n\nFixes #{issue}.",
                request.package, upstream.version, patched.version
            ),
        };
        let pull_request = self.tracker.create_pull_request(&draft)?;
        info!(pull_request, head = %draft.head, base = %draft.base, "opened pull request");

        self.vcs.switch(&self.settings.main_branch)?;
        Ok(pull_request)
    }
}
