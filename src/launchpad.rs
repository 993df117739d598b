//! Launchpad archives: published-source queries and file downloads.
//!
//! Queries go through the Launchpad web service (`ws.op=getPublishedSources`),
//! always with an exact name match and `Published` status. Anonymous access is
//! enough for public archives, so no credentials are involved.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

/// A named sub-channel of an archive series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pocket {
    Release,
    Security,
    Updates,
}

impl Pocket {
    /// Pockets in the order upstream versions are looked up.
    pub const PRIORITY: [Pocket; 3] = [Pocket::Release, Pocket::Security, Pocket::Updates];

    pub fn as_str(self) -> &'static str {
        match self {
            Pocket::Release => "Release",
            Pocket::Security => "Security",
            Pocket::Updates => "Updates",
        }
    }
}

impl fmt::Display for Pocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to look up in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub package: String,
    pub series: String,
    pub pocket: Option<Pocket>,
}

/// One published source package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishedSource {
    #[serde(rename = "source_package_name")]
    pub name: String,
    #[serde(rename = "source_package_version")]
    pub version: String,
}

/// A package archive that can be asked for its published sources.
pub trait PackageArchive {
    /// Published sources matching the query, newest first. Empty is a valid answer.
    fn published_sources(&self, query: &SourceQuery) -> Result<Vec<PublishedSource>>;

    /// Web root of the archive; `+files/<name>` below it serves archive files.
    fn web_link(&self) -> &str;
}

/// Fetches files referenced by an archive.
pub trait SourceFetcher {
    fn fetch_text(&self, url: &str) -> Result<String>;

    /// Stream `url` into `dest`, replacing any existing file.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Build the HTTP agent shared by the archive clients and the fetcher.
///
/// Connecting and waiting for response headers are bounded; reading a body
/// is not, so a large tarball on a slow link still completes.
pub fn http_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .timeout_recv_response(Some(RESPONSE_TIMEOUT))
        .build();
    ureq::Agent::new_with_config(config)
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("os-patches-bot/", env!("CARGO_PKG_VERSION"));

/// JSON shape of a Launchpad collection page.
#[derive(Deserialize)]
struct CollectionPage {
    entries: Vec<PublishedSource>,
}

/// A Launchpad archive reached through the web service.
pub struct LaunchpadArchive {
    agent: ureq::Agent,
    api_root: String,
    distribution: String,
    /// Archive path relative to the API / web roots.
    path: String,
    web_link: String,
}

impl LaunchpadArchive {
    /// The distribution's primary archive, e.g. `ubuntu/+archive/primary`.
    pub fn primary(agent: ureq::Agent, api_root: &str, web_root: &str, distribution: &str) -> Self {
        Self::new(
            agent,
            api_root,
            web_root,
            distribution,
            format!("{distribution}/+archive/primary"),
        )
    }

    /// A personal package archive, e.g. `~elementary-os/+archive/ubuntu/os-patches`.
    pub fn ppa(
        agent: ureq::Agent,
        api_root: &str,
        web_root: &str,
        distribution: &str,
        owner: &str,
        name: &str,
    ) -> Self {
        Self::new(
            agent,
            api_root,
            web_root,
            distribution,
            format!("~{owner}/+archive/{distribution}/{name}"),
        )
    }

    fn new(
        agent: ureq::Agent,
        api_root: &str,
        web_root: &str,
        distribution: &str,
        path: String,
    ) -> Self {
        let api_root = api_root.trim_end_matches('/').to_string();
        let web_link = format!("{}/{path}", web_root.trim_end_matches('/'));
        Self {
            agent,
            api_root,
            distribution: distribution.to_string(),
            path,
            web_link,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.api_root, self.path)
    }

    fn query_params(&self, query: &SourceQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("ws.op", "getPublishedSources".to_string()),
            ("source_name", query.package.clone()),
            ("exact_match", "true".to_string()),
            ("status", "Published".to_string()),
            (
                "distro_series",
                format!("{}/{}/{}", self.api_root, self.distribution, query.series),
            ),
        ];
        if let Some(pocket) = query.pocket {
            params.push(("pocket", pocket.as_str().to_string()));
        }
        params
    }
}

impl PackageArchive for LaunchpadArchive {
    fn published_sources(&self, query: &SourceQuery) -> Result<Vec<PublishedSource>> {
        let url = self.endpoint();
        debug!(archive = %self.path, ?query, "querying published sources");

        let mut response = self
            .agent
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .query_pairs(self.query_params(query))
            .call()
            .map_err(|e| Error::http(&url, e))?;

        let page: CollectionPage = response
            .body_mut()
            .read_json()
            .map_err(|e| Error::http(&url, e))?;

        debug!(archive = %self.path, found = page.entries.len(), "published sources");
        Ok(page.entries)
    }

    fn web_link(&self) -> &str {
        &self.web_link
    }
}

/// Plain HTTP fetcher.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        debug!(%url, "fetching");
        self.agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .and_then(|mut r| r.body_mut().read_to_string())
            .map_err(|e| Error::http(url, e))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(%url, dest = %dest.display(), "downloading");
        let response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| Error::http(url, e))?;

        let mut reader = response.into_body().into_reader();
        let mut file = File::create(dest)?;
        if let Err(e) = io::copy(&mut reader, &mut file) {
            drop(file);
            let _ = fs::remove_file(dest);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Hex SHA-256 of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn ppa() -> LaunchpadArchive {
        LaunchpadArchive::ppa(
            http_agent(),
            "https://api.launchpad.net/devel/",
            "https://launchpad.net",
            "ubuntu",
            "elementary-os",
            "os-patches",
        )
    }

    #[test]
    fn pocket_priority_order() {
        assert_eq!(
            Pocket::PRIORITY.map(Pocket::as_str),
            ["Release", "Security", "Updates"]
        );
    }

    #[test]
    fn ppa_paths() {
        let archive = ppa();
        assert_eq!(
            archive.endpoint(),
            "https://api.launchpad.net/devel/~elementary-os/+archive/ubuntu/os-patches"
        );
        assert_eq!(
            archive.web_link(),
            "https://launchpad.net/~elementary-os/+archive/ubuntu/os-patches"
        );
    }

    #[test]
    fn primary_paths() {
        let archive = LaunchpadArchive::primary(
            http_agent(),
            "https://api.launchpad.net/devel",
            "https://launchpad.net/",
            "ubuntu",
        );
        assert_eq!(
            archive.endpoint(),
            "https://api.launchpad.net/devel/ubuntu/+archive/primary"
        );
        assert_eq!(archive.web_link(), "https://launchpad.net/ubuntu/+archive/primary");
    }

    #[test]
    fn query_params_without_pocket() {
        let query = SourceQuery {
            package: "foo".to_string(),
            series: "noble".to_string(),
            pocket: None,
        };
        let params = ppa().query_params(&query);

        assert!(params.contains(&("ws.op", "getPublishedSources".to_string())));
        assert!(params.contains(&("source_name", "foo".to_string())));
        assert!(params.contains(&("exact_match", "true".to_string())));
        assert!(params.contains(&("status", "Published".to_string())));
        assert!(params.contains(&(
            "distro_series",
            "https://api.launchpad.net/devel/ubuntu/noble".to_string()
        )));
        assert!(params.iter().all(|(k, _)| *k != "pocket"));
    }

    #[test]
    fn query_params_with_pocket() {
        let query = SourceQuery {
            package: "foo".to_string(),
            series: "noble".to_string(),
            pocket: Some(Pocket::Security),
        };
        let params = ppa().query_params(&query);
        assert!(params.contains(&("pocket", "Security".to_string())));
    }

    #[test]
    fn collection_page_deserializes() {
        let json = r#"{
            "start": 0,
            "total_size": 1,
            "entries": [{
                "self_link": "https://api.launchpad.net/devel/ubuntu/+archive/primary/+sourcepub/1",
                "source_package_name": "foo",
                "source_package_version": "2.1-1",
                "pocket": "Release",
                "status": "Published"
            }]
        }"#;
        let page: CollectionPage = serde_json::from_str(json).unwrap();
        assert_eq!(
            page.entries,
            vec![PublishedSource {
                name: "foo".to_string(),
                version: "2.1-1".to_string(),
            }]
        );
    }

    #[test]
    fn sha256_of_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello world").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn downloads_have_no_overall_deadline() {
        let timeouts = http_agent().config().timeouts();
        assert_eq!(timeouts.global, None);
        assert_eq!(timeouts.recv_body, None);
        assert_eq!(timeouts.connect, Some(CONNECT_TIMEOUT));
        assert_eq!(timeouts.recv_response, Some(RESPONSE_TIMEOUT));
    }
}
