//! Bot settings.
//!
//! Every key is optional; missing keys take the defaults the os-patches
//! repository runs with. Loaded from `--config` if given, otherwise from
//! `<config dir>/os-patches-bot/config.toml` when that file exists.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Settings {
    /// Series used when none is given on the command line.
    pub default_series: String,
    pub distribution: String,

    /// Owner and name of the downstream PPA holding the patched packages.
    pub ppa_owner: String,
    pub ppa_name: String,

    pub launchpad_api: String,
    pub launchpad_web: String,

    /// Root of the per-file download links of the upstream primary archive.
    pub sourcefiles_root: String,

    /// Login the bot's issues are authored by. Only issues from this login
    /// count when checking for duplicates.
    pub bot_login: String,
    pub bot_email: String,

    /// Directory registered as `safe.directory` before touching the tree.
    pub safe_directory: String,

    /// Branch checked out again once the pull request is open.
    pub main_branch: String,
    pub remote: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_series: "noble".to_string(),
            distribution: "ubuntu".to_string(),
            ppa_owner: "elementary-os".to_string(),
            ppa_name: "os-patches".to_string(),
            launchpad_api: "https://api.launchpad.net/devel".to_string(),
            launchpad_web: "https://launchpad.net".to_string(),
            sourcefiles_root: "https://code.launchpad.net/ubuntu/+archive/primary/+sourcefiles"
                .to_string(),
            bot_login: "github-actions[bot]".to_string(),
            bot_email: "github-actions[bot]@users.noreply.github.com".to_string(),
            safe_directory: "/__w/os-patches/os-patches".to_string(),
            main_branch: "master".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl Settings {
    /// Resolve settings: explicit path, then the default location, then defaults.
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// The default settings path: `<config dir>/os-patches-bot/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("os-patches-bot").join("config.toml"))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let invalid = |message: String| Error::Config {
            path: path.to_path_buf(),
            message,
        };

        let contents =
            fs::read_to_string(path).map_err(|e| invalid(format!("failed to read: {e}")))?;
        let settings: Self = toml::from_str(&contents).map_err(|e| invalid(e.to_string()))?;

        if settings.default_series.is_empty() {
            return Err(invalid("default-series is empty".to_string()));
        }
        if settings.bot_login.is_empty() {
            return Err(invalid("bot-login is empty".to_string()));
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_keys_take_defaults() {
        let (_dir, path) = write_config("default-series = \"oracular\"\nmain-branch = \"main\"\n");
        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.default_series, "oracular");
        assert_eq!(settings.main_branch, "main");
        assert_eq!(settings.ppa_name, "os-patches");
        assert_eq!(settings.bot_login, "github-actions[bot]");
    }

    #[test]
    fn empty_file_is_defaults() {
        let (_dir, path) = write_config("");
        assert_eq!(Settings::load(Some(&path)).unwrap(), Settings::default());
    }

    #[test]
    fn unknown_key_rejected() {
        let (_dir, path) = write_config("default-serie = \"noble\"\n");
        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn empty_default_series_rejected() {
        let (_dir, path) = write_config("default-series = \"\"\n");
        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("default-series is empty"));
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
