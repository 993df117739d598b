//! Errors that abort a run.
//!
//! Every collaborator failure funnels into [`Error`]; `main` prints it and exits non-zero.

use std::{io, path::PathBuf};

use crate::{control::ControlError, version::VersionError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid config at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("{0}")]
    Version(#[from] VersionError),

    #[error("invalid control file {url}: {source}")]
    Control {
        url: String,
        #[source]
        source: ControlError,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("size mismatch for {file}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    Checksum {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("gh {command} failed: {stderr}")]
    Gh { command: String, stderr: String },

    #[error("could not parse {kind} number from: {output}")]
    TrackerOutput { kind: &'static str, output: String },

    #[error("archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn http(url: &str, source: ureq::Error) -> Self {
        Self::Http {
            url: url.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.into(),
        }
    }
}
