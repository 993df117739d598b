//! Version control: the handful of `git` operations an update needs.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

pub trait Vcs {
    /// Set the global commit identity.
    fn configure_identity(&self, name: &str, email: &str) -> Result<()>;

    /// Register a directory as `safe.directory`.
    fn add_safe_directory(&self, path: &str) -> Result<()>;

    fn fetch_all(&self) -> Result<()>;

    /// Switch to an existing branch.
    fn switch(&self, branch: &str) -> Result<()>;

    /// Create a branch at `HEAD` and switch to it.
    fn create_branch(&self, branch: &str) -> Result<()>;

    /// Stage every change in the working tree, including deletions.
    fn add_all(&self) -> Result<()>;

    fn commit(&self, message: &str) -> Result<()>;

    fn push(&self, remote: &str, branch: &str) -> Result<()>;
}

/// The `git` binary, run inside one working tree.
pub struct GitCli {
    work_tree: PathBuf,
}

impl GitCli {
    pub fn new(work_tree: impl Into<PathBuf>) -> Self {
        Self {
            work_tree: work_tree.into(),
        }
    }

    /// Run a git command and return its stdout on success.
    fn run(&self, args: &[&str]) -> Result<String> {
        debug!(args = %args.join(" "), "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.work_tree)
            .output()?;

        if !output.status.success() {
            return Err(Error::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Vcs for GitCli {
    fn configure_identity(&self, name: &str, email: &str) -> Result<()> {
        self.run(&["config", "--global", "user.email", email])?;
        self.run(&["config", "--global", "user.name", name])?;
        Ok(())
    }

    fn add_safe_directory(&self, path: &str) -> Result<()> {
        self.run(&["config", "--global", "--add", "safe.directory", path])?;
        Ok(())
    }

    fn fetch_all(&self) -> Result<()> {
        self.run(&["fetch", "--all"])?;
        Ok(())
    }

    fn switch(&self, branch: &str) -> Result<()> {
        self.run(&["switch", branch])?;
        Ok(())
    }

    fn create_branch(&self, branch: &str) -> Result<()> {
        self.run(&["switch", "-c", branch])?;
        Ok(())
    }

    fn add_all(&self) -> Result<()> {
        self.run(&["add", "--all", "."])?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.run(&["commit", "-m", message])?;
        Ok(())
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run(&["push", remote, branch])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn failure_carries_command_and_stderr() {
        // Not a repository, so any branch operation fails.
        let dir = TempDir::new().unwrap();
        let git = GitCli::new(dir.path());

        match git.switch("does-not-exist") {
            Err(Error::Git { command, stderr }) => {
                assert_eq!(command, "switch does-not-exist");
                assert!(!stderr.is_empty());
            }
            // git missing from PATH surfaces as an I/O error instead.
            Err(Error::Io(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
