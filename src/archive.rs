//! Unpacking source tarballs over the working tree.
//!
//! Upstream tarballs usually wrap everything in one `name-version/`
//! directory. That directory is stripped so the contents land directly in
//! the destination; archives with several top-level entries are unpacked
//! as they are. Hard links resolve inside the destination, and no member
//! is written through a symlink.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Unpacks an archive into a directory and removes the archive afterwards.
pub trait Extractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    fn from_file_name(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tar.xz") {
            Ok(Self::Xz)
        } else if name.ends_with(".tar.gz") {
            Ok(Self::Gzip)
        } else if name.ends_with(".tar.zst") {
            Ok(Self::Zstd)
        } else {
            Err(Error::archive(path, "unsupported archive format"))
        }
    }
}

/// Tarball extractor for `.tar.gz`, `.tar.xz` and `.tar.zst`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarExtractor;

impl TarExtractor {
    fn open(path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
        let compression = Compression::from_file_name(path)?;
        let file = BufReader::new(File::open(path)?);
        let reader: Box<dyn Read> = match compression {
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(file)?),
        };
        Ok(tar::Archive::new(reader))
    }

    /// The single top-level directory every member lives in, if there is one.
    fn common_root(path: &Path) -> Result<Option<PathBuf>> {
        let mut roots = BTreeSet::new();
        let mut directories = BTreeSet::new();

        let mut archive = Self::open(path)?;
        for entry in archive.entries()? {
            let entry = entry?;
            if is_metadata(&entry) {
                continue;
            }
            let member = entry.path()?;
            let mut components = normal_components(path, &member)?.into_iter();
            let Some(first) = components.next() else {
                continue;
            };
            if components.next().is_some() || entry.header().entry_type().is_dir() {
                directories.insert(first.clone());
            }
            roots.insert(first);
        }

        if roots.len() != 1 {
            return Ok(None);
        }
        Ok(roots.into_iter().next().filter(|root| directories.contains(root)))
    }
}

impl Extractor for TarExtractor {
    fn extract(&self, archive_path: &Path, dest: &Path) -> Result<()> {
        let root = Self::common_root(archive_path)?;
        match &root {
            Some(root) => debug!(root = %root.display(), "flattening single top-level directory"),
            None => debug!("extracting archive as is"),
        }

        let mut archive = Self::open(archive_path)?;
        let mut unpacked = 0usize;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if is_metadata(&entry) {
                continue;
            }

            let member = entry.path()?.into_owned();
            let Some(relative) = relative_to_root(archive_path, &member, root.as_deref())? else {
                continue;
            };
            ensure_no_symlink_between(archive_path, dest, &relative)?;

            let target = dest.join(&relative);
            let kind = entry.header().entry_type();
            if kind.is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                if kind.is_hard_link() {
                    let source = entry.link_name()?.map(|name| name.into_owned());
                    let source = source
                        .map(|name| relative_to_root(archive_path, &name, root.as_deref()))
                        .transpose()?
                        .flatten()
                        .ok_or_else(|| {
                            Error::archive(
                                archive_path,
                                format!("hard link {} has no usable target", member.display()),
                            )
                        })?;
                    ensure_no_symlink_between(archive_path, dest, &source)?;
                    link_or_copy(&dest.join(source), &target)?;
                } else {
                    remove_symlink(&target)?;
                    entry.unpack(&target)?;
                }
            }
            unpacked += 1;
        }

        fs::remove_file(archive_path)?;
        info!(archive = %archive_path.display(), members = unpacked, "extracted");
        Ok(())
    }
}

/// Pax and GNU long-name records carry no file of their own.
fn is_metadata<R: Read>(entry: &tar::Entry<'_, R>) -> bool {
    let kind = entry.header().entry_type();
    kind.is_pax_global_extensions()
        || kind.is_pax_local_extensions()
        || kind.is_gnu_longname()
        || kind.is_gnu_longlink()
}

/// Path components of a member, without `.`; rejects anything escaping the destination.
fn normal_components(archive: &Path, member: &Path) -> Result<Vec<PathBuf>> {
    member
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| match c {
            Component::Normal(part) => Ok(PathBuf::from(part)),
            _ => Err(Error::archive(
                archive,
                format!("member {} escapes the destination", member.display()),
            )),
        })
        .collect()
}

/// A member's path below the destination, with the flattened root stripped.
/// `None` for the root itself and for members outside it.
fn relative_to_root(archive: &Path, member: &Path, root: Option<&Path>) -> Result<Option<PathBuf>> {
    let relative: PathBuf = normal_components(archive, member)?.into_iter().collect();
    let relative = match root {
        Some(root) => match relative.strip_prefix(root) {
            Ok(rest) => rest.to_path_buf(),
            Err(_) => return Ok(None),
        },
        None => relative,
    };
    Ok(Some(relative).filter(|r| !r.as_os_str().is_empty()))
}

/// Rejects `relative` when a directory already on disk between `dest` and it is a symlink.
fn ensure_no_symlink_between(archive: &Path, dest: &Path, relative: &Path) -> Result<()> {
    let mut current = dest.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        let is_symlink = fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink());
        if is_symlink {
            return Err(Error::archive(
                archive,
                format!(
                    "member {} would be written through symlink {}",
                    relative.display(),
                    current.display()
                ),
            ));
        }
    }
    Ok(())
}

/// A symlink left at `target` by the old tree is replaced, never followed.
fn remove_symlink(target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(target)?;
    }
    Ok(())
}

/// Hard-link `target` to `source`, copying the contents where linking fails.
fn link_or_copy(source: &Path, target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_ok() {
        fs::remove_file(target)?;
    }
    if let Err(e) = fs::hard_link(source, target) {
        debug!(error = %e, source = %source.display(), "hard link failed, copying");
        fs::copy(source, target)?;
    }
    Ok(())
}
