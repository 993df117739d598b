//! Source control (`.dsc`) documents.
//!
//! A `.dsc` is a single deb822 paragraph, usually clear-signed. Only the
//! fields needed to locate and verify the source tarball are interpreted;
//! everything else is kept as raw text.

use std::collections::HashMap;
use std::path::{Component, Path};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("line {line}: expected `Field: value`, got {text:?}")]
    MalformedField { line: usize, text: String },

    #[error("line {line}: continuation line before any field")]
    OrphanContinuation { line: usize },

    #[error("missing `{0}` field")]
    MissingField(&'static str),

    #[error("`Files` field lists no files")]
    NoFiles,

    #[error("malformed `{field}` entry: {entry:?}")]
    MalformedEntry { field: &'static str, entry: String },

    #[error("`{field}` names {name:?}, which is not a plain file name")]
    UnsafeFileName { field: &'static str, name: String },
}

/// A file referenced by the `Files` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub size: u64,
    pub name: String,
}

/// A file referenced by the `Checksums-Sha256` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sha256Entry {
    pub sha256: String,
    pub name: String,
}

/// A parsed source control document.
#[derive(Debug, Clone)]
pub struct Dsc {
    fields: HashMap<String, String>,
    pub files: Vec<FileEntry>,
    pub sha256: Vec<Sha256Entry>,
}

impl Dsc {
    /// Parse a `.dsc`, unwrapping a PGP clear-signature if present.
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let fields = parse_paragraph(&unwrap_signature(text))?;

        let files = fields
            .get("files")
            .ok_or(ControlError::MissingField("Files"))?;
        let files = parse_entries(files, "Files")?
            .into_iter()
            .map(|(_, size, name)| FileEntry { size, name })
            .collect::<Vec<_>>();
        if files.is_empty() {
            return Err(ControlError::NoFiles);
        }

        let sha256 = match fields.get("checksums-sha256") {
            Some(value) => parse_entries(value, "Checksums-Sha256")?
                .into_iter()
                .map(|(sha256, _, name)| Sha256Entry { sha256, name })
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            fields,
            files,
            sha256,
        })
    }

    /// Raw value of a field, looked up case-insensitively.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The SHA-256 checksum recorded for `name`, if any.
    pub fn sha256_of(&self, name: &str) -> Option<&str> {
        self.sha256
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.sha256.as_str())
    }
}

/// Strip the armor of a clear-signed message, keeping only the signed text.
fn unwrap_signature(text: &str) -> String {
    let mut lines = text.lines();
    let Some(first) = lines.clone().find(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    if first.trim() != "-----BEGIN PGP SIGNED MESSAGE-----" {
        return text.to_string();
    }

    // Skip to the end of the armor headers (first blank line after the marker).
    lines
        .by_ref()
        .take_while(|l| l.trim() != "-----BEGIN PGP SIGNED MESSAGE-----")
        .for_each(drop);
    lines.by_ref().take_while(|l| !l.trim().is_empty()).for_each(drop);

    let mut out = String::new();
    for line in lines.take_while(|l| l.trim() != "-----BEGIN PGP SIGNATURE-----") {
        // Dash-escaped lines ("- -----") lose their escape.
        out.push_str(line.strip_prefix("- ").unwrap_or(line));
        out.push('\n');
    }
    out
}

/// Parse the first paragraph into lowercase-keyed fields.
fn parse_paragraph(text: &str) -> Result<HashMap<String, String>, ControlError> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;

        if line.starts_with('#') {
            continue;
        }
        if line.trim().is_empty() {
            if fields.is_empty() {
                continue;
            }
            break;
        }

        if line.starts_with([' ', '\t']) {
            let key = current
                .as_ref()
                .ok_or(ControlError::OrphanContinuation { line: line_no })?;
            let value = fields.entry(key.clone()).or_default();
            let trimmed = line.trim();
            value.push('\n');
            if trimmed != "." {
                value.push_str(trimmed);
            }
            continue;
        }

        let (key, value) = line.split_once(':').ok_or_else(|| ControlError::MalformedField {
            line: line_no,
            text: line.to_string(),
        })?;
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(ControlError::MalformedField {
                line: line_no,
                text: line.to_string(),
            });
        }
        fields.insert(key.clone(), value.trim().to_string());
        current = Some(key);
    }

    Ok(fields)
}

/// Parse `checksum size name` lines of a multiline file list.
fn parse_entries(
    value: &str,
    field: &'static str,
) -> Result<Vec<(String, u64, String)>, ControlError> {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|entry| {
            let malformed = || ControlError::MalformedEntry {
                field,
                entry: entry.to_string(),
            };
            let mut parts = entry.split_whitespace();
            let (Some(sum), Some(size), Some(name), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(malformed());
            };
            let size = size.parse().map_err(|_| malformed())?;
            if !is_plain_file_name(name) {
                return Err(ControlError::UnsafeFileName {
                    field,
                    name: name.to_string(),
                });
            }
            Ok((sum.to_string(), size, name.to_string()))
        })
        .collect()
}

/// Exactly one normal path component: no directories, no `..`, not absolute.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    !name.contains('/')
        && matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED_DSC: &str = "\
-----BEGIN PGP SIGNED MESSAGE-----
Hash: SHA512

Format: 3.0 (quilt)
Source: foo
Binary: foo, libfoo1
Version: 2.1-1
Maintainer: Foo Maintainers <foo@example.org>
Standards-Version: 4.6.2
Checksums-Sha256:
 1f2ec5a1b8e1d6c0a6e0ff9a1a8e9d2c3b4a5f6e7d8c9b0a1f2e3d4c5b6a7980 123456 foo_2.1.orig.tar.xz
 9e8d7c6b5a4f3e2d1c0b9a8f7e6d5c4b3a2f1e0d9c8b7a6f5e4d3c2b1a0f9e8d 4567 foo_2.1-1.debian.tar.xz
Files:
 0123456789abcdef0123456789abcdef 123456 foo_2.1.orig.tar.xz
 fedcba9876543210fedcba9876543210 4567 foo_2.1-1.debian.tar.xz

-----BEGIN PGP SIGNATURE-----

iQIzBAEBCgAdFiEE
-----END PGP SIGNATURE-----
";

    #[test]
    fn parses_signed_dsc() {
        let dsc = Dsc::parse(SIGNED_DSC).unwrap();
        assert_eq!(dsc.field("Source"), Some("foo"));
        assert_eq!(dsc.field("version"), Some("2.1-1"));
        assert_eq!(dsc.files.len(), 2);
        assert_eq!(
            dsc.files[0],
            FileEntry {
                size: 123_456,
                name: "foo_2.1.orig.tar.xz".to_string(),
            }
        );
        assert_eq!(dsc.files[1].name, "foo_2.1-1.debian.tar.xz");
    }

    #[test]
    fn exposes_sha256_by_name() {
        let dsc = Dsc::parse(SIGNED_DSC).unwrap();
        assert_eq!(
            dsc.sha256_of("foo_2.1-1.debian.tar.xz"),
            Some("9e8d7c6b5a4f3e2d1c0b9a8f7e6d5c4b3a2f1e0d9c8b7a6f5e4d3c2b1a0f9e8d")
        );
        assert_eq!(dsc.sha256_of("missing.tar.xz"), None);
    }

    #[test]
    fn parses_unsigned_dsc() {
        let text = "Source: bar\nVersion: 1.0\nFiles:\n abc 10 bar_1.0.tar.gz\n";
        let dsc = Dsc::parse(text).unwrap();
        assert_eq!(dsc.files[0].name, "bar_1.0.tar.gz");
        assert!(dsc.sha256.is_empty());
    }

    #[test]
    fn multiline_fields_keep_empty_continuations() {
        let text = "Source: bar\nDescription: first\n second\n .\n third\nFiles:\n abc 1 x.tar.gz\n";
        let dsc = Dsc::parse(text).unwrap();
        assert_eq!(dsc.field("Description"), Some("first\nsecond\n\nthird"));
    }

    #[test]
    fn missing_files_field() {
        let err = Dsc::parse("Source: bar\nVersion: 1.0\n").unwrap_err();
        assert_eq!(err, ControlError::MissingField("Files"));
    }

    #[test]
    fn empty_files_field() {
        let err = Dsc::parse("Source: bar\nFiles:\n").unwrap_err();
        assert_eq!(err, ControlError::NoFiles);
    }

    #[test]
    fn malformed_entry() {
        let err = Dsc::parse("Source: bar\nFiles:\n abc notasize x.tar.gz\n").unwrap_err();
        assert!(matches!(err, ControlError::MalformedEntry { field: "Files", .. }));
    }

    #[test]
    fn orphan_continuation() {
        let err = Dsc::parse(" dangling\nSource: bar\n").unwrap_err();
        assert_eq!(err, ControlError::OrphanContinuation { line: 1 });
    }

    #[test]
    fn file_names_must_stay_in_place() {
        for name in ["../foo.tar.xz", "/tmp/foo.tar.xz", "sub/foo.tar.xz", ".."] {
            let text = format!("Source: bar\nFiles:\n abc 1 {name}\n");
            let err = Dsc::parse(&text).unwrap_err();
            assert_eq!(
                err,
                ControlError::UnsafeFileName {
                    field: "Files",
                    name: name.to_string(),
                },
                "{name}"
            );
        }
    }
}
