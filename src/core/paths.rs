//! Lexical path normalization.
//!
//! Normalization never touches the filesystem: `.` segments are dropped, `..`
//! pops the previous segment (clamped at the root), Windows separators and
//! trailing dots/spaces are folded, and case is folded where the filesystem
//! is case-insensitive. Both the safety classifier and the deletion pipeline's
//! dedup key go through [`NormalizedPath`], so a traversal spelling cannot
//! reach a different verdict than its resolved form.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::errors::{ReclaimError, Result};

/// Characters Windows refuses in a path component.
const WINDOWS_RESERVED_CHARS: &[char] = &['<', '>', '"', '|', '?', '*', ':'];

/// Path grammar a raw string is parsed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathFlavor {
    Unix,
    Windows,
}

/// A fully resolved, comparison-ready path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    flavor: PathFlavor,
    /// `c:` for drive paths, `//server/share` for UNC, empty on Unix.
    prefix: String,
    segments: Vec<String>,
    absolute: bool,
}

impl NormalizedPath {
    /// Parse and normalize `raw`.
    ///
    /// # Errors
    /// [`ReclaimError::InvalidPath`] for empty/whitespace input, control
    /// characters, or characters the target filesystem rejects.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(ReclaimError::invalid_path(raw, "path is empty or whitespace"));
        }
        if let Some(bad) = raw.chars().find(|c| c.is_control()) {
            return Err(ReclaimError::invalid_path(
                raw,
                format!("path contains control character U+{:04X}", u32::from(bad)),
            ));
        }

        if is_windows_form(raw) {
            parse_windows(raw)
        } else {
            Ok(parse_unix(raw))
        }
    }

    /// Normalize a [`Path`]; non-UTF-8 components are replaced lossily.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::parse(&path.to_string_lossy())
    }

    #[must_use]
    pub const fn flavor(&self) -> PathFlavor {
        self.flavor
    }

    #[must_use]
    pub const fn is_absolute(&self) -> bool {
        self.absolute
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True when the path has a drive letter prefix (`c:`).
    #[must_use]
    pub fn has_drive(&self) -> bool {
        self.flavor == PathFlavor::Windows && self.prefix.len() == 2
    }

    /// Component-wise prefix test. Both paths must share flavor and prefix.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        self.flavor == other.flavor
            && self.prefix == other.prefix
            && self.absolute == other.absolute
            && self.segments.starts_with(&other.segments)
    }

    /// Stable string used for deduplication and display.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = match self.flavor {
            PathFlavor::Unix => "/",
            PathFlavor::Windows => "\\",
        };
        f.write_str(&self.prefix)?;
        if self.absolute {
            f.write_str(sep)?;
        }
        f.write_str(&self.segments.join(sep))
    }
}

/// Resolve `path` against the current directory without touching the
/// filesystem beyond reading the working directory.
#[must_use]
pub fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn is_windows_form(raw: &str) -> bool {
    if cfg!(windows) {
        return true;
    }
    let bytes = raw.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    drive || raw.starts_with("\\\\")
}

fn case_insensitive(flavor: PathFlavor) -> bool {
    flavor == PathFlavor::Windows || cfg!(target_os = "macos")
}

fn parse_unix(raw: &str) -> NormalizedPath {
    let absolute = raw.starts_with('/');
    let segments = resolve_segments(raw.split('/'), absolute, PathFlavor::Unix);
    NormalizedPath {
        flavor: PathFlavor::Unix,
        prefix: String::new(),
        segments,
        absolute,
    }
}

fn parse_windows(raw: &str) -> Result<NormalizedPath> {
    let mut text = raw.replace('\\', "/");
    // Verbatim and device prefixes name the same objects.
    for verbatim in ["//?/UNC/", "//?/unc/"] {
        if let Some(rest) = text.strip_prefix(verbatim) {
            text = format!("//{rest}");
        }
    }
    for device in ["//?/", "//./"] {
        if let Some(rest) = text.strip_prefix(device) {
            text = rest.to_string();
        }
    }

    let (prefix, rest, absolute) = if let Some(unc) = text.strip_prefix("//") {
        let mut parts = unc.splitn(3, '/');
        let server = parts.next().unwrap_or_default();
        let share = parts.next().unwrap_or_default();
        if server.is_empty() || share.is_empty() {
            return Err(ReclaimError::invalid_path(raw, "UNC path lacks server or share"));
        }
        let prefix = format!("//{}/{}", server.to_lowercase(), share.to_lowercase());
        (prefix, parts.next().unwrap_or_default().to_string(), true)
    } else {
        let bytes = text.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            let prefix = text[..2].to_ascii_lowercase();
            let rest = text[2..].to_string();
            let absolute = rest.starts_with('/');
            (prefix, rest, absolute)
        } else {
            let absolute = text.starts_with('/');
            (String::new(), text.clone(), absolute)
        }
    };

    if let Some(bad) = rest.chars().find(|c| WINDOWS_RESERVED_CHARS.contains(c)) {
        return Err(ReclaimError::invalid_path(
            raw,
            format!("path contains reserved character {bad:?}"),
        ));
    }

    let segments = resolve_segments(rest.split('/'), absolute, PathFlavor::Windows);
    Ok(NormalizedPath {
        flavor: PathFlavor::Windows,
        prefix,
        segments,
        absolute,
    })
}

fn resolve_segments<'a>(
    parts: impl Iterator<Item = &'a str>,
    absolute: bool,
    flavor: PathFlavor,
) -> Vec<String> {
    let fold = case_insensitive(flavor);
    let mut out: Vec<String> = Vec::new();
    for part in parts {
        match part {
            "" | "." => {}
            ".." => {
                let can_pop = out.last().is_some_and(|last| last != "..");
                if can_pop {
                    out.pop();
                } else if !absolute {
                    out.push("..".to_string());
                }
            }
            other => {
                let trimmed = if flavor == PathFlavor::Windows {
                    // Win32 ignores trailing dots and spaces in a component.
                    other.trim_end_matches(['.', ' '])
                } else {
                    other
                };
                if trimmed.is_empty() {
                    continue;
                }
                if fold {
                    out.push(trimmed.to_lowercase());
                } else {
                    out.push(trimmed.to_string());
                }
            }
        }
    }
    out
}
