//! Path safety classifier: decides whether a path lies in an operating-system
//! critical region.
//!
//! Two tiers: a broad table of critical roots (deny) and a narrow allow-list of
//! maintenance folders nested inside those roots. The most specific match wins,
//! so a custom critical root placed inside an allow-listed folder is still
//! denied. A path that *contains* a critical root (an ancestor such as `/usr`
//! or `C:\`) is critical too, because removing it removes the root.
//!
//! Classification is lexical and pure: normalization happens first (see
//! [`NormalizedPath`]), comparison second, and no filesystem access is made.

use std::fmt;
use std::path::Path;

use crate::core::errors::{ReclaimError, Result};
use crate::core::paths::{NormalizedPath, PathFlavor};

/// Critical roots on Unix-like systems (Linux and macOS).
const UNIX_CRITICAL_ROOTS: &[&str] = &[
    "/bin",
    "/sbin",
    "/lib",
    "/lib32",
    "/lib64",
    "/libx32",
    "/boot",
    "/efi",
    "/etc",
    "/dev",
    "/proc",
    "/sys",
    "/run",
    "/usr/bin",
    "/usr/sbin",
    "/usr/lib",
    "/usr/lib32",
    "/usr/lib64",
    "/usr/libexec",
    "/usr/share/ca-certificates",
    "/var/lib",
    "/System",
    "/Library/Keychains",
    "/Library/Apple",
    "/private/etc",
    "/private/var/db",
];

/// Maintenance-safe folders nested inside [`UNIX_CRITICAL_ROOTS`].
const UNIX_ALLOWED: &[&str] = &[
    "/var/lib/systemd/coredump",
    "/var/lib/apport/coredump",
    "/var/lib/apt/lists/partial",
    "/var/lib/snapd/cache",
];

/// Critical roots on Windows, relative to any drive or share root.
const WINDOWS_CRITICAL_ROOTS: &[&str] = &[
    "Windows",
    "Boot",
    "EFI",
    "Recovery",
    "System Volume Information",
    "Program Files/WindowsApps",
    "ProgramData/Microsoft/Crypto",
    "ProgramData/Microsoft/Windows",
    "ProgramData/Microsoft/Windows Defender",
    "bootmgr",
    "pagefile.sys",
    "hiberfil.sys",
    "swapfile.sys",
];

/// Maintenance-safe folders nested inside [`WINDOWS_CRITICAL_ROOTS`].
const WINDOWS_ALLOWED: &[&str] = &[
    "Windows/SoftwareDistribution/Download",
    "Windows/SoftwareDistribution/DeliveryOptimization",
    "Windows/Prefetch",
    "Windows/Logs",
    "Windows/Temp",
    "Windows/Installer/$PatchCache$",
    "Windows/Minidump",
    "Windows/Debug",
    "Windows/LiveKernelReports",
    "Windows/Panther",
    "Windows/System32/LogFiles",
    "ProgramData/Microsoft/Windows/WER",
];

/// How a path relates to the critical root that made it critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootRelation {
    /// The path is the root or lies beneath it.
    Inside,
    /// The path is an ancestor of the root.
    Contains,
}

/// Classifier verdict with the table entry responsible for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVerdict {
    Critical {
        root: String,
        relation: RootRelation,
    },
    /// Inside a critical root but exempted by the allow-list.
    Exempted { entry: String },
    Unprotected,
}

impl PathVerdict {
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Critical { .. })
    }
}

impl fmt::Display for PathVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical {
                root,
                relation: RootRelation::Inside,
            } => write!(f, "protected system path (under {root})"),
            Self::Critical {
                root,
                relation: RootRelation::Contains,
            } => write!(f, "protected system path (contains {root})"),
            Self::Exempted { entry } => write!(f, "maintenance folder exempted ({entry})"),
            Self::Unprotected => f.write_str("not protected"),
        }
    }
}

/// One deny or allow table entry.
#[derive(Debug, Clone)]
struct Entry {
    label: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Absolute path, exact prefix and flavor.
    Exact(NormalizedPath),
    /// Windows segments matched beneath any drive or share root.
    AnyWindowsRoot(Vec<String>),
}

impl Entry {
    fn exact(label: &str, path: NormalizedPath) -> Self {
        Self {
            label: label.to_string(),
            matcher: Matcher::Exact(path),
        }
    }

    fn windows(relative: &str) -> Self {
        let segments = relative
            .split('/')
            .map(str::to_lowercase)
            .collect::<Vec<_>>();
        Self {
            label: relative.replace('/', "\\"),
            matcher: Matcher::AnyWindowsRoot(segments),
        }
    }

    /// Number of matched segments when `path` is at or below this entry.
    fn depth_inside(&self, path: &NormalizedPath) -> Option<usize> {
        match &self.matcher {
            Matcher::Exact(root) => path.starts_with(root).then(|| root.segments().len()),
            Matcher::AnyWindowsRoot(segments) => {
                (windows_rooted(path) && path.segments().starts_with(segments))
                    .then_some(segments.len())
            }
        }
    }

    /// True when `path` is a strict ancestor of this entry.
    fn is_contained_by(&self, path: &NormalizedPath) -> bool {
        match &self.matcher {
            Matcher::Exact(root) => root.starts_with(path) && root != path,
            Matcher::AnyWindowsRoot(segments) => {
                windows_rooted(path)
                    && segments.len() > path.segments().len()
                    && segments.starts_with(path.segments())
            }
        }
    }
}

fn windows_rooted(path: &NormalizedPath) -> bool {
    path.flavor() == PathFlavor::Windows && path.is_absolute()
}

/// Pure, deterministic classifier of operating-system critical paths.
#[derive(Debug, Clone)]
pub struct PathSafetyClassifier {
    deny: Vec<Entry>,
    allow: Vec<Entry>,
}

impl Default for PathSafetyClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PathSafetyClassifier {
    /// Classifier with only the built-in tables.
    #[must_use]
    pub fn builtin() -> Self {
        let mut deny = Vec::new();
        let mut allow = Vec::new();
        for root in UNIX_CRITICAL_ROOTS {
            if let Ok(path) = NormalizedPath::parse(root) {
                deny.push(Entry::exact(root, path));
            }
        }
        for entry in UNIX_ALLOWED {
            if let Ok(path) = NormalizedPath::parse(entry) {
                allow.push(Entry::exact(entry, path));
            }
        }
        deny.extend(WINDOWS_CRITICAL_ROOTS.iter().map(|root| Entry::windows(root)));
        allow.extend(WINDOWS_ALLOWED.iter().map(|entry| Entry::windows(entry)));
        Self { deny, allow }
    }

    /// Built-in tables plus caller-supplied critical roots.
    ///
    /// # Errors
    /// [`ReclaimError::InvalidConfig`] when an additional root is malformed or relative.
    pub fn with_additional_roots<S: AsRef<str>>(roots: &[S]) -> Result<Self> {
        let mut classifier = Self::builtin();
        for raw in roots {
            let raw = raw.as_ref();
            let path = NormalizedPath::parse(raw).map_err(|e| ReclaimError::InvalidConfig {
                details: format!("additional critical root {raw:?}: {e}"),
            })?;
            if !path.is_absolute() {
                return Err(ReclaimError::InvalidConfig {
                    details: format!("additional critical root {raw:?} must be absolute"),
                });
            }
            classifier.deny.push(Entry::exact(raw, path));
        }
        Ok(classifier)
    }

    /// `IsCriticalPath`: true when `path` must never be deleted.
    ///
    /// # Errors
    /// [`ReclaimError::InvalidPath`] for empty, whitespace-only, malformed, or
    /// relative input. Invalid input is never treated as safe.
    pub fn is_critical_path(&self, path: &str) -> Result<bool> {
        Ok(self.classify(path)?.is_critical())
    }

    /// [`Self::is_critical_path`] for a [`Path`].
    pub fn is_critical(&self, path: &Path) -> Result<bool> {
        Ok(self.classify_path(path)?.is_critical())
    }

    pub fn classify_path(&self, path: &Path) -> Result<PathVerdict> {
        self.classify(&path.to_string_lossy())
    }

    /// Full verdict, naming the table entry responsible.
    pub fn classify(&self, raw: &str) -> Result<PathVerdict> {
        let path = NormalizedPath::parse(raw)?;
        if !path.is_absolute() {
            return Err(ReclaimError::invalid_path(
                raw,
                "path must be absolute to be classified",
            ));
        }
        Ok(self.classify_normalized(&path))
    }

    fn classify_normalized(&self, path: &NormalizedPath) -> PathVerdict {
        if let Some(root) = self.deny.iter().find(|entry| entry.is_contained_by(path)) {
            return PathVerdict::Critical {
                root: root.label.clone(),
                relation: RootRelation::Contains,
            };
        }

        let deepest_deny = self
            .deny
            .iter()
            .filter_map(|entry| entry.depth_inside(path).map(|depth| (depth, entry)))
            .max_by_key(|(depth, _)| *depth);
        let Some((deny_depth, deny_entry)) = deepest_deny else {
            return PathVerdict::Unprotected;
        };

        let deepest_allow = self
            .allow
            .iter()
            .filter_map(|entry| entry.depth_inside(path).map(|depth| (depth, entry)))
            .max_by_key(|(depth, _)| *depth);
        match deepest_allow {
            Some((allow_depth, allow_entry)) if allow_depth >= deny_depth => PathVerdict::Exempted {
                entry: allow_entry.label.clone(),
            },
            _ => PathVerdict::Critical {
                root: deny_entry.label.clone(),
                relation: RootRelation::Inside,
            },
        }
    }
}
