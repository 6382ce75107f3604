//! Persistence for [`AutomationSettings`].

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::core::errors::{ReclaimError, Result};
use crate::daemon::automation::AutomationSettings;

pub trait SettingsStore: Send + Sync {
    /// Stored settings, normalized. Defaults when nothing was stored yet.
    fn load(&self) -> Result<AutomationSettings>;

    fn save(&self, settings: &AutomationSettings) -> Result<()>;
}

/// Pretty-printed JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<AutomationSettings> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(AutomationSettings::default()),
            Err(err) => return Err(ReclaimError::io(&self.path, err)),
        };
        let settings: AutomationSettings = serde_json::from_str(&text).map_err(|e| ReclaimError::SettingsStore {
            details: format!("{}: {e}", self.path.display()),
        })?;
        Ok(settings.normalized())
    }

    fn save(&self, settings: &AutomationSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ReclaimError::io(parent, e))?;
        }
        let body = serde_json::to_vec_pretty(settings)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, body).map_err(|e| ReclaimError::io(&staging, e))?;
        fs::rename(&staging, &self.path).map_err(|e| ReclaimError::io(&self.path, e))
    }
}

/// In-process store. `fail_saves` simulates a broken backing store.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Option<AutomationSettings>>,
    fail_saves: AtomicBool,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_settings(settings: AutomationSettings) -> Self {
        Self {
            settings: Mutex::new(Some(settings)),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// What was last saved, without normalization.
    #[must_use]
    pub fn stored(&self) -> Option<AutomationSettings> {
        self.settings.lock().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<AutomationSettings> {
        Ok(self.settings.lock().clone().unwrap_or_default().normalized())
    }

    fn save(&self, settings: &AutomationSettings) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ReclaimError::SettingsStore {
                details: "settings store rejected the write".to_string(),
            });
        }
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }
}
