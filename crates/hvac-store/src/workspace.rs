use std::path::{Path, PathBuf};
use std::{env, fs};

use uuid::Uuid;

use hvac_core::{LogEntry, SyncSettings};

use crate::error::{Result, StoreError};
use crate::settings::SettingsFile;
use crate::store::Store;

/// Environment override for the storage directory.
pub const DATA_DIR_ENV: &str = "HVAC_DATA_DIR";

/// Default base directory for all engine storage.
pub fn default_base_dir() -> PathBuf {
    if let Ok(dir) = env::var(DATA_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs_home().join(".hvac-scheme")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Session storage and settings for one run of the engine.
///
/// Layout:
/// ```text
/// ~/.hvac-scheme/
/// ├── session.db
/// └── settings.toml
/// ```
pub struct Workspace {
    store: Store,
    settings: Option<SettingsFile>,
    session: Uuid,
    base: Option<PathBuf>,
}

impl Workspace {
    /// Open the store and settings under `base_dir`, creating it as needed.
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        fs::create_dir_all(&base).map_err(|e| StoreError::io(&base, e))?;

        let store = Store::open(&base.join("session.db"))?;
        let settings = SettingsFile::new(base.join("settings.toml"));
        let session = Uuid::new_v4();
        tracing::debug!(base = %base.display(), %session, "workspace opened");

        Ok(Self {
            store,
            settings: Some(settings),
            session,
            base: Some(base),
        })
    }

    /// In-memory store; settings are not persisted.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory()?,
            settings: None,
            session: Uuid::new_v4(),
            base: None,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    pub fn load_settings(&self) -> Result<SyncSettings> {
        match &self.settings {
            Some(file) => file.read(),
            None => Ok(SyncSettings::default()),
        }
    }

    pub fn save_settings(&self, settings: &SyncSettings) -> Result<()> {
        match &self.settings {
            Some(file) => file.write(settings),
            None => Ok(()),
        }
    }

    /// Append diagnostics under this run's session id.
    pub fn record_log(&self, entries: &[LogEntry]) -> Result<usize> {
        self.store.append_log(&self.session.to_string(), entries)
    }
}
