//! The persisted sync toggle, kept as a small TOML file next to the
//! session database.

use std::fs;
use std::path::{Path, PathBuf};

use hvac_core::SyncSettings;

use crate::error::{Result, StoreError};

#[derive(Clone, Debug)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as the defaults (sync on).
    pub fn read(&self) -> Result<SyncSettings> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncSettings::default()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    pub fn write(&self, settings: &SyncSettings) -> Result<()> {
        let content = toml::to_string(settings)?;
        fs::write(&self.path, content).map_err(|e| StoreError::io(&self.path, e))?;
        tracing::debug!(
            path = %self.path.display(),
            sync = settings.is_sync_enabled,
            "settings saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_defaults_to_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.toml"));
        assert!(file.read().unwrap().is_sync_enabled);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.toml"));
        file.write(&SyncSettings {
            is_sync_enabled: false,
        })
        .unwrap();

        assert!(!file.read().unwrap().is_sync_enabled);
        let raw = fs::read_to_string(file.path()).unwrap();
        assert!(raw.contains("is_sync_enabled = false"));
    }

    #[test]
    fn test_empty_file_uses_field_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "").unwrap();
        assert!(SettingsFile::new(path).read().unwrap().is_sync_enabled);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "is_sync_enabled = [").unwrap();
        let err = SettingsFile::new(path).read().unwrap_err();
        assert!(matches!(err, StoreError::SettingsParse(_)));
    }
}
