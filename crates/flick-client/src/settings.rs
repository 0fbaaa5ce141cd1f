//! Persisted user settings.
//!
//! Only the local display name survives a restart. It is stored as a small
//! JSON document in the platform data directory:
//! - Linux:   `~/.local/share/flick/settings.json`
//! - macOS:   `~/Library/Application Support/com.flick.flick/settings.json`
//! - Windows: `{FOLDERID_RoamingAppData}\flick\flick\data\settings.json`

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use flick_core::LocalIdentity;
use flick_shared::constants::SETTINGS_FILE;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Settings file in the platform data directory.
    pub fn open_default() -> Result<Self, SettingsError> {
        let dirs = ProjectDirs::from("com", "flick", "flick").ok_or(SettingsError::NoDataDir)?;
        Ok(Self::open_in(dirs.data_dir()))
    }

    /// Settings file inside an explicit directory.
    pub fn open_in(dir: &Path) -> Self {
        Self::open_at(dir.join(SETTINGS_FILE))
    }

    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings. A missing file yields the defaults.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file yet");
                return Ok(Settings::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Session identity: fresh id, saved display name or a random one.
    pub fn local_identity(&self) -> LocalIdentity {
        let saved = match self.load() {
            Ok(settings) => settings.display_name,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable settings");
                None
            }
        };
        LocalIdentity::generate(saved.as_deref())
    }

    pub fn save_display_name(&self, name: &str) -> Result<(), SettingsError> {
        let mut settings = self.load().unwrap_or_default();
        settings.display_name = Some(name.to_string());
        self.save(&settings)?;
        info!(path = %self.path.display(), "Display name saved");
        Ok(())
    }
}
