// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::error::ConfigError;
use crate::soundpack::SoundPackConfig;

/// File name of the persisted state document.
pub const SETTINGS_FILE: &str = "chat-bubbles-audio.json";

/// User facing audio settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AudioSettings {
    pub keyboard_sound_enabled: bool,
    pub message_sound_enabled: bool,
    pub keyboard_volume: f32,
    pub message_volume: f32,
    pub release_sounds_enabled: bool,
    pub current_sound_pack: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        AudioSettings {
            keyboard_sound_enabled: true,
            message_sound_enabled: true,
            keyboard_volume: 0.5,
            message_volume: 0.7,
            release_sounds_enabled: false,
            current_sound_pack: None,
        }
    }
}

/// Clamps a volume to [0, 1]. NaN is treated as silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

impl AudioSettings {
    /// Returns the settings with volumes clamped.
    pub fn normalized(mut self) -> AudioSettings {
        self.keyboard_volume = clamp_volume(self.keyboard_volume);
        self.message_volume = clamp_volume(self.message_volume);
        self
    }
}

/// A sound pack as it survives restarts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedPack {
    pub config: SoundPackConfig,
    /// Where the pack's audio is stored. Packs without a path can't be restored.
    pub audio_path: Option<PathBuf>,
}

/// The persisted state document.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PersistedState {
    pub audio_settings: AudioSettings,
    pub sound_packs: Vec<PersistedPack>,
}

/// Reads and writes the persisted state document in the data directory.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Creates a store for the given data directory.
    pub fn new(data_dir: &Path) -> SettingsStore {
        SettingsStore {
            path: data_dir.join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state. A missing document gives the defaults; an unreadable one
    /// is logged and also gives the defaults. A corrupt document is copied to
    /// [`SettingsStore::backup_path`] first, since the next save replaces it.
    pub fn load(&self) -> PersistedState {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No persisted settings, using defaults");
                return PersistedState::default();
            }
            Err(e) => {
                warn!(path = ?self.path, err = %e, "Unable to read persisted settings");
                return PersistedState::default();
            }
        };

        match serde_json::from_str::<PersistedState>(&contents) {
            Ok(mut state) => {
                state.audio_settings = state.audio_settings.normalized();
                state
            }
            Err(e) => {
                let backup = self.backup_path();
                warn!(
                    path = ?self.path,
                    backup = ?backup,
                    err = %e,
                    "Persisted settings are corrupt, using defaults"
                );
                if let Err(e) = fs::copy(&self.path, &backup) {
                    error!(path = ?backup, err = %e, "Unable to back up corrupt settings");
                }
                PersistedState::default()
            }
        }
    }

    /// Where a corrupt document is kept.
    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    /// Saves the state. The document is written to a temporary file and renamed
    /// into place.
    pub fn save(&self, state: &PersistedState) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = ?self.path, "Persisted settings saved");
        Ok(())
    }
}
