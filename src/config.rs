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
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

mod audio;
mod error;
mod settings;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::settings::{
    clamp_volume, AudioSettings, PersistedPack, PersistedState, SettingsStore, SETTINGS_FILE,
};

const ENV_PREFIX: &str = "KEYCLACK";
const DEFAULT_DATA_DIR: &str = ".keyclack";
const DEFAULT_PACK_DIR: &str = "mechvibes";

/// The application configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct AppConfig {
    /// The audio output.
    #[serde(default)]
    audio: Audio,

    /// Where settings and installed sound pack audio are stored.
    data_dir: Option<PathBuf>,

    /// Directory holding the bundled `config.json` and `sound.ogg`.
    default_pack_dir: Option<PathBuf>,

    /// Key tokens that never make a sound.
    #[serde(default)]
    ignored_keys: Vec<String>,
}

impl AppConfig {
    /// Loads the configuration from an optional YAML file, with `KEYCLACK_`
    /// environment variables layered on top (`KEYCLACK_AUDIO__DEVICE=mock`).
    pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        Self::finish(builder)
    }

    /// Loads the configuration from YAML text, with environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<AppConfig, ConfigError> {
        Self::finish(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)))
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<AppConfig, ConfigError> {
        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("ignored_keys"),
            )
            .build()?
            .try_deserialize()?;

        // Surface a bad duration at load time rather than on first key press.
        config
            .audio
            .resume_timeout()
            .map_err(|e| ConfigError::Invalid {
                field: "audio.resume_timeout",
                reason: e.to_string(),
            })?;
        Ok(config)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn default_pack_dir(&self) -> PathBuf {
        self.default_pack_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PACK_DIR))
    }

    pub fn ignored_keys(&self) -> &[String] {
        &self.ignored_keys
    }

    /// Overrides the data directory.
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> AppConfig {
        self.data_dir = Some(data_dir);
        self
    }

    /// Overrides the audio device.
    pub fn with_device(mut self, device: &str) -> AppConfig {
        self.audio = self.audio.with_device(device);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_from_yaml() {
        let yaml = r#"
            audio:
              device: mock-yaml
              resume_timeout: 1s
            data_dir: /tmp/keyclack-test
            default_pack_dir: /usr/share/keyclack/mechvibes
            ignored_keys:
              - MetaLeft
              - MetaRight
        "#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.audio().device(), "mock-yaml");
        assert_eq!(
            config.audio().resume_timeout().unwrap(),
            Duration::from_secs(1)
        );
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/keyclack-test"));
        assert_eq!(
            config.default_pack_dir(),
            PathBuf::from("/usr/share/keyclack/mechvibes")
        );
        assert_eq!(config.ignored_keys(), &["MetaLeft", "MetaRight"]);
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.audio().device(), "default");
        assert_eq!(config.data_dir(), PathBuf::from(".keyclack"));
        assert_eq!(config.default_pack_dir(), PathBuf::from("mechvibes"));
        assert!(config.ignored_keys().is_empty());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        std::env::set_var("KEYCLACK_AUDIO__DEVICE", "mock-env");
        std::env::set_var("KEYCLACK_IGNORED_KEYS", "MetaLeft,Fn");
        let config = AppConfig::from_yaml("audio:\n  device: mock-yaml\n");
        std::env::remove_var("KEYCLACK_AUDIO__DEVICE");
        std::env::remove_var("KEYCLACK_IGNORED_KEYS");

        let config = config.unwrap();
        assert_eq!(config.audio().device(), "mock-env");
        assert_eq!(config.ignored_keys(), &["MetaLeft", "Fn"]);
    }

    #[test]
    #[serial]
    fn test_invalid_resume_timeout() {
        let result = AppConfig::from_yaml("audio:\n  resume_timeout: whenever\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "audio.resume_timeout",
                ..
            })
        ));
    }

    #[test]
    #[serial]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyclack.yaml");
        std::fs::write(&path, "audio:\n  device: mock-file\n  sample_rate: 48000\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.audio().device(), "mock-file");
        assert_eq!(config.audio().sample_rate(), 48000);

        let config = config.with_device("mock-cli");
        assert_eq!(config.audio().device(), "mock-cli");
        assert_eq!(config.audio().sample_rate(), 48000);

        assert!(AppConfig::load(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}
