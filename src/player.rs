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
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tracing::{debug, error, info, span, warn, Level, Span};

use crate::{
    audio::{self, AudioContextManager, ContextState, DecodeError, DecodedAudio},
    config::{
        clamp_volume, AppConfig, AudioSettings, ConfigError, PersistedPack, PersistedState,
        SettingsStore,
    },
    engine::{KeystrokePlaybackEngine, PlayOutcome},
    events::{AudioEvent, Observers},
    playsync::ResumeSignal,
    soundpack::{
        self, ActiveSoundPackSelection, AudioBufferCache, CacheError, ParseError, SoundPackConfig,
        SoundPacks, SourceLocator,
    },
};

/// Directory under the data directory where installed pack audio is kept.
const PACKS_DIR: &str = "packs";
/// Configuration file of the bundled pack.
const DEFAULT_PACK_CONFIG: &str = "config.json";
/// Audio file of the bundled pack when its configuration doesn't name one.
const DEFAULT_PACK_SOUND: &str = "sound.ogg";

/// Errors reported by the player.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("no sound pack with id '{0}'")]
    UnknownSoundPack(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PlayerError + '_ {
    move |source| PlayerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A sound pack as shown to users.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundPackSummary {
    pub id: String,
    pub name: String,
    pub keys: usize,
    pub includes_numpad: bool,
    pub selected: bool,
    /// False while the pack's audio is evicted.
    pub decoded: bool,
}

/// The application context: owns the sound packs, the audio output, the
/// playback engine, and the persisted settings.
pub struct Player {
    context: AudioContextManager,
    packs: Arc<RwLock<SoundPacks>>,
    selection: ActiveSoundPackSelection,
    engine: KeystrokePlaybackEngine,
    settings: RwLock<AudioSettings>,
    store: SettingsStore,
    data_dir: PathBuf,
    message_sound: RwLock<Option<DecodedAudio>>,
    observers: Observers,
    /// The logging span.
    span: Span,
}

impl Player {
    /// Creates a player for the device. The persisted settings are read from the
    /// data directory; packs are registered by [`Player::restore`].
    pub fn new(device: Arc<dyn audio::Device>, config: &AppConfig) -> Result<Player, PlayerError> {
        let resume_timeout =
            config
                .audio()
                .resume_timeout()
                .map_err(|e| ConfigError::Invalid {
                    field: "audio.resume_timeout",
                    reason: e.to_string(),
                })?;
        let data_dir = config.data_dir();
        let store = SettingsStore::new(&data_dir);
        let settings = store.load().audio_settings;

        let observers = Observers::new();
        let context = AudioContextManager::new(device, observers.clone());
        let selection = ActiveSoundPackSelection::new();
        let packs = Arc::new(RwLock::new(SoundPacks::new(AudioBufferCache::new(
            context.clone(),
            selection.clone(),
        ))));
        let engine = KeystrokePlaybackEngine::new(
            context.clone(),
            packs.clone(),
            selection.clone(),
            resume_timeout,
            observers.clone(),
        );

        Ok(Player {
            context,
            packs,
            selection,
            engine,
            settings: RwLock::new(settings),
            store,
            data_dir,
            message_sound: RwLock::new(None),
            observers,
            span: span!(Level::INFO, "player"),
        })
    }

    fn packs_dir(&self) -> PathBuf {
        self.data_dir.join(PACKS_DIR)
    }

    /// Copies audio into the packs directory under a unique name.
    fn install_audio(
        &self,
        id: &str,
        audio: &[u8],
        hint: Option<&str>,
    ) -> Result<PathBuf, PlayerError> {
        let dir = self.packs_dir();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let stem: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let path = dir.join(format!("{}-{}.{}", stem, nanos, hint.unwrap_or("audio")));
        fs::write(&path, audio).map_err(io_error(&path))?;
        Ok(path)
    }

    /// Loads a sound pack from its configuration text and audio bytes, and makes
    /// it the active pack. On failure the previously active pack stays active.
    pub fn load_sound_pack(
        &self,
        config_text: &str,
        audio: &[u8],
        hint: Option<&str>,
    ) -> Result<SoundPackSummary, PlayerError> {
        let _enter = self.span.enter();

        let config = soundpack::parse(config_text)?;
        let path = self.install_audio(config.id(), audio, hint)?;
        self.register(config, SourceLocator::owned_file(path), true)
    }

    /// Loads a sound pack from files. The audio is copied into the data directory.
    pub fn load_sound_pack_files(
        &self,
        config_path: &Path,
        audio_path: &Path,
    ) -> Result<SoundPackSummary, PlayerError> {
        let config_text = fs::read_to_string(config_path).map_err(io_error(config_path))?;
        let audio = fs::read(audio_path).map_err(io_error(audio_path))?;
        let hint = audio_path.extension().and_then(|ext| ext.to_str());
        self.load_sound_pack(&config_text, &audio, hint)
    }

    /// Loads the bundled pack from the given directory. The pack only becomes
    /// active if nothing else is. Failures are logged and otherwise ignored.
    pub fn load_default_sound_pack(&self, dir: &Path) -> bool {
        let _enter = self.span.enter();

        let config_path = dir.join(DEFAULT_PACK_CONFIG);
        let result = fs::read_to_string(&config_path)
            .map_err(io_error(&config_path))
            .and_then(|text| Ok(soundpack::parse(&text)?))
            .and_then(|config| {
                let sound = if config.sound().is_empty() {
                    DEFAULT_PACK_SOUND
                } else {
                    config.sound()
                };
                let locator = SourceLocator::file(dir.join(sound));
                let select = self.selection.get().is_none();
                self.register(config, locator, select)
            });

        match result {
            Ok(summary) => {
                info!(id = summary.id, dir = ?dir, "Default sound pack loaded");
                true
            }
            Err(e) => {
                warn!(dir = ?dir, err = %e, "Unable to load default sound pack");
                false
            }
        }
    }

    /// Decodes and registers a pack. The locator is revoked if decoding fails.
    fn register(
        &self,
        config: SoundPackConfig,
        locator: SourceLocator,
        select: bool,
    ) -> Result<SoundPackSummary, PlayerError> {
        let id = config.id().to_string();
        let name = config.name().to_string();
        {
            let mut packs = self.packs.write();
            if let Err(e) = packs.cache_mut().store(&id, locator.clone()) {
                locator.revoke();
                error!(id, err = %e, "Unable to decode sound pack audio");
                return Err(e.into());
            }
            packs.insert_config(config);
        }
        info!(id, name, "Sound pack loaded");
        self.observers.emit(AudioEvent::SoundPackLoaded {
            id: id.clone(),
            name,
        });

        if select {
            self.set_selection(Some(&id));
        }
        self.persist();

        // Warm up the output so the first key press doesn't pay for it.
        self.context.ensure_running();

        self.summary(&id).ok_or(PlayerError::UnknownSoundPack(id))
    }

    fn set_selection(&self, id: Option<&str>) {
        match id {
            Some(id) => {
                self.selection.select(id);
            }
            None => {
                self.selection.clear();
            }
        }
        self.settings.write().current_sound_pack = id.map(str::to_string);
        debug!(id, "Sound pack selection changed");
        self.observers.emit(AudioEvent::SelectionChanged {
            id: id.map(str::to_string),
        });
    }

    /// Removes a pack and its audio. Clears the selection if it was active.
    pub fn remove_sound_pack(&self, id: &str) -> Result<(), PlayerError> {
        let _enter = self.span.enter();

        let was_selected = self.selection.is_selected(id);
        if self.packs.write().remove(id).is_none() {
            return Err(PlayerError::UnknownSoundPack(id.to_string()));
        }
        if was_selected {
            self.set_selection(None);
        }
        info!(id, "Sound pack removed");
        self.observers.emit(AudioEvent::SoundPackRemoved { id: id.to_string() });
        self.persist();
        Ok(())
    }

    /// Makes the given pack the active one.
    pub fn select_sound_pack(&self, id: &str) -> Result<(), PlayerError> {
        if !self.packs.read().contains(id) {
            return Err(PlayerError::UnknownSoundPack(id.to_string()));
        }
        self.set_selection(Some(id));
        self.persist();
        Ok(())
    }

    pub fn current_sound_pack_id(&self) -> Option<String> {
        self.selection.get()
    }

    fn summary(&self, id: &str) -> Option<SoundPackSummary> {
        let packs = self.packs.read();
        let config = packs.config(id)?;
        Some(SoundPackSummary {
            id: config.id().to_string(),
            name: config.name().to_string(),
            keys: config.press_keys().len(),
            includes_numpad: config.includes_numpad(),
            selected: self.selection.is_selected(id),
            decoded: packs.cache().get(id).is_some(),
        })
    }

    /// Summaries of every registered pack, ordered by id.
    pub fn sound_packs(&self) -> Vec<SoundPackSummary> {
        let ids: Vec<String> = self
            .packs
            .read()
            .configs()
            .map(|config| config.id().to_string())
            .collect();
        ids.iter().filter_map(|id| self.summary(id)).collect()
    }

    /// Drops every decoded buffer, keeping their sources.
    pub fn evict_audio_buffers(&self) -> usize {
        let evicted = self.packs.write().cache_mut().evict_all();
        info!(evicted, "Sound pack audio evicted");
        evicted
    }

    /// Decodes every evicted buffer again. Returns how many were restored.
    pub fn reload_audio_buffers(&self) -> usize {
        let _enter = self.span.enter();

        let ids = self.packs.read().cache().evicted_ids();
        let mut restored = 0;
        for id in ids {
            match self.packs.write().cache_mut().ensure_decoded(&id) {
                Ok(_) => restored += 1,
                Err(e) => error!(id, err = %e, "Unable to reload sound pack audio"),
            }
        }
        info!(restored, "Sound pack audio reloaded");
        restored
    }

    /// Registers the persisted packs, decodes their audio, and restores the
    /// persisted selection. Returns how many packs were decoded.
    pub fn restore(&self) -> usize {
        let _enter = self.span.enter();

        let state = self.store.load();
        *self.settings.write() = state.audio_settings.clone();
        let packs_dir = self.packs_dir();
        {
            let mut packs = self.packs.write();
            for pack in state.sound_packs {
                let Some(path) = pack.audio_path else {
                    warn!(id = pack.config.id(), "Persisted sound pack has no audio");
                    continue;
                };
                let locator = if path.starts_with(&packs_dir) {
                    SourceLocator::owned_file(path)
                } else {
                    SourceLocator::file(path)
                };
                packs.cache_mut().register_evicted(pack.config.id(), locator);
                packs.insert_config(pack.config);
            }
        }

        let restored = self.reload_audio_buffers();
        match state.audio_settings.current_sound_pack {
            Some(id) if self.packs.read().contains(&id) => self.set_selection(Some(&id)),
            Some(id) => {
                warn!(id, "Persisted sound pack selection is gone");
                self.set_selection(None);
            }
            None => {}
        }
        restored
    }

    fn persist(&self) {
        let state = {
            let packs = self.packs.read();
            PersistedState {
                audio_settings: self.settings.read().clone(),
                sound_packs: packs
                    .configs()
                    .map(|config| PersistedPack {
                        config: config.clone(),
                        audio_path: packs
                            .cache()
                            .locator(config.id())
                            .and_then(|locator| locator.path().map(Path::to_path_buf)),
                    })
                    .collect(),
            }
        };
        if let Err(e) = self.store.save(&state) {
            error!(path = ?self.store.path(), err = %e, "Unable to persist settings");
        }
    }

    /// Plays the key down sound for the token if keyboard sounds are enabled.
    pub fn key_down(&self, token: &str) -> PlayOutcome {
        let (enabled, volume) = {
            let settings = self.settings.read();
            (settings.keyboard_sound_enabled, settings.keyboard_volume)
        };
        if !enabled {
            return PlayOutcome::Skipped("keyboard sounds disabled");
        }
        self.engine.play(token, volume)
    }

    /// Plays the key release sound for the token if release sounds are enabled.
    pub fn key_up(&self, token: &str) -> PlayOutcome {
        let (enabled, volume) = {
            let settings = self.settings.read();
            (
                settings.keyboard_sound_enabled && settings.release_sounds_enabled,
                settings.keyboard_volume,
            )
        };
        if !enabled {
            return PlayOutcome::Skipped("release sounds disabled");
        }
        self.engine.play_release(token, volume)
    }

    /// Loads the message sent sound.
    pub fn load_message_sound(&self, bytes: &[u8], hint: Option<&str>) -> Result<(), PlayerError> {
        let audio = self.context.decode(Arc::from(bytes), hint)?;
        info!(
            duration_ms = audio.duration().as_millis(),
            "Message sound loaded"
        );
        *self.message_sound.write() = Some(audio);
        Ok(())
    }

    /// Loads the message sent sound from a file.
    pub fn load_message_sound_file(&self, path: &Path) -> Result<(), PlayerError> {
        let bytes = fs::read(path).map_err(io_error(path))?;
        self.load_message_sound(&bytes, path.extension().and_then(|ext| ext.to_str()))
    }

    /// Plays the message sent sound if it is enabled and loaded.
    pub fn play_message_sound(&self) -> PlayOutcome {
        let (enabled, volume) = {
            let settings = self.settings.read();
            (settings.message_sound_enabled, settings.message_volume)
        };
        if !enabled {
            return PlayOutcome::Skipped("message sounds disabled");
        }
        let Some(audio) = self.message_sound.read().clone() else {
            return PlayOutcome::Skipped("no message sound loaded");
        };
        self.engine.play_buffer(&audio, volume)
    }

    /// The current settings.
    pub fn settings(&self) -> AudioSettings {
        self.settings.read().clone()
    }

    fn update_settings<F: FnOnce(&mut AudioSettings)>(&self, update: F) {
        let settings = {
            let mut settings = self.settings.write();
            update(&mut settings);
            settings.clone()
        };
        self.observers.emit(AudioEvent::SettingsChanged(settings));
        self.persist();
    }

    pub fn set_keyboard_volume(&self, volume: f32) {
        self.update_settings(|settings| settings.keyboard_volume = clamp_volume(volume));
    }

    pub fn set_message_volume(&self, volume: f32) {
        self.update_settings(|settings| settings.message_volume = clamp_volume(volume));
    }

    pub fn set_keyboard_sound_enabled(&self, enabled: bool) {
        self.update_settings(|settings| settings.keyboard_sound_enabled = enabled);
    }

    pub fn set_message_sound_enabled(&self, enabled: bool) {
        self.update_settings(|settings| settings.message_sound_enabled = enabled);
    }

    pub fn set_release_sounds_enabled(&self, enabled: bool) {
        self.update_settings(|settings| settings.release_sounds_enabled = enabled);
    }

    /// Registers an observer of player events.
    pub fn subscribe(&self) -> Receiver<AudioEvent> {
        self.observers.subscribe()
    }

    /// Suspends the audio output.
    pub fn suspend(&self) -> bool {
        self.context.suspend()
    }

    /// Resumes the audio output, initializing it if needed. Returns the pending
    /// resume if the output was suspended.
    pub fn resume(&self) -> Option<ResumeSignal> {
        self.context
            .ensure_running()
            .and_then(|handle| handle.resume_signal().cloned())
    }

    /// Closes the audio output for good.
    pub fn close(&self) {
        self.context.close();
    }

    pub fn context_state(&self) -> ContextState {
        self.context.state()
    }

    /// The audio output context.
    pub fn context(&self) -> &AudioContextManager {
        &self.context
    }
}
