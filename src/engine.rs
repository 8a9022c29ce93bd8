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

//! Keystroke playback: resolves a key through the active sound pack and plays
//! its slice of the pack's buffer.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::audio::{AudioContextManager, ContextState, DecodedAudio, PlaybackWindow};
use crate::events::{AudioEvent, Observers};
use crate::soundpack::{keymap, ActiveSoundPackSelection, DecodedAudioAsset, SoundPacks};

/// What a single play request did. Informational only; playback never fails loudly.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayOutcome {
    /// A voice was started.
    Played { key_id: String, fallback: bool },
    /// The output was suspended; the request will be retried once it resumes.
    RetryScheduled,
    /// Nothing was played.
    Skipped(&'static str),
}

/// A request the engine can retry after a resume.
#[derive(Clone)]
enum Request {
    Press(String),
    Release(String),
    Message(DecodedAudio),
}

struct Inner {
    context: AudioContextManager,
    packs: Arc<RwLock<SoundPacks>>,
    selection: ActiveSoundPackSelection,
    /// How long a retry waits for a resume before giving up.
    resume_timeout: Duration,
    observers: Observers,
}

/// Plays key sounds from the selected sound pack.
#[derive(Clone)]
pub struct KeystrokePlaybackEngine {
    inner: Arc<Inner>,
}

impl KeystrokePlaybackEngine {
    /// Creates a new engine.
    pub fn new(
        context: AudioContextManager,
        packs: Arc<RwLock<SoundPacks>>,
        selection: ActiveSoundPackSelection,
        resume_timeout: Duration,
        observers: Observers,
    ) -> KeystrokePlaybackEngine {
        KeystrokePlaybackEngine {
            inner: Arc::new(Inner {
                context,
                packs,
                selection,
                resume_timeout,
                observers,
            }),
        }
    }

    /// Plays the sound for a key press at the given volume. Keys without a sound
    /// of their own play a random key from the pack.
    pub fn play(&self, token: &str, volume: f32) -> PlayOutcome {
        self.trigger(Request::Press(token.to_string()), volume, true)
    }

    /// Plays the release sound for a key, if the pack has one. Releases never
    /// fall back to another key.
    pub fn play_release(&self, token: &str, volume: f32) -> PlayOutcome {
        self.trigger(Request::Release(token.to_string()), volume, true)
    }

    /// Plays a whole buffer, such as the message sound, with the same resume
    /// handling as key sounds.
    pub fn play_buffer(&self, audio: &DecodedAudio, volume: f32) -> PlayOutcome {
        self.trigger(Request::Message(audio.clone()), volume, true)
    }

    fn trigger(&self, request: Request, volume: f32, allow_retry: bool) -> PlayOutcome {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };

        if self.inner.context.state() == ContextState::Closed {
            return PlayOutcome::Skipped("audio output closed");
        }
        let selected = match &request {
            Request::Message(_) => None,
            _ => match self.inner.selection.get() {
                Some(id) => Some(id),
                None => return PlayOutcome::Skipped("no sound pack selected"),
            },
        };

        let Some(handle) = self.inner.context.ensure_running() else {
            return PlayOutcome::Skipped("audio output unavailable");
        };
        if let Some(signal) = handle.resume_signal() {
            if !allow_retry {
                return PlayOutcome::Skipped("audio output still suspended");
            }
            let engine = self.clone();
            let signal = signal.clone();
            let timeout = self.inner.resume_timeout;
            thread::spawn(move || match signal.wait_timeout(timeout) {
                Some(true) => {
                    let outcome = engine.trigger(request, volume, false);
                    debug!(outcome = ?outcome, "Retried playback after resume");
                }
                Some(false) => debug!("Audio output failed to resume, dropping playback"),
                None => debug!(
                    timeout = ?timeout,
                    "Audio output did not resume in time, dropping playback"
                ),
            });
            return PlayOutcome::RetryScheduled;
        }

        match (request, selected) {
            (Request::Message(audio), _) => {
                let window = PlaybackWindow::whole(audio.duration_secs());
                if self
                    .inner
                    .context
                    .start_playback(&audio, window, volume)
                    .is_none()
                {
                    return PlayOutcome::Skipped("audio output not running");
                }
                self.inner
                    .observers
                    .emit(AudioEvent::MessageSoundPlayed { gain: volume });
                PlayOutcome::Played {
                    key_id: "message".to_string(),
                    fallback: false,
                }
            }
            (Request::Press(token), Some(id)) => self.play_press(&id, &token, volume),
            (Request::Release(token), Some(id)) => self.play_release_slice(&id, &token, volume),
            (_, None) => PlayOutcome::Skipped("no sound pack selected"),
        }
    }

    /// Gets the decoded buffer for the pack, decoding it again if it was evicted.
    fn asset(&self, id: &str) -> Option<DecodedAudioAsset> {
        if let Some(asset) = self.inner.packs.read().cache().get(id) {
            return Some(asset);
        }
        match self.inner.packs.write().cache_mut().ensure_decoded(id) {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!(id, err = %e, "Unable to decode sound pack audio");
                None
            }
        }
    }

    fn play_press(&self, id: &str, token: &str, volume: f32) -> PlayOutcome {
        let Some(asset) = self.asset(id) else {
            return PlayOutcome::Skipped("sound pack audio unavailable");
        };

        let (key_id, slice, fallback) = {
            let packs = self.inner.packs.read();
            let Some(config) = packs.config(id) else {
                return PlayOutcome::Skipped("sound pack not registered");
            };

            match keymap::translate(token, config.includes_numpad())
                .and_then(|key_id| config.slice(key_id).map(|slice| (key_id, slice)))
            {
                Some((key_id, slice)) => (key_id.to_string(), slice, false),
                None => {
                    let keys = config.press_keys();
                    let Some(key_id) = keys.choose(&mut rand::thread_rng()) else {
                        return PlayOutcome::Skipped("sound pack has no key sounds");
                    };
                    let Some(slice) = config.slice(key_id) else {
                        return PlayOutcome::Skipped("sound pack has no key sounds");
                    };
                    debug!(token, key_id, "No sound for key, using a random one");
                    (key_id.to_string(), slice, true)
                }
            }
        };

        let window =
            PlaybackWindow::for_slice(slice.start_ms(), slice.duration_ms(), asset.duration_secs());
        if self
            .inner
            .context
            .start_playback(asset.audio(), window, volume)
            .is_none()
        {
            return PlayOutcome::Skipped("audio output not running");
        }

        debug!(
            token,
            key_id,
            fallback,
            start = window.start_secs(),
            duration = window.duration_secs(),
            "Key sound played"
        );
        self.inner.observers.emit(AudioEvent::KeySoundPlayed {
            key_id: key_id.clone(),
            fallback,
            window,
            gain: volume,
        });
        PlayOutcome::Played { key_id, fallback }
    }

    fn play_release_slice(&self, id: &str, token: &str, volume: f32) -> PlayOutcome {
        let (key_id, slice) = {
            let packs = self.inner.packs.read();
            let Some(config) = packs.config(id) else {
                return PlayOutcome::Skipped("sound pack not registered");
            };
            let Some(key_id) = keymap::translate(token, config.includes_numpad()) else {
                return PlayOutcome::Skipped("key has no release sound");
            };
            let Some(slice) = config.release_slice(key_id) else {
                return PlayOutcome::Skipped("key has no release sound");
            };
            (key_id.to_string(), slice)
        };
        let Some(asset) = self.asset(id) else {
            return PlayOutcome::Skipped("sound pack audio unavailable");
        };

        let window =
            PlaybackWindow::for_slice(slice.start_ms(), slice.duration_ms(), asset.duration_secs());
        if self
            .inner
            .context
            .start_playback(asset.audio(), window, volume)
            .is_none()
        {
            return PlayOutcome::Skipped("audio output not running");
        }

        debug!(token, key_id, "Key release sound played");
        self.inner.observers.emit(AudioEvent::ReleaseSoundPlayed {
            key_id: key_id.clone(),
            window,
            gain: volume,
        });
        PlayOutcome::Played {
            key_id,
            fallback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::audio::mock;
    use crate::soundpack::{parse, AudioBufferCache, SourceLocator};
    use crate::testutil::audio::{pack_config, wav_bytes};
    use crate::testutil::eventually;

    struct Fixture {
        engine: KeystrokePlaybackEngine,
        context: AudioContextManager,
        device: mock::Device,
        packs: Arc<RwLock<SoundPacks>>,
        selection: ActiveSoundPackSelection,
        events: crossbeam_channel::Receiver<AudioEvent>,
    }

    impl Fixture {
        fn mixer(&self) -> crate::audio::AudioMixer {
            self.device.mixer().unwrap()
        }

        fn register(&self, config: &str, seconds: f64) {
            let config = parse(config).unwrap();
            let frames = (44100.0 * seconds) as usize;
            let mut packs = self.packs.write();
            packs
                .cache_mut()
                .store(
                    config.id(),
                    SourceLocator::bytes(wav_bytes(44100, 1, frames), Some("wav")),
                )
                .unwrap();
            self.selection.select(config.id());
            packs.insert_config(config);
        }

        fn played(&self) -> Vec<AudioEvent> {
            self.events
                .try_iter()
                .filter(|event| {
                    matches!(
                        event,
                        AudioEvent::KeySoundPlayed { .. } | AudioEvent::ReleaseSoundPlayed { .. }
                    )
                })
                .collect()
        }
    }

    fn fixture(resume_timeout: Duration) -> Fixture {
        let device = mock::Device::manual("mock", 44100, 2);
        let observers = Observers::new();
        let events = observers.subscribe();
        let context = AudioContextManager::new(Arc::new(device.clone()), observers.clone());
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
            observers,
        );
        Fixture {
            engine,
            context,
            device,
            packs,
            selection,
            events,
        }
    }

    fn assert_window(window: PlaybackWindow, start: f64, duration: f64) {
        assert!((window.start_secs() - start).abs() < 1e-9);
        assert!((window.duration_secs() - duration).abs() < 1e-9);
    }

    #[test]
    fn test_play_mapped_key() {
        let fixture = fixture(Duration::from_secs(3));
        fixture.register(&pack_config("p1", "Pack One"), 5.0);

        assert_eq!(
            fixture.engine.play("KeyQ", 0.5),
            PlayOutcome::Played {
                key_id: "16".to_string(),
                fallback: false
            }
        );

        let mixer = fixture.mixer();
        assert_eq!(mixer.active_count(), 1);
        assert_eq!(mixer.voice_windows(), vec![(44100, 52920, 0.5)]);

        match fixture.played().as_slice() {
            [AudioEvent::KeySoundPlayed {
                key_id,
                fallback,
                window,
                gain,
            }] => {
                assert_eq!(key_id, "16");
                assert!(!fallback);
                assert_window(*window, 1.0, 0.2);
                assert_eq!(*gain, 0.5);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_key_falls_back() {
        let fixture = fixture(Duration::from_secs(3));
        fixture.register(&pack_config("p1", "Pack One"), 5.0);

        let mut chosen = HashSet::new();
        for _ in 0..50 {
            match fixture.engine.play("MediaPlayPause", 0.5) {
                PlayOutcome::Played { key_id, fallback } => {
                    assert!(fallback);
                    chosen.insert(key_id);
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        // Only press keys are candidates, never release variants.
        assert!(chosen.iter().all(|key| ["16", "30", "57"].contains(&key.as_str())));
        assert_eq!(fixture.mixer().started_count(), 50);

        // A mapped key the pack doesn't define falls back too.
        assert!(matches!(
            fixture.engine.play("KeyZ", 0.5),
            PlayOutcome::Played { fallback: true, .. }
        ));
    }

    #[test]
    fn test_out_of_range_timing_plays_default_slice() {
        let fixture = fixture(Duration::from_secs(3));
        fixture.register(
            r#"{"id": "p1", "name": "short", "defines": {"16": [6000, 100], "30": [4900, 500]}}"#,
            5.0,
        );

        fixture.engine.play("KeyQ", 1.0);
        fixture.engine.play("KeyA", 1.0);
        let events = fixture.played();
        let windows: Vec<PlaybackWindow> = events
            .iter()
            .map(|event| match event {
                AudioEvent::KeySoundPlayed { window, .. } => *window,
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_window(windows[0], 0.0, 0.1);
        assert_window(windows[1], 4.9, 0.1);
    }

    #[test]
    fn test_rapid_presses_overlap() {
        let fixture = fixture(Duration::from_secs(3));
        fixture.register(&pack_config("p1", "Pack One"), 5.0);

        for _ in 0..10 {
            fixture.engine.play("KeyQ", 0.5);
        }
        assert_eq!(fixture.mixer().active_count(), 10);
    }

    #[test]
    fn test_no_selection_or_closed() {
        let fixture = fixture(Duration::from_secs(3));
        assert_eq!(
            fixture.engine.play("KeyQ", 0.5),
            PlayOutcome::Skipped("no sound pack selected")
        );
        // Nothing was initialized for a no-op.
        assert_eq!(fixture.context.state(), ContextState::Uninitialized);

        fixture.register(&pack_config("p1", "Pack One"), 5.0);
        fixture.context.close();
        assert_eq!(
            fixture.engine.play("KeyQ", 0.5),
            PlayOutcome::Skipped("audio output closed")
        );
    }

    #[test]
    fn test_retry_after_resume() {
        let fixture = fixture(Duration::from_secs(3));
        fixture.register(&pack_config("p1", "Pack One"), 5.0);
        fixture.engine.play("KeyQ", 0.5);
        let mixer = fixture.mixer();
        mixer.stop_all();

        fixture.context.suspend();
        fixture.device.hold_resume();
        assert_eq!(
            fixture.engine.play("KeyQ", 0.5),
            PlayOutcome::RetryScheduled
        );
        assert_eq!(mixer.started_count(), 1);

        fixture.device.release_resume();
        eventually(
            || mixer.started_count() == 2,
            "Retried key press never played",
        );
        assert_eq!(fixture.context.state(), ContextState::Running);
        // Exactly one retry.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(mixer.started_count(), 2);
    }

    #[test]
    fn test_retry_is_abandoned_after_timeout() {
        let fixture = fixture(Duration::from_millis(20));
        fixture.register(&pack_config("p1", "Pack One"), 5.0);
        fixture.engine.play("KeyQ", 0.5);
        let mixer = fixture.mixer();

        fixture.context.suspend();
        fixture.device.hold_resume();
        assert_eq!(
            fixture.engine.play("KeyQ", 0.5),
            PlayOutcome::RetryScheduled
        );
        std::thread::sleep(Duration::from_millis(100));
        fixture.device.release_resume();

        eventually(
            || fixture.context.state() == ContextState::Running,
            "Audio output never resumed",
        );
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(mixer.started_count(), 1);
    }

    #[test]
    fn test_release_sounds() {
        let fixture = fixture(Duration::from_secs(3));
        fixture.register(&pack_config("p1", "Pack One"), 5.0);

        assert_eq!(
            fixture.engine.play_release("KeyQ", 0.5),
            PlayOutcome::Played {
                key_id: "16".to_string(),
                fallback: false
            }
        );
        assert_eq!(
            fixture.engine.play_release("KeyA", 0.5),
            PlayOutcome::Skipped("key has no release sound")
        );
        assert_eq!(
            fixture.engine.play_release("MediaPlayPause", 0.5),
            PlayOutcome::Skipped("key has no release sound")
        );
        assert_eq!(fixture.mixer().started_count(), 1);

        match fixture.played().as_slice() {
            [AudioEvent::ReleaseSoundPlayed { key_id, window, .. }] => {
                assert_eq!(key_id, "16");
                assert_window(*window, 1.3, 0.09);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_evicted_buffer_is_decoded_on_play() {
        let fixture = fixture(Duration::from_secs(3));
        fixture.register(&pack_config("p1", "Pack One"), 5.0);
        fixture.packs.write().cache_mut().evict_all();

        assert!(matches!(
            fixture.engine.play("KeyQ", 0.5),
            PlayOutcome::Played { .. }
        ));
        assert!(fixture.packs.read().cache().get("p1").is_some());
    }

    #[test]
    fn test_volume_is_clamped() {
        let fixture = fixture(Duration::from_secs(3));
        fixture.register(&pack_config("p1", "Pack One"), 5.0);

        fixture.engine.play("KeyQ", 3.0);
        fixture.engine.play("KeyQ", -1.0);
        let gains: Vec<f32> = fixture
            .mixer()
            .voice_windows()
            .iter()
            .map(|(_, _, gain)| *gain)
            .collect();
        assert_eq!(gains, vec![1.0, 0.0]);
    }

    #[test]
    fn test_play_buffer() {
        let fixture = fixture(Duration::from_secs(3));
        let audio = DecodedAudio::new(vec![0.1; 4410], 1, 44100);
        assert!(matches!(
            fixture.engine.play_buffer(&audio, 0.7),
            PlayOutcome::Played { .. }
        ));
        assert_eq!(fixture.mixer().voice_windows(), vec![(0, 4410, 0.7)]);
    }
}
