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
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::audio::{ContextState, PlaybackWindow};
use crate::config::AudioSettings;

/// Events reported to observers of the player.
#[derive(Clone, Debug, PartialEq)]
pub enum AudioEvent {
    /// A sound pack was decoded and registered.
    SoundPackLoaded { id: String, name: String },
    /// A sound pack was removed.
    SoundPackRemoved { id: String },
    /// The active sound pack changed.
    SelectionChanged { id: Option<String> },
    /// The persisted settings changed.
    SettingsChanged(AudioSettings),
    /// A key sound was triggered.
    KeySoundPlayed {
        key_id: String,
        /// True when the key had no sound of its own and a random one was used.
        fallback: bool,
        window: PlaybackWindow,
        gain: f32,
    },
    /// A key release sound was triggered.
    ReleaseSoundPlayed {
        key_id: String,
        window: PlaybackWindow,
        gain: f32,
    },
    /// The message sent sound was triggered.
    MessageSoundPlayed { gain: f32 },
    /// The output context changed state.
    ContextStateChanged(ContextState),
}

/// A list of observers. Observers that have gone away are dropped on the next emit.
#[derive(Clone, Default)]
pub struct Observers {
    senders: Arc<Mutex<Vec<Sender<AudioEvent>>>>,
}

impl Observers {
    pub fn new() -> Observers {
        Observers::default()
    }

    /// Registers a new observer.
    pub fn subscribe(&self) -> Receiver<AudioEvent> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    /// Sends the event to every observer.
    pub fn emit(&self, event: AudioEvent) {
        let mut senders = self.senders.lock();
        if senders.is_empty() {
            return;
        }
        senders.retain(|sender| sender.send(event.clone()).is_ok());
        debug!(observers = senders.len(), event = ?event, "Event emitted");
    }

    /// Number of live observers.
    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
