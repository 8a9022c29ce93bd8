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
use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, span, Level};

use crate::player::Player;

pub mod keyboard;

/// Controller events that trigger behavior in the player.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A key was pressed. Carries the key token, e.g. `KeyQ`.
    KeyDown(String),

    /// A key was released.
    KeyUp(String),

    /// Plays the message sent sound.
    SendMessage,

    /// Suspends the audio output.
    Suspend,

    /// Resumes the audio output.
    Resume,

    /// Decodes evicted sound pack audio again.
    Reload,

    /// Selects the sound pack with the given id.
    Select(String),

    /// Removes the sound pack with the given id.
    Remove(String),

    /// Logs the registered sound packs.
    List,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drops ignored keys and auto-repeated key downs.
struct KeyFilter {
    ignored: HashSet<String>,
    held: HashSet<String>,
}

impl KeyFilter {
    fn new(ignored: &[String]) -> KeyFilter {
        KeyFilter {
            ignored: ignored.iter().cloned().collect(),
            held: HashSet::new(),
        }
    }

    /// Returns true if the key down should make a sound.
    fn key_down(&mut self, token: &str) -> bool {
        !self.ignored.contains(token) && self.held.insert(token.to_string())
    }

    /// Returns true if the key up should make a sound.
    fn key_up(&mut self, token: &str) -> bool {
        self.held.remove(token);
        !self.ignored.contains(token)
    }
}

/// Routes driver events to the player.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver. Key events for the
    /// ignored tokens never reach the player.
    pub fn new(
        player: Arc<Player>,
        driver: Arc<dyn Driver>,
        ignored_keys: &[String],
    ) -> Controller {
        let keys = KeyFilter::new(ignored_keys);
        Controller {
            handle: tokio::spawn(
                async move { Controller::trigger_events(player, driver, keys).await },
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers player events by watching the driver and getting events from it.
    async fn trigger_events(player: Arc<Player>, driver: Arc<dyn Driver>, mut keys: KeyFilter) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(64);
        let join_handle = driver.monitor_events(events_tx);

        info!(
            sound_pack = player.current_sound_pack_id(),
            "Controller started."
        );

        while let Some(event) = events_rx.recv().await {
            match event {
                Event::KeyDown(token) => {
                    if keys.key_down(&token) {
                        let outcome = player.key_down(&token);
                        debug!(token, outcome = ?outcome, "Key down");
                    }
                }
                Event::KeyUp(token) => {
                    if keys.key_up(&token) {
                        let outcome = player.key_up(&token);
                        debug!(token, outcome = ?outcome, "Key up");
                    }
                }
                Event::SendMessage => {
                    let outcome = player.play_message_sound();
                    debug!(outcome = ?outcome, "Message sent");
                }
                Event::Suspend => {
                    let suspended = player.suspend();
                    info!(suspended, "Suspend requested.");
                }
                Event::Resume => {
                    let pending = player.resume().is_some();
                    info!(pending, "Resume requested.");
                }
                Event::Reload => {
                    let player = player.clone();
                    match tokio::task::spawn_blocking(move || player.reload_audio_buffers()).await
                    {
                        Ok(restored) => info!(restored, "Reload finished."),
                        Err(e) => error!(err = %e, "Error waiting for reload"),
                    }
                }
                Event::Select(id) => {
                    if let Err(e) = player.select_sound_pack(&id) {
                        error!(id, err = %e, "Unable to select sound pack");
                    }
                }
                Event::Remove(id) => {
                    if let Err(e) = player.remove_sound_pack(&id) {
                        error!(id, err = %e, "Unable to remove sound pack");
                    }
                }
                Event::List => {
                    for pack in player.sound_packs() {
                        info!(
                            id = pack.id,
                            name = pack.name,
                            keys = pack.keys,
                            selected = pack.selected,
                            decoded = pack.decoded,
                            "Sound pack"
                        );
                    }
                }
            }
        }

        info!("Controller closing.");
        match join_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(err = %e, "Event monitor failed"),
            Err(e) => error!(err = %e, "Error waiting for event monitor to stop"),
        }
    }
}
