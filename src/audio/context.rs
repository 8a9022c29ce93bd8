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

//! The single audio output context and its lifecycle.
//!
//! ```text
//! uninitialized --ensure_running--> running --suspend--> suspended
//!                                      ^                     |
//!                                      +------resume---------+
//! any --close--> closed
//! ```
//!
//! The context is initialized lazily on first use. A suspended context is
//! resumed asynchronously; callers get a [`ResumeSignal`] that settles when the
//! resume completes.

use std::{fmt, sync::Arc, thread};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    decode::{self, DecodeError, DecodedAudio},
    mixer::{AudioMixer, Voice},
    window::PlaybackWindow,
    Device,
};
use crate::events::{AudioEvent, Observers};
use crate::playsync::{PlaybackHandle, ResumeSignal};

/// The state of the output context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Running,
    Suspended,
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ContextState::Uninitialized => "uninitialized",
            ContextState::Running => "running",
            ContextState::Suspended => "suspended",
            ContextState::Closed => "closed",
        };
        write!(f, "{}", state)
    }
}

/// Returned by [`AudioContextManager::ensure_running`].
#[derive(Clone, Debug)]
pub struct ContextHandle {
    context_id: u64,
    resume: Option<ResumeSignal>,
}

impl ContextHandle {
    /// Identifies the underlying output. Stays the same for the life of the manager.
    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// True if the context is running right now.
    pub fn is_running(&self) -> bool {
        self.resume.is_none()
    }

    /// The pending resume, if the context was suspended.
    pub fn resume_signal(&self) -> Option<&ResumeSignal> {
        self.resume.as_ref()
    }
}

struct Inner {
    state: ContextState,
    mixer: Option<AudioMixer>,
    context_id: u64,
    init_count: usize,
    pending_resume: Option<ResumeSignal>,
}

struct Shared {
    device: Arc<dyn Device>,
    inner: Mutex<Inner>,
    observers: Observers,
}

/// Owns the audio output and the mixer that feeds it.
#[derive(Clone)]
pub struct AudioContextManager {
    shared: Arc<Shared>,
}

impl AudioContextManager {
    /// Creates a manager for the given device. Nothing is opened until first use.
    pub fn new(device: Arc<dyn Device>, observers: Observers) -> AudioContextManager {
        AudioContextManager {
            shared: Arc::new(Shared {
                device,
                inner: Mutex::new(Inner {
                    state: ContextState::Uninitialized,
                    mixer: None,
                    context_id: 0,
                    init_count: 0,
                    pending_resume: None,
                }),
                observers,
            }),
        }
    }

    /// Makes sure the context is usable. Initializes it on first call and
    /// requests a resume if it is suspended. Returns None if the context is
    /// closed or can't be initialized.
    pub fn ensure_running(&self) -> Option<ContextHandle> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            ContextState::Running => Some(ContextHandle {
                context_id: inner.context_id,
                resume: None,
            }),
            ContextState::Closed => None,
            ContextState::Uninitialized => {
                let device = &self.shared.device;
                let mixer = AudioMixer::new(device.channels(), device.sample_rate());
                if let Err(e) = device.open(mixer.clone()) {
                    error!(device = %device, err = e.as_ref(), "Unable to initialize audio output");
                    return None;
                }
                inner.mixer = Some(mixer);
                inner.init_count += 1;
                inner.context_id = inner.init_count as u64;
                inner.state = ContextState::Running;
                info!(
                    device = %device,
                    sample_rate = device.sample_rate(),
                    channels = device.channels(),
                    "Audio output initialized"
                );
                self.shared
                    .observers
                    .emit(AudioEvent::ContextStateChanged(ContextState::Running));
                Some(ContextHandle {
                    context_id: inner.context_id,
                    resume: None,
                })
            }
            ContextState::Suspended => {
                let signal = match &inner.pending_resume {
                    Some(signal) if signal.get().is_none() => signal.clone(),
                    _ => {
                        let signal = ResumeSignal::new();
                        inner.pending_resume = Some(signal.clone());
                        self.spawn_resume(signal.clone());
                        signal
                    }
                };
                Some(ContextHandle {
                    context_id: inner.context_id,
                    resume: Some(signal),
                })
            }
        }
    }

    fn spawn_resume(&self, signal: ResumeSignal) {
        debug!("Requesting audio output resume");
        let shared = self.shared.clone();
        thread::spawn(move || {
            let result = shared.device.resume();
            let resumed = {
                let mut inner = shared.inner.lock();
                inner.pending_resume = None;
                match (&result, inner.state) {
                    (Ok(()), ContextState::Suspended) => {
                        inner.state = ContextState::Running;
                        true
                    }
                    (Ok(()), state) => state == ContextState::Running,
                    (Err(_), _) => false,
                }
            };
            match result {
                Ok(()) if resumed => {
                    info!("Audio output resumed");
                    shared
                        .observers
                        .emit(AudioEvent::ContextStateChanged(ContextState::Running));
                }
                Ok(()) => debug!("Audio output resumed after close"),
                Err(e) => warn!(err = e.as_ref(), "Unable to resume audio output"),
            }
            signal.settle(resumed);
        });
    }

    /// Suspends a running context. Returns true if the context was suspended.
    pub fn suspend(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state != ContextState::Running {
            return false;
        }
        if let Err(e) = self.shared.device.suspend() {
            warn!(err = e.as_ref(), "Unable to suspend audio output");
            return false;
        }
        inner.state = ContextState::Suspended;
        info!("Audio output suspended");
        self.shared
            .observers
            .emit(AudioEvent::ContextStateChanged(ContextState::Suspended));
        true
    }

    /// Closes the context for good. Playing voices are stopped.
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == ContextState::Closed {
            return;
        }
        if let Some(mixer) = inner.mixer.take() {
            mixer.stop_all();
        }
        if inner.state != ContextState::Uninitialized {
            if let Err(e) = self.shared.device.close() {
                warn!(err = e.as_ref(), "Error while closing audio output");
            }
        }
        inner.state = ContextState::Closed;
        if let Some(signal) = inner.pending_resume.take() {
            signal.settle(false);
        }
        info!("Audio output closed");
        self.shared
            .observers
            .emit(AudioEvent::ContextStateChanged(ContextState::Closed));
    }

    pub fn state(&self) -> ContextState {
        self.shared.inner.lock().state
    }

    /// The id of the initialized context, if any.
    pub fn context_id(&self) -> Option<u64> {
        let inner = self.shared.inner.lock();
        (inner.init_count > 0).then_some(inner.context_id)
    }

    /// How many times the output has been initialized.
    pub fn init_count(&self) -> usize {
        self.shared.inner.lock().init_count
    }

    /// The output sample rate that decoded audio is converted to.
    pub fn sample_rate(&self) -> u32 {
        self.shared.device.sample_rate()
    }

    pub fn device(&self) -> Arc<dyn Device> {
        self.shared.device.clone()
    }

    /// Decodes audio for playback through this context.
    pub fn decode(
        &self,
        bytes: Arc<[u8]>,
        hint: Option<&str>,
    ) -> Result<DecodedAudio, DecodeError> {
        decode::decode(bytes, hint, self.sample_rate())
    }

    /// Starts one playback of the window at the given gain. Only a running
    /// context plays anything.
    pub fn start_playback(
        &self,
        audio: &DecodedAudio,
        window: PlaybackWindow,
        gain: f32,
    ) -> Option<PlaybackHandle> {
        let inner = self.shared.inner.lock();
        if inner.state != ContextState::Running {
            return None;
        }
        let mixer = inner.mixer.as_ref()?;
        Some(mixer.add_voice(Voice::new(audio.clone(), window, gain)))
    }
}
