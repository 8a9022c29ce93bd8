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
use std::{error::Error, fmt, sync::Arc};

use crate::config;

pub mod context;
pub mod cpal;
pub mod decode;
pub mod mixer;
pub mod mock;
pub mod window;

pub use context::{AudioContextManager, ContextHandle, ContextState};
pub use decode::{DecodeError, DecodedAudio};
pub use mixer::AudioMixer;
pub use window::PlaybackWindow;

/// An audio output. The context manager opens it once with a mixer, and the
/// device pulls mixed frames from it for as long as it is running.
pub trait Device: fmt::Display + Send + Sync {
    /// Starts output from the given mixer.
    fn open(&self, mixer: AudioMixer) -> Result<(), Box<dyn Error>>;

    /// Pauses output. Voices stay in the mixer.
    fn suspend(&self) -> Result<(), Box<dyn Error>>;

    /// Resumes output. May block until the backend is running again.
    fn resume(&self) -> Result<(), Box<dyn Error>>;

    /// Stops output and releases the backend.
    fn close(&self) -> Result<(), Box<dyn Error>>;

    /// The output sample rate.
    fn sample_rate(&self) -> u32;

    /// The output channel count.
    fn channels(&self) -> u16;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device for the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(
            device,
            config.sample_rate(),
            config.channels(),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
