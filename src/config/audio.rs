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
use std::{error::Error, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_RESUME_TIMEOUT: Duration = Duration::from_secs(3);

/// A YAML representation of the audio output configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. Names starting with "mock" select the mock device.
    #[serde(default = "default_device")]
    device: String,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Output channel count (default: 2).
    channels: Option<u16>,

    /// How long a key press waits for a suspended output to resume before it
    /// is dropped (default: 3s).
    resume_timeout: Option<String>,
}

fn default_device() -> String {
    "default".to_string()
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(&default_device())
    }
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
            resume_timeout: None,
        }
    }

    /// Returns the configuration with a different device.
    pub fn with_device(mut self, device: &str) -> Audio {
        self.device = device.to_string();
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }

    /// Returns the resume timeout from the configuration.
    pub fn resume_timeout(&self) -> Result<Duration, Box<dyn Error>> {
        match &self.resume_timeout {
            Some(timeout) => Ok(DurationString::from_string(timeout.clone())?.into()),
            None => Ok(DEFAULT_RESUME_TIMEOUT),
        }
    }
}
