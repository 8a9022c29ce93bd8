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
// Core audio mixing logic that can be used by both CPAL and test implementations
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::decode::DecodedAudio;
use super::window::PlaybackWindow;
use crate::playsync::PlaybackHandle;

/// One playback instance: a window of a decoded buffer at a fixed gain.
pub struct Voice {
    handle: PlaybackHandle,
    audio: DecodedAudio,
    /// Next frame to read.
    position: usize,
    /// Frame the voice ends at (exclusive).
    end: usize,
    gain: f32,
}

impl Voice {
    /// Creates a voice for the given window of the audio.
    pub fn new(audio: DecodedAudio, window: PlaybackWindow, gain: f32) -> Voice {
        let (start, end) = window.frame_range(audio.sample_rate(), audio.frames());
        Voice {
            handle: PlaybackHandle::new(),
            audio,
            position: start,
            end,
            gain: gain.clamp(0.0, 1.0),
        }
    }

    /// The handle controlling this voice.
    pub fn handle(&self) -> &PlaybackHandle {
        &self.handle
    }

    fn remaining(&self) -> usize {
        self.end.saturating_sub(self.position)
    }

    /// Mixes up to `frames` frames into the interleaved output buffer. Source
    /// channels wrap over the output channels, so mono plays on every channel.
    fn mix_into(&mut self, output: &mut [f32], num_channels: usize, frames: usize) {
        let source_channels = self.audio.channel_count() as usize;
        let samples = self.audio.samples();
        let frames = frames.min(self.remaining());

        for frame in 0..frames {
            let source_base = (self.position + frame) * source_channels;
            let output_base = frame * num_channels;
            for channel in 0..num_channels {
                let sample = samples
                    .get(source_base + channel % source_channels)
                    .copied()
                    .unwrap_or(0.0);
                output[output_base + channel] += sample * self.gain;
            }
        }
        self.position += frames;
    }
}

/// Core audio mixing logic that's independent of any audio backend
#[derive(Clone)]
pub struct AudioMixer {
    /// Voices currently playing
    voices: Arc<Mutex<Vec<Voice>>>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
    /// Total voices ever added
    started: Arc<AtomicU64>,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        Self {
            voices: Arc::new(Mutex::new(Vec::new())),
            num_channels: num_channels.max(1),
            sample_rate,
            started: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Adds a voice to the mixer and returns its handle.
    pub fn add_voice(&self, voice: Voice) -> PlaybackHandle {
        let handle = voice.handle.clone();
        self.voices.lock().push(voice);
        self.started.fetch_add(1, Ordering::Relaxed);
        handle
    }

    /// Mixes the active voices into the interleaved output buffer, replacing its
    /// contents. Voices that run out are completed and dropped; stopped voices are
    /// dropped without being mixed.
    pub fn process_into(&self, output: &mut [f32]) {
        output.fill(0.0);
        let num_channels = self.num_channels as usize;
        let frames = output.len() / num_channels;

        let mut voices = self.voices.lock();
        voices.retain_mut(|voice| {
            if voice.handle.is_finished() {
                return false;
            }
            voice.mix_into(output, num_channels, frames);
            if voice.remaining() == 0 {
                voice.handle.complete();
                return false;
            }
            true
        });
    }

    /// Processes multiple frames of audio mixing
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0f32; num_frames * self.num_channels as usize];
        self.process_into(&mut frames);
        frames
    }

    /// Stops every active voice.
    pub fn stop_all(&self) {
        for voice in self.voices.lock().drain(..) {
            voice.handle.stop();
        }
    }

    /// Number of voices still playing.
    pub fn active_count(&self) -> usize {
        self.voices.lock().len()
    }

    /// Number of voices added since the mixer was created.
    pub fn started_count(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The frame ranges and gains of the active voices.
    #[cfg(test)]
    pub fn voice_windows(&self) -> Vec<(usize, usize, f32)> {
        self.voices
            .lock()
            .iter()
            .map(|voice| (voice.position, voice.end, voice.gain))
            .collect()
    }
}
