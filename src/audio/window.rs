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

/// Length of the slice played when a key's timing can't be used.
pub const DEFAULT_SLICE_SECS: f64 = 0.1;

/// The portion of a decoded buffer a single playback covers, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackWindow {
    start_secs: f64,
    duration_secs: f64,
}

impl PlaybackWindow {
    /// Computes the window for a key slice against a buffer of the given length.
    ///
    /// The slice is clamped so it never runs past the end of the buffer. A slice
    /// that starts outside the buffer, or that has nothing left after clamping,
    /// plays the default slice from the start of the buffer instead.
    pub fn for_slice(start_ms: f64, duration_ms: f64, buffer_duration_secs: f64) -> PlaybackWindow {
        let start = start_ms / 1000.0;
        let duration = duration_ms / 1000.0;

        if start.is_finite() && duration.is_finite() && start >= 0.0 && start < buffer_duration_secs
        {
            let clamped = duration.min(buffer_duration_secs - start);
            if clamped > 0.0 {
                return PlaybackWindow {
                    start_secs: start,
                    duration_secs: clamped,
                };
            }
        }

        PlaybackWindow::fallback(buffer_duration_secs)
    }

    /// The default slice: the first 100ms of the buffer, or less for shorter buffers.
    pub fn fallback(buffer_duration_secs: f64) -> PlaybackWindow {
        PlaybackWindow {
            start_secs: 0.0,
            duration_secs: DEFAULT_SLICE_SECS.min(buffer_duration_secs.max(0.0)),
        }
    }

    /// The whole buffer.
    pub fn whole(buffer_duration_secs: f64) -> PlaybackWindow {
        PlaybackWindow {
            start_secs: 0.0,
            duration_secs: buffer_duration_secs.max(0.0),
        }
    }

    pub fn start_secs(&self) -> f64 {
        self.start_secs
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Converts the window into a `[start, end)` frame range at the given rate.
    pub fn frame_range(&self, sample_rate: u32, total_frames: usize) -> (usize, usize) {
        let start = ((self.start_secs * sample_rate as f64).round() as usize).min(total_frames);
        let end = (((self.start_secs + self.duration_secs) * sample_rate as f64).round() as usize)
            .clamp(start, total_frames);
        (start, end)
    }
}
