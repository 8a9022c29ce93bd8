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
    error::Error,
    fmt,
    sync::{Arc, Weak},
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use super::mixer::AudioMixer;

#[derive(Default)]
struct State {
    mixer: Option<AudioMixer>,
    suspended: bool,
    closed: bool,
    open_count: usize,
    suspend_count: usize,
    resume_count: usize,
    /// While set, resume blocks until released.
    hold_resume: bool,
    fail_open: bool,
    fail_resume: bool,
    /// Bumped on every open. The playback clock of an older open exits.
    generation: u64,
}

/// How often the playback clock pulls frames from the mixer.
const CLOCK_TICK: Duration = Duration::from_millis(10);

/// A mock device. Doesn't actually play anything. By default a clock thread
/// pulls and discards frames in real time while the device is running, so
/// voices finish like they would on a real output. Manual devices leave the
/// mixer alone and tests pull frames from it directly.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    channels: u16,
    clocked: bool,
    state: Arc<Mutex<State>>,
    released: Arc<Condvar>,
}

impl Device {
    /// Gets the given mock device, played in real time.
    pub fn get(name: &str, sample_rate: u32, channels: u16) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            channels,
            clocked: true,
            state: Arc::new(Mutex::new(State::default())),
            released: Arc::new(Condvar::new()),
        }
    }

    /// Gets a mock device whose mixer is only advanced by the caller.
    pub fn manual(name: &str, sample_rate: u32, channels: u16) -> Device {
        Device {
            clocked: false,
            ..Device::get(name, sample_rate, channels)
        }
    }

    /// Pulls frames from the mixer at the output rate until the device is
    /// closed, reopened, or dropped. Nothing is pulled while suspended.
    fn spawn_clock(&self, generation: u64) {
        let state: Weak<Mutex<State>> = Arc::downgrade(&self.state);
        let sample_rate = self.sample_rate as f64;
        let name = self.name.clone();
        thread::spawn(move || {
            let mut last = Instant::now();
            let mut buffer: Vec<f32> = Vec::new();
            loop {
                thread::sleep(CLOCK_TICK);
                let Some(state) = state.upgrade() else {
                    break;
                };
                let now = Instant::now();
                let elapsed = now.duration_since(last);
                last = now;

                let mixer = {
                    let state = state.lock();
                    if state.closed || state.generation != generation {
                        break;
                    }
                    if state.suspended {
                        continue;
                    }
                    match &state.mixer {
                        Some(mixer) => mixer.clone(),
                        None => break,
                    }
                };

                let frames = (elapsed.as_secs_f64() * sample_rate).round() as usize;
                buffer.resize(frames * mixer.num_channels() as usize, 0.0);
                mixer.process_into(&mut buffer);
            }
            debug!(device = name, "Mock playback clock stopped.");
        });
    }

    /// The mixer the device was opened with.
    pub fn mixer(&self) -> Option<AudioMixer> {
        self.state.lock().mixer.clone()
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    pub fn suspend_count(&self) -> usize {
        self.state.lock().suspend_count
    }

    pub fn resume_count(&self) -> usize {
        self.state.lock().resume_count
    }

    /// Makes subsequent resumes block until `release_resume` is called.
    pub fn hold_resume(&self) {
        self.state.lock().hold_resume = true;
    }

    /// Releases any blocked resumes.
    pub fn release_resume(&self) {
        self.state.lock().hold_resume = false;
        self.released.notify_all();
    }

    /// Makes the next open fail.
    pub fn fail_open(&self) {
        self.state.lock().fail_open = true;
    }

    /// Makes resumes fail.
    pub fn fail_resume(&self) {
        self.state.lock().fail_resume = true;
    }
}

impl super::Device for Device {
    fn open(&self, mixer: AudioMixer) -> Result<(), Box<dyn Error>> {
        let mut state = self.state.lock();
        if state.fail_open {
            state.fail_open = false;
            return Err(format!("mock device {} failed to open", self.name).into());
        }
        info!(device = self.name, "Opening mock output.");
        state.mixer = Some(mixer);
        state.open_count += 1;
        state.suspended = false;
        state.closed = false;
        state.generation += 1;
        if self.clocked {
            self.spawn_clock(state.generation);
        }
        Ok(())
    }

    fn suspend(&self) -> Result<(), Box<dyn Error>> {
        let mut state = self.state.lock();
        state.suspended = true;
        state.suspend_count += 1;
        Ok(())
    }

    fn resume(&self) -> Result<(), Box<dyn Error>> {
        let mut state = self.state.lock();
        state.resume_count += 1;
        while state.hold_resume {
            self.released.wait(&mut state);
        }
        if state.fail_resume {
            return Err(format!("mock device {} failed to resume", self.name).into());
        }
        state.suspended = false;
        Ok(())
    }

    fn close(&self) -> Result<(), Box<dyn Error>> {
        let mut state = self.state.lock();
        state.closed = true;
        state.mixer = None;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
