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
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

/// A value that is settled once and can be waited on from other threads.
#[derive(Clone, Debug)]
pub struct Settle<T: Copy> {
    /// The settled value, if any.
    value: Arc<Mutex<Option<T>>>,
    /// The condvar will handle notification of settling.
    condvar: Arc<Condvar>,
}

impl<T: Copy> Default for Settle<T> {
    fn default() -> Self {
        Settle {
            value: Arc::new(Mutex::new(None)),
            condvar: Arc::new(Condvar::new()),
        }
    }
}

impl<T: Copy> Settle<T> {
    /// Creates a new unsettled value.
    pub fn new() -> Settle<T> {
        Settle::default()
    }

    /// Settles the value. Only the first call has an effect; returns true if
    /// this call settled it.
    pub fn settle(&self, value: T) -> bool {
        let mut current = self.value.lock();
        if current.is_some() {
            return false;
        }
        *current = Some(value);
        self.condvar.notify_all();
        true
    }

    /// Gets the settled value without waiting.
    pub fn get(&self) -> Option<T> {
        *self.value.lock()
    }

    /// Waits up to the timeout for the value to settle.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut value = self.value.lock();
        while value.is_none() {
            if self.condvar.wait_until(&mut value, deadline).timed_out() {
                break;
            }
        }
        *value
    }

    /// Waits for the value to settle.
    pub fn wait(&self) -> T {
        let mut value = self.value.lock();
        loop {
            if let Some(value) = *value {
                return value;
            }
            self.condvar.wait(&mut value);
        }
    }
}

/// Settles with true once a resume request completes, or false if it failed.
pub type ResumeSignal = Settle<bool>;

/// How a playback instance ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackEnd {
    Completed,
    Stopped,
}

static NEXT_PLAYBACK_ID: AtomicU64 = AtomicU64::new(1);

/// A handle to one playback instance. The mixer completes it when the voice
/// runs out; anyone holding it may stop it early.
#[derive(Clone, Debug)]
pub struct PlaybackHandle {
    id: u64,
    end: Settle<PlaybackEnd>,
}

impl Default for PlaybackHandle {
    fn default() -> Self {
        PlaybackHandle::new()
    }
}

impl PlaybackHandle {
    pub fn new() -> PlaybackHandle {
        PlaybackHandle {
            id: NEXT_PLAYBACK_ID.fetch_add(1, Ordering::Relaxed),
            end: Settle::new(),
        }
    }

    /// Unique id of this playback instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops the playback.
    pub fn stop(&self) {
        self.end.settle(PlaybackEnd::Stopped);
    }

    pub(crate) fn complete(&self) {
        self.end.settle(PlaybackEnd::Completed);
    }

    pub fn is_finished(&self) -> bool {
        self.end.get().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.end.get() == Some(PlaybackEnd::Stopped)
    }

    /// Waits up to the timeout for the playback to end.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PlaybackEnd> {
        self.end.wait_timeout(timeout)
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_settle_first_wins() {
        let signal = ResumeSignal::new();
        assert_eq!(signal.get(), None);

        let join = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait())
        };

        assert!(signal.settle(true));
        assert!(!signal.settle(false));
        assert!(join.join().unwrap());
        assert_eq!(signal.get(), Some(true));
    }

    #[test]
    fn test_settle_wait_timeout() {
        let signal = ResumeSignal::new();
        let start = Instant::now();
        assert_eq!(signal.wait_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));

        signal.settle(false);
        assert_eq!(signal.wait_timeout(Duration::from_secs(5)), Some(false));
    }

    #[test]
    fn test_playback_handle() {
        let first = PlaybackHandle::new();
        let second = PlaybackHandle::new();
        assert_ne!(first.id(), second.id());

        assert!(!first.is_finished());
        first.stop();
        first.complete();
        assert!(first.is_finished());
        assert!(first.is_stopped());

        second.complete();
        second.stop();
        assert!(!second.is_stopped());
        assert_eq!(
            second.wait_timeout(Duration::from_millis(1)),
            Some(PlaybackEnd::Completed)
        );
    }
}
