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
//! Polling helpers for asserting on work that finishes on another thread.

use std::{
    future::Future,
    thread,
    time::{Duration, Instant},
};

const TIMEOUT: Duration = Duration::from_secs(5);
const FIRST_TICK: Duration = Duration::from_millis(5);
const MAX_TICK: Duration = Duration::from_millis(50);

/// Backoff between polls, doubling up to a ceiling.
struct Poll {
    deadline: Instant,
    tick: Duration,
}

impl Poll {
    fn new() -> Poll {
        Poll {
            deadline: Instant::now() + TIMEOUT,
            tick: FIRST_TICK,
        }
    }

    /// The next sleep, or None once the deadline has passed.
    fn next_tick(&mut self) -> Option<Duration> {
        if Instant::now() > self.deadline {
            return None;
        }
        let tick = self.tick;
        self.tick = (self.tick * 2).min(MAX_TICK);
        Some(tick)
    }
}

/// Waits for the predicate to return true, panicking with the message if it
/// never does.
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let mut poll = Poll::new();
    while !predicate() {
        match poll.next_tick() {
            Some(tick) => thread::sleep(tick),
            None => panic!("{}", error_msg),
        }
    }
}

/// Like [`eventually`], for predicates that need to await.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut poll = Poll::new();
    while !predicate().await {
        match poll.next_tick() {
            Some(tick) => tokio::time::sleep(tick).await,
            None => panic!("{}", error_msg),
        }
    }
}
