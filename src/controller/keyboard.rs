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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const DOWN: &str = "down";
const UP: &str = "up";
const MESSAGE: &str = "message";
const SUSPEND: &str = "suspend";
const RESUME: &str = "resume";
const RELOAD: &str = "reload";
const SELECT: &str = "select";
const REMOVE: &str = "remove";
const LIST: &str = "list";
const QUIT: &str = "quit";

/// What a line of input asks for.
#[derive(Debug, PartialEq)]
enum Input {
    Events(Vec<Event>),
    Quit,
    Unrecognized,
}

/// A driver that reads key transitions and commands from stdin, one per line.
/// A bare key token is a full press, a down followed by an up.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    fn parse(line: &str) -> Input {
        let words: Vec<&str> = line.split_whitespace().collect();
        let events = match words.as_slice() {
            [] => vec![],
            [command, token] if command.eq_ignore_ascii_case(DOWN) => {
                vec![Event::KeyDown(token.to_string())]
            }
            [command, token] if command.eq_ignore_ascii_case(UP) => {
                vec![Event::KeyUp(token.to_string())]
            }
            [command, id] if command.eq_ignore_ascii_case(SELECT) => {
                vec![Event::Select(id.to_string())]
            }
            [command, id] if command.eq_ignore_ascii_case(REMOVE) => {
                vec![Event::Remove(id.to_string())]
            }
            [command] => match command.to_lowercase().as_str() {
                MESSAGE => vec![Event::SendMessage],
                SUSPEND => vec![Event::Suspend],
                RESUME => vec![Event::Resume],
                RELOAD => vec![Event::Reload],
                LIST => vec![Event::List],
                QUIT => return Input::Quit,
                DOWN | UP | SELECT | REMOVE => return Input::Unrecognized,
                _ => vec![
                    Event::KeyDown(command.to_string()),
                    Event::KeyUp(command.to_string()),
                ],
            },
            _ => return Input::Unrecognized,
        };
        Input::Events(events)
    }

    /// Reads and dispatches one line. Returns false once input is exhausted.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "> ")?;
        writer.flush()?;
        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match Self::parse(&input) {
            Input::Events(events) => {
                for event in events {
                    events_tx
                        .blocking_send(event)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                }
                Ok(true)
            }
            Input::Quit => Ok(false),
            Input::Unrecognized => {
                warn!(input = input.trim(), "Unrecognized input");
                Ok(true)
            }
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}

            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
