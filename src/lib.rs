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
//! A mechanical keyboard sound engine for MechVibes sound packs.
//!
//! A sound pack is a JSON configuration mapping key ids to slices of a single
//! audio file. The [`player::Player`] decodes packs into memory, keeps track of
//! the active one, and plays the slice for each key press through an audio
//! output shared by every voice.

pub mod audio;
pub mod config;
pub mod controller;
pub mod engine;
pub mod events;
pub mod player;
pub mod playsync;
pub mod soundpack;
#[cfg(test)]
pub mod testutil;
