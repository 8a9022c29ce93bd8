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

//! MechVibes sound pack handling.
//!
//! This module provides:
//! - Parsing of sound pack configuration files into typed timing tables
//! - Translation of platform key codes to sound pack key ids
//! - The shared selection of the active pack
//! - Decoded audio caching with re-decoding from retained sources

pub mod cache;
pub mod keymap;
pub mod parser;
pub mod selection;

use std::collections::BTreeMap;

pub use cache::{AudioBufferCache, CacheError, DecodedAudioAsset, SourceLocator};
pub use parser::{parse, KeyDefineType, KeySlice, ParseError, SoundPackConfig};
pub use selection::ActiveSoundPackSelection;

/// The registered sound packs: their configurations and their audio.
#[derive(Debug)]
pub struct SoundPacks {
    configs: BTreeMap<String, SoundPackConfig>,
    cache: AudioBufferCache,
}

impl SoundPacks {
    pub fn new(cache: AudioBufferCache) -> SoundPacks {
        SoundPacks {
            configs: BTreeMap::new(),
            cache,
        }
    }

    /// Gets the configuration of a pack.
    pub fn config(&self, id: &str) -> Option<&SoundPackConfig> {
        self.configs.get(id)
    }

    /// All configurations, ordered by id.
    pub fn configs(&self) -> impl Iterator<Item = &SoundPackConfig> {
        self.configs.values()
    }

    /// Registers a configuration, replacing any with the same id.
    pub fn insert_config(&mut self, config: SoundPackConfig) -> Option<SoundPackConfig> {
        self.configs.insert(config.id().to_string(), config)
    }

    /// Removes a pack's configuration and audio.
    pub fn remove(&mut self, id: &str) -> Option<SoundPackConfig> {
        self.cache.remove(id);
        self.configs.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.configs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn cache(&self) -> &AudioBufferCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut AudioBufferCache {
        &mut self.cache
    }
}
