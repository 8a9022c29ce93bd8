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
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::selection::ActiveSoundPackSelection;
use crate::audio::{AudioContextManager, DecodeError, DecodedAudio};

/// Errors produced by the audio buffer cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("audio for sound pack '{0}' is no longer available")]
    Unavailable(String),
}

#[derive(Debug)]
enum Source {
    Bytes {
        bytes: Arc<[u8]>,
        hint: Option<String>,
    },
    File {
        path: PathBuf,
        /// Owned files are deleted when the locator is revoked.
        owned: bool,
    },
}

/// Where the undecoded audio of a sound pack can be fetched again.
#[derive(Clone, Debug)]
pub struct SourceLocator {
    source: Arc<Source>,
    revoked: Arc<AtomicBool>,
}

impl SourceLocator {
    fn new(source: Source) -> SourceLocator {
        SourceLocator {
            source: Arc::new(source),
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Audio retained in memory. The hint is a file extension.
    pub fn bytes(bytes: impl Into<Arc<[u8]>>, hint: Option<&str>) -> SourceLocator {
        SourceLocator::new(Source::Bytes {
            bytes: bytes.into(),
            hint: hint.map(str::to_string),
        })
    }

    /// Audio in a file the cache doesn't own.
    pub fn file(path: impl Into<PathBuf>) -> SourceLocator {
        SourceLocator::new(Source::File {
            path: path.into(),
            owned: false,
        })
    }

    /// Audio in a file that is deleted when the locator is revoked.
    pub fn owned_file(path: impl Into<PathBuf>) -> SourceLocator {
        SourceLocator::new(Source::File {
            path: path.into(),
            owned: true,
        })
    }

    /// The file path, for file locators.
    pub fn path(&self) -> Option<&Path> {
        match self.source.as_ref() {
            Source::File { path, .. } => Some(path),
            Source::Bytes { .. } => None,
        }
    }

    /// A format hint for the decoder.
    pub fn hint(&self) -> Option<&str> {
        match self.source.as_ref() {
            Source::Bytes { hint, .. } => hint.as_deref(),
            Source::File { path, .. } => path.extension().and_then(|ext| ext.to_str()),
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    /// Returns true if both locators refer to the same retained source. Two
    /// file locators for one path are the same source, so replacing one with
    /// the other never deletes the file.
    pub fn same_as(&self, other: &SourceLocator) -> bool {
        if Arc::ptr_eq(&self.source, &other.source) {
            return true;
        }
        match (self.path(), other.path()) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => false,
        }
    }

    /// Fetches the undecoded bytes. Returns None once revoked.
    pub fn fetch(&self) -> Option<Result<Arc<[u8]>, DecodeError>> {
        if self.is_revoked() {
            return None;
        }
        Some(match self.source.as_ref() {
            Source::Bytes { bytes, .. } => Ok(bytes.clone()),
            Source::File { path, .. } => fs::read(path).map(Arc::from).map_err(DecodeError::Io),
        })
    }

    /// Makes the locator unusable. Owned files are deleted.
    pub fn revoke(&self) {
        if self.revoked.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Source::File { path, owned: true } = self.source.as_ref() {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = ?path, "Removed owned audio file"),
                Err(e) => warn!(path = ?path, err = %e, "Unable to remove owned audio file"),
            }
        }
    }
}

/// A decoded sound pack buffer. Shares its id with the sound pack configuration.
#[derive(Clone, Debug)]
pub struct DecodedAudioAsset {
    id: String,
    audio: DecodedAudio,
}

impl DecodedAudioAsset {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    /// Total duration of the buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }
}

struct Entry {
    /// None when evicted.
    asset: Option<DecodedAudioAsset>,
    locator: Option<SourceLocator>,
}

/// Owns the decoded buffers of every sound pack and the locators they can be
/// decoded again from.
pub struct AudioBufferCache {
    context: AudioContextManager,
    selection: ActiveSoundPackSelection,
    entries: HashMap<String, Entry>,
}

impl AudioBufferCache {
    /// Creates an empty cache. Audio is decoded through the given context.
    pub fn new(
        context: AudioContextManager,
        selection: ActiveSoundPackSelection,
    ) -> AudioBufferCache {
        AudioBufferCache {
            context,
            selection,
            entries: HashMap::new(),
        }
    }

    fn decode(&self, id: &str, locator: &SourceLocator) -> Result<DecodedAudioAsset, CacheError> {
        let bytes = locator
            .fetch()
            .ok_or_else(|| CacheError::Unavailable(id.to_string()))??;
        let audio = self.context.decode(bytes, locator.hint())?;
        Ok(DecodedAudioAsset {
            id: id.to_string(),
            audio,
        })
    }

    /// Decodes the audio and registers it under the id, replacing any previous
    /// buffer. On failure the previous entry is left as it was.
    pub fn store(
        &mut self,
        id: &str,
        locator: SourceLocator,
    ) -> Result<DecodedAudioAsset, CacheError> {
        let asset = self.decode(id, &locator)?;

        let previous = self.entries.insert(
            id.to_string(),
            Entry {
                asset: Some(asset.clone()),
                locator: Some(locator.clone()),
            },
        );
        if let Some(previous) = previous.and_then(|entry| entry.locator) {
            if !previous.same_as(&locator) {
                previous.revoke();
            }
        }

        info!(
            id,
            duration_ms = asset.audio().duration().as_millis(),
            "Sound pack audio stored"
        );
        Ok(asset)
    }

    /// Gets the decoded buffer if it is present.
    pub fn get(&self, id: &str) -> Option<DecodedAudioAsset> {
        self.entries.get(id).and_then(|entry| entry.asset.clone())
    }

    /// Gets the decoded buffer, decoding it again from its locator if it was evicted.
    pub fn ensure_decoded(&mut self, id: &str) -> Result<DecodedAudioAsset, CacheError> {
        let locator = match self.entries.get(id) {
            Some(Entry {
                asset: Some(asset), ..
            }) => return Ok(asset.clone()),
            Some(Entry {
                asset: None,
                locator: Some(locator),
            }) => locator.clone(),
            _ => return Err(CacheError::Unavailable(id.to_string())),
        };

        debug!(id, "Decoding evicted sound pack audio");
        let asset = self.decode(id, &locator)?;
        if let Some(entry) = self.entries.get_mut(id) {
            entry.asset = Some(asset.clone());
        }
        Ok(asset)
    }

    /// Releases the buffer and revokes the locator. Clears the selection if it
    /// pointed at the id.
    pub fn remove(&mut self, id: &str) -> bool {
        let removed = match self.entries.remove(id) {
            Some(entry) => {
                if let Some(locator) = entry.locator {
                    locator.revoke();
                }
                true
            }
            None => false,
        };
        if self.selection.clear_if(id) {
            debug!(id, "Cleared selection of removed sound pack");
        }
        removed
    }

    /// Drops the decoded buffer but keeps the locator.
    pub fn evict(&mut self, id: &str) -> bool {
        self.entries
            .get_mut(id)
            .map(|entry| entry.asset.take().is_some())
            .unwrap_or(false)
    }

    /// Drops every decoded buffer. Returns how many were dropped.
    pub fn evict_all(&mut self) -> usize {
        self.entries
            .values_mut()
            .filter_map(|entry| entry.asset.take())
            .count()
    }

    /// Registers a locator without decoding it, as after a restart.
    pub fn register_evicted(&mut self, id: &str, locator: SourceLocator) {
        let previous = self.entries.insert(
            id.to_string(),
            Entry {
                asset: None,
                locator: Some(locator.clone()),
            },
        );
        if let Some(previous) = previous.and_then(|entry| entry.locator) {
            if !previous.same_as(&locator) {
                previous.revoke();
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Ids of every entry, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of entries whose buffer isn't decoded, sorted.
    pub fn evicted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.asset.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// The locator of an entry.
    pub fn locator(&self, id: &str) -> Option<SourceLocator> {
        self.entries.get(id).and_then(|entry| entry.locator.clone())
    }

    /// Bytes held by decoded buffers.
    pub fn memory_usage(&self) -> usize {
        self.entries
            .values()
            .filter_map(|entry| entry.asset.as_ref())
            .map(|asset| asset.audio.memory_size())
            .sum()
    }
}

impl std::fmt::Debug for AudioBufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBufferCache")
            .field("entries", &self.entries.len())
            .field("total_memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock;
    use crate::events::Observers;
    use crate::testutil::audio::{wav_bytes, write_wav};

    fn cache() -> (AudioBufferCache, ActiveSoundPackSelection) {
        let device = mock::Device::manual("mock", 44100, 2);
        let context = AudioContextManager::new(Arc::new(device), Observers::new());
        let selection = ActiveSoundPackSelection::new();
        (AudioBufferCache::new(context, selection.clone()), selection)
    }

    fn wav(seconds: usize) -> SourceLocator {
        SourceLocator::bytes(wav_bytes(44100, 1, 44100 * seconds), Some("wav"))
    }

    #[test]
    fn test_store_get_remove() {
        let (mut cache, selection) = cache();
        assert!(cache.get("p1").is_none());

        let asset = cache.store("p1", wav(2)).unwrap();
        assert_eq!(asset.id(), "p1");
        assert!((asset.duration_secs() - 2.0).abs() < 1e-6);
        assert!(cache.get("p1").is_some());
        assert_eq!(cache.memory_usage(), 44100 * 2 * 4);

        selection.select("p1");
        assert!(cache.remove("p1"));
        assert!(cache.get("p1").is_none());
        assert_eq!(selection.get(), None);
        assert!(!cache.remove("p1"));
    }

    #[test]
    fn test_remove_keeps_other_selection() {
        let (mut cache, selection) = cache();
        cache.store("p1", wav(1)).unwrap();
        cache.store("p2", wav(1)).unwrap();
        selection.select("p2");

        cache.remove("p1");
        assert_eq!(selection.get(), Some("p2".to_string()));
        assert_eq!(cache.ids(), vec!["p2".to_string()]);
    }

    #[test]
    fn test_store_replaces_previous() {
        let (mut cache, _) = cache();
        let first = wav(1);
        cache.store("p1", first.clone()).unwrap();
        let asset = cache.store("p1", wav(2)).unwrap();

        assert!(first.is_revoked());
        assert_eq!(cache.ids().len(), 1);
        assert!((cache.get("p1").unwrap().duration_secs() - asset.duration_secs()).abs() < 1e-9);
        assert!((asset.duration_secs() - 2.0).abs() < 1e-6);

        // Storing the same locator again doesn't revoke it.
        let locator = cache.locator("p1").unwrap();
        cache.store("p1", locator.clone()).unwrap();
        assert!(!locator.is_revoked());
    }

    #[test]
    fn test_register_evicted_keeps_file_at_same_path() {
        let (mut cache, _) = cache();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p1.wav");
        write_wav(&path, 44100, 1, 44100).unwrap();

        let first = SourceLocator::owned_file(&path);
        cache.store("p1", first.clone()).unwrap();
        cache.register_evicted("p1", SourceLocator::owned_file(&path));
        assert!(!first.is_revoked());
        assert!(path.exists());
        assert!(cache.ensure_decoded("p1").is_ok());

        // A different path still replaces and deletes the old file.
        let other = dir.path().join("p1-new.wav");
        write_wav(&other, 44100, 1, 44100).unwrap();
        let current = cache.locator("p1").unwrap();
        cache.register_evicted("p1", SourceLocator::owned_file(&other));
        assert!(current.is_revoked());
        assert!(!path.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_failed_store_leaves_entry() {
        let (mut cache, _) = cache();
        let original = wav(1);
        cache.store("p1", original.clone()).unwrap();

        let garbage = SourceLocator::bytes(&b"not audio at all"[..], Some("ogg"));
        assert!(matches!(
            cache.store("p1", garbage),
            Err(CacheError::Decode(_))
        ));
        assert!(cache.get("p1").is_some());
        assert!(!original.is_revoked());
        assert!(cache.locator("p1").unwrap().same_as(&original));
    }

    #[test]
    fn test_ensure_decoded_after_evict() {
        let (mut cache, _) = cache();
        cache.store("p1", wav(1)).unwrap();
        cache.store("p2", wav(1)).unwrap();

        assert!(cache.evict("p1"));
        assert!(!cache.evict("p1"));
        assert!(cache.get("p1").is_none());
        assert_eq!(cache.evicted_ids(), vec!["p1".to_string()]);

        let asset = cache.ensure_decoded("p1").unwrap();
        assert!((asset.duration_secs() - 1.0).abs() < 1e-6);
        assert!(cache.get("p1").is_some());

        assert_eq!(cache.evict_all(), 2);
        assert_eq!(cache.memory_usage(), 0);
        assert!(cache.ensure_decoded("p2").is_ok());
    }

    #[test]
    fn test_ensure_decoded_unavailable() {
        let (mut cache, _) = cache();
        assert!(matches!(
            cache.ensure_decoded("missing"),
            Err(CacheError::Unavailable(_))
        ));

        let locator = wav(1);
        cache.store("p1", locator.clone()).unwrap();
        cache.evict("p1");
        locator.revoke();
        assert!(matches!(
            cache.ensure_decoded("p1"),
            Err(CacheError::Unavailable(_))
        ));
    }

    #[test]
    fn test_owned_files() {
        let (mut cache, _) = cache();
        let dir = tempfile::tempdir().unwrap();
        let owned = dir.path().join("owned.wav");
        let borrowed = dir.path().join("borrowed.wav");
        write_wav(&owned, 44100, 1, 4410).unwrap();
        write_wav(&borrowed, 44100, 1, 4410).unwrap();

        cache.register_evicted("p1", SourceLocator::owned_file(&owned));
        cache.register_evicted("p2", SourceLocator::file(&borrowed));
        assert!(cache.ensure_decoded("p1").is_ok());
        assert!(cache.ensure_decoded("p2").is_ok());

        cache.remove("p1");
        cache.remove("p2");
        assert!(!owned.exists());
        assert!(borrowed.exists());
    }

    #[test]
    fn test_missing_file() {
        let (mut cache, _) = cache();
        let dir = tempfile::tempdir().unwrap();
        cache.register_evicted("p1", SourceLocator::file(dir.path().join("gone.ogg")));
        assert!(matches!(
            cache.ensure_decoded("p1"),
            Err(CacheError::Decode(DecodeError::Io(_)))
        ));
    }
}
