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

//! Parsing of MechVibes sound pack configuration files.
//!
//! A configuration maps MechVibes key ids to `[start_ms, duration_ms]` slices of
//! a single audio file. Entries that don't describe a usable slice are dropped
//! rather than failing the whole pack.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Suffix MechVibes uses for key release variants (e.g. `30-up`).
pub const RELEASE_SUFFIX: &str = "-up";

/// Errors produced while parsing a sound pack configuration.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed sound pack configuration: {0}")]
    MalformedJson(String),

    #[error("sound pack configuration is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("sound pack configuration has no valid key timings ({dropped} entries dropped)")]
    InvalidTiming { dropped: usize },
}

/// How the pack defines its sounds.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyDefineType {
    /// One audio file, sliced per key.
    #[default]
    #[serde(rename = "single", alias = "single-key")]
    Single,
    /// One file per key in the original MechVibes format.
    #[serde(rename = "multi", alias = "multi-key")]
    Multi,
}

/// A slice of the pack's audio file, in milliseconds.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct KeySlice {
    start_ms: f64,
    duration_ms: f64,
}

impl KeySlice {
    /// Creates a slice if it satisfies `start_ms >= 0` and `duration_ms > 0`.
    pub fn new(start_ms: f64, duration_ms: f64) -> Option<KeySlice> {
        if start_ms.is_finite() && duration_ms.is_finite() && start_ms >= 0.0 && duration_ms > 0.0
        {
            Some(KeySlice {
                start_ms,
                duration_ms,
            })
        } else {
            None
        }
    }

    /// Start offset in milliseconds.
    pub fn start_ms(&self) -> f64 {
        self.start_ms
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }
}

impl TryFrom<[f64; 2]> for KeySlice {
    type Error = String;

    fn try_from(value: [f64; 2]) -> Result<Self, Self::Error> {
        KeySlice::new(value[0], value[1])
            .ok_or_else(|| format!("invalid key timing [{}, {}]", value[0], value[1]))
    }
}

impl From<KeySlice> for [f64; 2] {
    fn from(slice: KeySlice) -> Self {
        [slice.start_ms, slice.duration_ms]
    }
}

/// A parsed sound pack configuration.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SoundPackConfig {
    id: String,
    name: String,
    #[serde(default)]
    key_define_type: KeyDefineType,
    #[serde(default)]
    includes_numpad: bool,
    #[serde(default)]
    sound: String,
    defines: BTreeMap<String, KeySlice>,
}

impl SoundPackConfig {
    /// The unique pack id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_define_type(&self) -> KeyDefineType {
        self.key_define_type
    }

    /// Whether the pack has dedicated numpad sounds.
    pub fn includes_numpad(&self) -> bool {
        self.includes_numpad
    }

    /// The audio file name the pack was authored against.
    pub fn sound(&self) -> &str {
        &self.sound
    }

    /// All valid key timings.
    pub fn defines(&self) -> &BTreeMap<String, KeySlice> {
        &self.defines
    }

    /// Gets the slice for the given key id.
    pub fn slice(&self, key_id: &str) -> Option<KeySlice> {
        self.defines.get(key_id).copied()
    }

    /// Gets the release slice (`<key_id>-up`) for the given key id.
    pub fn release_slice(&self, key_id: &str) -> Option<KeySlice> {
        self.defines
            .get(&format!("{}{}", key_id, RELEASE_SUFFIX))
            .copied()
    }

    /// Key ids that play on key down, i.e. everything except release variants.
    pub fn press_keys(&self) -> Vec<&str> {
        self.defines
            .keys()
            .map(String::as_str)
            .filter(|key| !is_release_key(key))
            .collect()
    }
}

#[cfg(test)]
impl SoundPackConfig {
    /// Creates a config directly from timings (test only).
    pub fn new(id: &str, name: &str, defines: &[(&str, f64, f64)]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            key_define_type: KeyDefineType::Single,
            includes_numpad: false,
            sound: "sound.ogg".to_string(),
            defines: defines
                .iter()
                .filter_map(|(key, start, duration)| {
                    KeySlice::new(*start, *duration).map(|slice| (key.to_string(), slice))
                })
                .collect(),
        }
    }
}

/// Returns true if the key id names a release variant.
pub fn is_release_key(key_id: &str) -> bool {
    key_id.ends_with(RELEASE_SUFFIX)
}

/// Parses a sound pack configuration from JSON text.
pub fn parse(text: &str) -> Result<SoundPackConfig, ParseError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ParseError::MalformedJson(
            "top level value is not an object".to_string(),
        ));
    };

    let id = required_string(&object, "id")?;
    let name = required_string(&object, "name")?;
    let entries = match object.get("defines") {
        Some(Value::Object(entries)) => entries,
        _ => return Err(ParseError::MissingField("defines")),
    };

    let key_define_type = match object.get("key_define_type").and_then(Value::as_str) {
        Some("multi") | Some("multi-key") => KeyDefineType::Multi,
        _ => KeyDefineType::Single,
    };
    let includes_numpad = object
        .get("includes_numpad")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let sound = object
        .get("sound")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut defines = BTreeMap::new();
    let mut dropped = 0;
    for (key, entry) in entries {
        match parse_timing(entry) {
            Some(slice) => {
                defines.insert(key.clone(), slice);
            }
            None => {
                dropped += 1;
                debug!(key, entry = %entry, "Dropping invalid key timing");
            }
        }
    }

    if defines.is_empty() {
        return Err(ParseError::InvalidTiming { dropped });
    }

    debug!(
        id,
        keys = defines.len(),
        dropped,
        "Sound pack configuration parsed"
    );

    Ok(SoundPackConfig {
        id,
        name,
        key_define_type,
        includes_numpad,
        sound,
        defines,
    })
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String, ParseError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ParseError::MissingField(field))
}

fn parse_timing(entry: &Value) -> Option<KeySlice> {
    match entry.as_array()?.as_slice() {
        [start, duration] => KeySlice::new(start.as_f64()?, duration.as_f64()?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACK: &str = r#"{
        "id": "sound-pack-1200000000001",
        "name": "CherryMX Black - ABS keycaps",
        "key_define_type": "single",
        "includes_numpad": false,
        "sound": "sound.ogg",
        "defines": {
            "1": [2894, 226],
            "2": [3514, 228],
            "16": [1000, 200],
            "16-up": [1300, 90]
        }
    }"#;

    #[test]
    fn test_parse_valid_pack() {
        let config = parse(PACK).unwrap();

        assert_eq!(config.id(), "sound-pack-1200000000001");
        assert_eq!(config.name(), "CherryMX Black - ABS keycaps");
        assert_eq!(config.key_define_type(), KeyDefineType::Single);
        assert!(!config.includes_numpad());
        assert_eq!(config.sound(), "sound.ogg");
        assert_eq!(config.defines().len(), 4);

        let slice = config.slice("16").unwrap();
        assert_eq!(slice.start_ms(), 1000.0);
        assert_eq!(slice.duration_ms(), 200.0);
        assert_eq!(config.release_slice("16").unwrap().start_ms(), 1300.0);
        assert!(config.release_slice("1").is_none());
    }

    #[test]
    fn test_press_keys_exclude_release_variants() {
        let config = parse(PACK).unwrap();
        assert_eq!(config.press_keys(), vec!["1", "16", "2"]);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse("{ \"id\": \"p1\", "),
            Err(ParseError::MalformedJson(_))
        ));
        assert!(matches!(parse("[1, 2]"), Err(ParseError::MalformedJson(_))));
        assert!(matches!(parse(""), Err(ParseError::MalformedJson(_))));
    }

    #[test]
    fn test_missing_fields() {
        assert!(matches!(
            parse(r#"{"name": "n", "defines": {"1": [0, 10]}}"#),
            Err(ParseError::MissingField("id"))
        ));
        assert!(matches!(
            parse(r#"{"id": "p1", "defines": {"1": [0, 10]}}"#),
            Err(ParseError::MissingField("name"))
        ));
        assert!(matches!(
            parse(r#"{"id": "p1", "name": "n"}"#),
            Err(ParseError::MissingField("defines"))
        ));
        // Wrong types are as unusable as missing fields.
        assert!(matches!(
            parse(r#"{"id": 7, "name": "n", "defines": {"1": [0, 10]}}"#),
            Err(ParseError::MissingField("id"))
        ));
        assert!(matches!(
            parse(r#"{"id": "p1", "name": "n", "defines": []}"#),
            Err(ParseError::MissingField("defines"))
        ));
    }

    #[test]
    fn test_invalid_entries_are_dropped() {
        let config = parse(
            r#"{
                "id": "p1",
                "name": "mixed",
                "defines": {
                    "1": [0, 10],
                    "2": [-5, 10],
                    "3": [100, 0],
                    "4": null,
                    "5": "key5.wav",
                    "6": [1, 2, 3],
                    "7": ["a", 10]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.defines().len(), 1);
        assert!(config.slice("1").is_some());
    }

    #[test]
    fn test_all_entries_invalid() {
        match parse(r#"{"id": "p1", "name": "n", "defines": {"1": [-1, 10], "2": null}}"#) {
            Err(ParseError::InvalidTiming { dropped }) => assert_eq!(dropped, 2),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            parse(r#"{"id": "p1", "name": "n", "defines": {}}"#),
            Err(ParseError::InvalidTiming { dropped: 0 })
        ));
    }

    #[test]
    fn test_optional_fields_default() {
        let config = parse(r#"{"id": "p1", "name": "n", "defines": {"16": [1000, 200]}}"#).unwrap();
        assert_eq!(config.key_define_type(), KeyDefineType::Single);
        assert!(!config.includes_numpad());
        assert_eq!(config.sound(), "");

        let config = parse(
            r#"{
                "id": "p1",
                "name": "n",
                "key_define_type": "multi-key",
                "includes_numpad": true,
                "defines": {"16": [1000, 200]}
            }"#,
        )
        .unwrap();
        assert_eq!(config.key_define_type(), KeyDefineType::Multi);
        assert!(config.includes_numpad());
    }

    #[test]
    fn test_persisted_form_rejects_bad_timings() {
        let config = parse(PACK).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let restored: SoundPackConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);

        let tampered = r#"{"id": "p1", "name": "n", "defines": {"1": [-1, 10]}}"#;
        assert!(serde_json::from_str::<SoundPackConfig>(tampered).is_err());
    }
}
