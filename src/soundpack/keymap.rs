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

//! Translation from physical key tokens to MechVibes key ids.
//!
//! Tokens follow the `KeyboardEvent.code` naming (`KeyQ`, `Digit1`, `ShiftLeft`).
//! MechVibes ids are the scan codes its pack editor records, as strings.

/// Returns the MechVibes key id for a key token, if the token has one.
pub fn sound_pack_key_id(token: &str) -> Option<&'static str> {
    let id = match token {
        "Escape" => "1",
        "Digit1" => "2",
        "Digit2" => "3",
        "Digit3" => "4",
        "Digit4" => "5",
        "Digit5" => "6",
        "Digit6" => "7",
        "Digit7" => "8",
        "Digit8" => "9",
        "Digit9" => "10",
        "Digit0" => "11",
        "Minus" => "12",
        "Equal" => "13",
        "Backspace" => "14",
        "Tab" => "15",
        "KeyQ" => "16",
        "KeyW" => "17",
        "KeyE" => "18",
        "KeyR" => "19",
        "KeyT" => "20",
        "KeyY" => "21",
        "KeyU" => "22",
        "KeyI" => "23",
        "KeyO" => "24",
        "KeyP" => "25",
        "BracketLeft" => "26",
        "BracketRight" => "27",
        "Enter" => "28",
        "ControlLeft" => "29",
        "KeyA" => "30",
        "KeyS" => "31",
        "KeyD" => "32",
        "KeyF" => "33",
        "KeyG" => "34",
        "KeyH" => "35",
        "KeyJ" => "36",
        "KeyK" => "37",
        "KeyL" => "38",
        "Semicolon" => "39",
        "Quote" => "40",
        "Backquote" => "41",
        "ShiftLeft" => "42",
        "Backslash" => "43",
        "KeyZ" => "44",
        "KeyX" => "45",
        "KeyC" => "46",
        "KeyV" => "47",
        "KeyB" => "48",
        "KeyN" => "49",
        "KeyM" => "50",
        "Comma" => "51",
        "Period" => "52",
        "Slash" => "53",
        "ShiftRight" => "54",
        "NumpadMultiply" => "55",
        "AltLeft" => "56",
        "Space" => "57",
        "CapsLock" => "58",
        "F1" => "59",
        "F2" => "60",
        "F3" => "61",
        "F4" => "62",
        "F5" => "63",
        "F6" => "64",
        "F7" => "65",
        "F8" => "66",
        "F9" => "67",
        "F10" => "68",
        "NumLock" => "69",
        "Numpad7" => "71",
        "Numpad8" => "72",
        "Numpad9" => "73",
        "NumpadSubtract" => "74",
        "Numpad4" => "75",
        "Numpad5" => "76",
        "Numpad6" => "77",
        "NumpadAdd" => "78",
        "Numpad1" => "79",
        "Numpad2" => "80",
        "Numpad3" => "81",
        "Numpad0" => "82",
        "NumpadDecimal" => "83",
        "F11" => "87",
        "F12" => "88",
        "NumpadEnter" => "3612",
        "ControlRight" => "3613",
        "NumpadDivide" => "3637",
        "ArrowUp" => "3639",
        "AltRight" => "3640",
        "PageUp" => "3653",
        "Home" => "3655",
        "End" => "3657",
        "ArrowLeft" => "3663",
        "ArrowDown" => "3665",
        "Insert" => "3666",
        "PageDown" => "3667",
        "Delete" => "3675",
        "ArrowRight" => "3677",
        _ => return None,
    };
    Some(id)
}

/// Returns the main keyboard token a numpad token shares its sound with.
pub fn main_keyboard_equivalent(token: &str) -> Option<&'static str> {
    let equivalent = match token {
        "Numpad0" => "Digit0",
        "Numpad1" => "Digit1",
        "Numpad2" => "Digit2",
        "Numpad3" => "Digit3",
        "Numpad4" => "Digit4",
        "Numpad5" => "Digit5",
        "Numpad6" => "Digit6",
        "Numpad7" => "Digit7",
        "Numpad8" => "Digit8",
        "Numpad9" => "Digit9",
        "NumpadDecimal" => "Period",
        "NumpadAdd" => "Equal",
        "NumpadSubtract" => "Minus",
        "NumpadMultiply" => "Digit8",
        "NumpadDivide" => "Slash",
        "NumpadEnter" => "Enter",
        _ => return None,
    };
    Some(equivalent)
}

/// Translates a key token for a pack. Packs without numpad sounds play the
/// main keyboard sound for numpad keys.
pub fn translate(token: &str, includes_numpad: bool) -> Option<&'static str> {
    if !includes_numpad {
        if let Some(equivalent) = main_keyboard_equivalent(token) {
            return sound_pack_key_id(equivalent);
        }
    }
    sound_pack_key_id(token)
}
