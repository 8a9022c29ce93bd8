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
use std::{error::Error, f32::consts::PI, fs::File, io::Cursor, io::Seek, io::Write, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Generates a 440Hz tone with the given number of frames, repeated on every channel.
pub fn tone(sample_rate: u32, frames: usize) -> Vec<i16> {
    (0..frames)
        .map(|i| ((2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin() * 8000.0) as i16)
        .collect()
}

fn write_tone<W: Write + Seek>(
    writer: W,
    sample_rate: u32,
    channels: u16,
    frames: usize,
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        writer,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    for sample in tone(sample_rate, frames) {
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Encodes a tone as WAV bytes in memory.
pub fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    write_tone(&mut cursor, sample_rate, channels, frames).expect("unable to encode wav");
    cursor.into_inner()
}

/// Writes a tone as a WAV file.
pub fn write_wav(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    frames: usize,
) -> Result<(), Box<dyn Error>> {
    write_tone(File::create(path)?, sample_rate, channels, frames)
}

/// A sound pack configuration with three press keys and one release key.
pub fn pack_config(id: &str, name: &str) -> String {
    format!(
        r#"{{
    "id": "{}",
    "name": "{}",
    "key_define_type": "single",
    "includes_numpad": false,
    "sound": "sound.wav",
    "defines": {{
        "16": [1000, 200],
        "30": [250, 100],
        "57": [1500, 300],
        "16-up": [1300, 90]
    }}
}}"#,
        id, name
    )
}
