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

//! Whole-buffer decoding of sound pack audio.
//!
//! Sound pack audio is short, so it is decoded entirely into memory and
//! resampled to the output rate up front. Playback then only copies samples.

use std::io::{Cursor, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

/// Errors produced while decoding audio.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported audio: {0}")]
    Unsupported(String),

    #[error("audio codec error: {0}")]
    Codec(#[from] SymphoniaError),

    #[error("unable to read audio source: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio contains no samples")]
    Empty,

    #[error("unable to resample from {source_rate}Hz to {target_rate}Hz: {reason}")]
    Resample {
        source_rate: u32,
        target_rate: u32,
        reason: String,
    },
}

/// Decoded audio held in memory.
/// The sample data is stored in an Arc for efficient sharing between voices.
#[derive(Clone)]
pub struct DecodedAudio {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> DecodedAudio {
        DecodedAudio {
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// The interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Total duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for DecodedAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedAudio")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Decodes the given bytes into memory, resampling to the target rate.
/// The hint is a file extension (`ogg`, `wav`) used to help the probe.
pub fn decode(
    bytes: Arc<[u8]>,
    hint: Option<&str>,
    target_rate: u32,
) -> Result<DecodedAudio, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut probe_hint = Hint::new();
    if let Some(extension) = hint {
        probe_hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &probe_hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::Unsupported("no audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channel_count = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            // Some decoders return DecodeError at EOF instead of IoError.
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channel_count.get_or_insert(spec.channels.count() as u16);

        let buffer = match sample_buffer.as_mut() {
            Some(buffer) if buffer.capacity() >= decoded.capacity() * spec.channels.count() => {
                buffer
            }
            _ => sample_buffer.insert(SampleBuffer::new(decoded.capacity() as u64, spec)),
        };
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let (Some(source_rate), Some(channel_count)) = (sample_rate, channel_count) else {
        return Err(DecodeError::Empty);
    };
    if samples.is_empty() || channel_count == 0 || source_rate == 0 {
        return Err(DecodeError::Empty);
    }

    let (samples, final_rate) = if target_rate != 0 && source_rate != target_rate {
        debug!(
            source_rate,
            target_rate, "Resampling decoded audio to output rate"
        );
        (
            resample(&samples, channel_count, source_rate, target_rate)?,
            target_rate,
        )
    } else {
        (samples, source_rate)
    };

    let audio = DecodedAudio::new(samples, channel_count, final_rate);
    info!(
        channels = channel_count,
        sample_rate = final_rate,
        duration_ms = audio.duration().as_millis(),
        memory_kb = audio.memory_size() / 1024,
        "Audio decoded"
    );
    Ok(audio)
}

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Resamples interleaved samples with a sinc resampler. The output holds
/// `ceil(frames * target_rate / source_rate)` frames, aligned with the input.
pub fn resample(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, DecodeError> {
    let resample_error = |reason: String| DecodeError::Resample {
        source_rate,
        target_rate,
        reason,
    };

    let channels = channel_count.max(1) as usize;
    let source_frames = samples.len() / channels;
    let ratio = target_rate as f64 / source_rate as f64;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, sinc_params, INPUT_BLOCK_SIZE, channels)
            .map_err(|e| resample_error(e.to_string()))?;

    // Planar input, one Vec per channel.
    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|channel| {
            samples
                .chunks_exact(channels)
                .map(|frame| frame[channel])
                .collect()
        })
        .collect();

    // The resampler delays its output, so skip the delay and keep going until
    // every target frame has come out.
    let delay = resampler.output_delay();
    let wanted = delay + target_frames;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];
    let mut position = 0;
    while output[0].len() < wanted {
        let needed = resampler.input_frames_next();
        let result = if position + needed <= source_frames {
            let input: Vec<&[f32]> = planar
                .iter()
                .map(|channel| &channel[position..position + needed])
                .collect();
            position += needed;
            resampler.process(input.as_slice(), None)
        } else if position < source_frames {
            let input: Vec<&[f32]> = planar.iter().map(|channel| &channel[position..]).collect();
            position = source_frames;
            resampler.process_partial(Some(input.as_slice()), None)
        } else {
            resampler.process_partial(None::<&[Vec<f32>]>, None)
        };
        let chunk = result.map_err(|e| resample_error(e.to_string()))?;

        if chunk.first().map_or(true, Vec::is_empty) && position >= source_frames {
            break;
        }
        for (out, resampled) in output.iter_mut().zip(chunk) {
            out.extend(resampled);
        }
    }

    let mut interleaved = Vec::with_capacity(target_frames * channels);
    for frame in delay..wanted {
        for channel in &output {
            interleaved.push(channel.get(frame).copied().unwrap_or(0.0));
        }
    }
    Ok(interleaved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::audio::wav_bytes;

    #[test]
    fn test_decode_wav() {
        let bytes = wav_bytes(44100, 2, 44100);
        let audio = decode(bytes.into(), Some("wav"), 44100).unwrap();

        assert_eq!(audio.channel_count(), 2);
        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.frames(), 44100);
        assert!((audio.duration_secs() - 1.0).abs() < 1e-9);
        assert_eq!(audio.memory_size(), 44100 * 2 * 4);
    }

    #[test]
    fn test_decode_resamples_to_target() {
        let bytes = wav_bytes(22050, 1, 22050);
        let audio = decode(bytes.into(), None, 44100).unwrap();

        assert_eq!(audio.channel_count(), 1);
        assert_eq!(audio.sample_rate(), 44100);
        assert!((audio.duration_secs() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_decode_garbage() {
        let bytes: Arc<[u8]> = Arc::from(&b"definitely not audio"[..]);
        assert!(matches!(
            decode(bytes, Some("ogg"), 44100),
            Err(DecodeError::Unsupported(_))
        ));

        let empty: Arc<[u8]> = Arc::from(Vec::new());
        assert!(decode(empty, None, 44100).is_err());
    }

    #[test]
    fn test_decode_off_rate_tone() {
        let bytes = wav_bytes(22050, 1, 22050);
        let audio = decode(bytes.into(), Some("wav"), 44100).unwrap();

        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.frames(), 44100);
        assert!((audio.duration_secs() - 1.0).abs() < 1e-9);

        // The 440Hz tone survives at its original amplitude and phase.
        let amplitude = 8000.0 / 32768.0;
        for frame in [11025, 22050, 33075] {
            let expected = amplitude
                * (2.0 * std::f32::consts::PI * 440.0 * frame as f32 / 44100.0).sin();
            let actual = audio.samples()[frame];
            assert!(
                (actual - expected).abs() < 0.05,
                "frame {frame}: {actual} != {expected}"
            );
        }
    }

    #[test]
    fn test_resample_stereo() {
        let stereo: Vec<f32> = (0..4410).flat_map(|_| [0.5f32, -0.5]).collect();
        let result = resample(&stereo, 2, 44100, 48000).unwrap();
        assert_eq!(result.len(), 4800 * 2);

        // Channels stay apart away from the edges.
        let middle = 2400 * 2;
        assert!((result[middle] - 0.5).abs() < 0.01);
        assert!((result[middle + 1] + 0.5).abs() < 0.01);
    }
}
