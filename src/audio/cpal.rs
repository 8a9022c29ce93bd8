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
use std::{error::Error, fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level};

use crate::audio::{mixer::AudioMixer, Device as AudioDevice};
use crate::config;

/// Commands sent to the output thread.
enum Command {
    Suspend,
    Resume,
    Close,
}

type Reply = Sender<Result<(), String>>;

/// The thread that owns the cpal stream. Streams are not Send on every
/// platform, so the stream is created, driven, and dropped on this thread.
struct OutputThread {
    commands: Sender<(Command, Reply)>,
    join: Option<thread::JoinHandle<()>>,
}

impl OutputThread {
    /// Sends a command and waits for the output thread to act on it.
    fn send(&self, command: Command) -> Result<(), Box<dyn Error>> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands.send((command, reply_tx))?;
        reply_rx.recv()?.map_err(|e| e.into())
    }
}

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Output sample rate.
    sample_rate: u32,
    /// Output channel count.
    channels: u16,
    /// The running output, once opened.
    output: Mutex<Option<OutputThread>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Builds an output stream that converts mixed f32 frames to the device sample type.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: AudioMixer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let scratch = &mut scratch[..data.len()];
            mixer.process_into(scratch);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

fn run_output(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: AudioMixer,
    started: Reply,
    commands: Receiver<(Command, Reply)>,
) {
    let span = span!(Level::INFO, "cpal output");
    let _enter = span.enter();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let mixer = mixer.clone();
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| mixer.process_into(data),
                |err| error!("CPAL output stream error: {}", err),
                None,
            )
        }
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer.clone()),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer.clone()),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer.clone()),
        other => {
            let _ = started.send(Err(format!("unsupported sample format {:?}", other)));
            return;
        }
    };

    let stream = match stream.map_err(|e| e.to_string()).and_then(|stream| {
        stream.play().map_err(|e| e.to_string())?;
        Ok(stream)
    }) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = started.send(Err(e));
            return;
        }
    };
    info!("CPAL output stream started successfully");
    let _ = started.send(Ok(()));

    for (command, reply) in commands.iter() {
        let result = match command {
            Command::Suspend => stream.pause().map_err(|e| e.to_string()),
            Command::Resume => stream.play().map_err(|e| e.to_string()),
            Command::Close => {
                let _ = reply.send(Ok(()));
                break;
            }
        };
        let _ = reply.send(result);
    }

    mixer.stop_all();
    info!("CPAL output stream closed");
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        sample_rate: 44100,
                        channels: max_channels.min(2),
                        output: Mutex::new(None),
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device. "default" picks the default output of the
    /// default host.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        let mut device = if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device")?;
            let max_channels = device.default_output_config()?.channels();
            Device {
                name: device.name()?,
                max_channels,
                host_id: host.id(),
                device,
                sample_rate: 44100,
                channels: 2,
                output: Mutex::new(None),
            }
        } else {
            Device::list_cpal_devices()?
                .into_iter()
                .find(|device| device.name.trim() == name)
                .ok_or_else(|| format!("no device found with name {}", name))?
        };

        device.sample_rate = config.sample_rate();
        device.channels = config.channels().min(device.max_channels.max(1));
        Ok(device)
    }
}

impl AudioDevice for Device {
    fn open(&self, mixer: AudioMixer) -> Result<(), Box<dyn Error>> {
        let mut output = self.output.lock();
        if output.is_some() {
            return Err(format!("device {} is already open", self.name).into());
        }

        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let sample_format = self.device.default_output_config()?.sample_format();
        info!(
            device = self.name,
            channels = self.channels,
            sample_rate = self.sample_rate,
            format = ?sample_format,
            "Opening output stream."
        );

        let (started_tx, started_rx) = bounded(1);
        let (commands_tx, commands_rx) = unbounded();
        let device = self.device.clone();
        let join = thread::spawn(move || {
            run_output(
                device,
                config,
                sample_format,
                mixer,
                started_tx,
                commands_rx,
            )
        });

        started_rx.recv()??;
        *output = Some(OutputThread {
            commands: commands_tx,
            join: Some(join),
        });
        Ok(())
    }

    fn suspend(&self) -> Result<(), Box<dyn Error>> {
        match self.output.lock().as_ref() {
            Some(output) => output.send(Command::Suspend),
            None => Err(format!("device {} is not open", self.name).into()),
        }
    }

    fn resume(&self) -> Result<(), Box<dyn Error>> {
        match self.output.lock().as_ref() {
            Some(output) => output.send(Command::Resume),
            None => Err(format!("device {} is not open", self.name).into()),
        }
    }

    fn close(&self) -> Result<(), Box<dyn Error>> {
        let Some(mut output) = self.output.lock().take() else {
            return Ok(());
        };
        output.send(Command::Close)?;
        if let Some(join) = output.join.take() {
            if join.join().is_err() {
                warn!(device = self.name, "Output thread panicked");
            }
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}
