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
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use parking_lot::RwLock;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use keyclack::audio::{self, AudioContextManager};
use keyclack::config::AppConfig;
use keyclack::controller::{keyboard, Controller};
use keyclack::engine::KeystrokePlaybackEngine;
use keyclack::events::Observers;
use keyclack::player::Player;
use keyclack::soundpack::{
    self, ActiveSoundPackSelection, AudioBufferCache, SoundPacks, SourceLocator,
};

/// How long to let the last sound ring out before exiting.
const TAIL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Mechanical keyboard sounds from MechVibes sound packs."
)]
struct Cli {
    /// The path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// The audio device to play through. Overrides the configuration file.
    #[arg(short, long, global = true)]
    device: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Parses a sound pack configuration and prints what it defines.
    Inspect {
        /// The path to the sound pack configuration.
        config: PathBuf,
    },
    /// Plays key sounds from a sound pack without installing it.
    Play {
        /// The path to the sound pack configuration.
        config: PathBuf,
        /// The path to the sound pack audio.
        audio: PathBuf,
        /// The key tokens to play, e.g. KeyQ Space Enter.
        keys: Vec<String>,
        /// The playback volume, between 0 and 1.
        #[arg(short, long, default_value_t = 0.5)]
        volume: f32,
        /// The time between key presses, e.g. 150ms.
        #[arg(short, long, default_value = "150ms")]
        interval: String,
    },
    /// Installs a sound pack and makes it the active one.
    Install {
        /// The path to the sound pack configuration.
        config: PathBuf,
        /// The path to the sound pack audio.
        audio: PathBuf,
    },
    /// Removes an installed sound pack.
    Remove {
        /// The sound pack id.
        id: String,
    },
    /// Makes an installed sound pack the active one.
    Select {
        /// The sound pack id.
        id: String,
    },
    /// Lists the installed sound packs.
    List {},
    /// Starts the keyboard sound engine, reading keys from stdin.
    Start {
        /// The path to a message sent sound.
        #[arg(short, long)]
        message_sound: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn Error>> {
    let config = AppConfig::load(cli.config.as_deref())?;
    Ok(match &cli.device {
        Some(device) => config.with_device(device),
        None => config,
    })
}

/// Creates the player and restores installed packs.
fn restored_player(config: &AppConfig) -> Result<Player, Box<dyn Error>> {
    let device = audio::get_device(config.audio())?;
    let player = Player::new(device, config)?;
    player.restore();
    Ok(player)
}

fn print_packs(player: &Player) {
    let packs = player.sound_packs();
    if packs.is_empty() {
        println!("No sound packs installed.");
        return;
    }

    println!("Sound packs:");
    for pack in packs {
        println!(
            "{} {} ({}, {} keys{}{})",
            if pack.selected { "*" } else { "-" },
            pack.id,
            pack.name,
            pack.keys,
            if pack.includes_numpad { ", numpad" } else { "" },
            if pack.decoded { "" } else { ", audio unavailable" },
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Inspect { config } => {
            let pack = soundpack::parse(&fs::read_to_string(config)?)?;
            println!("{} ({})", pack.id(), pack.name());
            println!("Type: {:?}", pack.key_define_type());
            println!("Numpad: {}", pack.includes_numpad());
            println!("Sound: {}", pack.sound());
            println!("Keys (count: {}):", pack.defines().len());
            for (key, slice) in pack.defines() {
                println!(
                    "- {}: {}ms +{}ms",
                    key,
                    slice.start_ms(),
                    slice.duration_ms()
                );
            }
        }
        Commands::Play {
            config: config_path,
            audio: audio_path,
            keys,
            volume,
            interval,
        } => {
            let config = load_config(&cli)?;
            let interval: Duration = DurationString::from_string(interval.clone())?.into();
            let pack = soundpack::parse(&fs::read_to_string(config_path)?)?;
            let id = pack.id().to_string();

            let observers = Observers::new();
            let device = audio::get_device(config.audio())?;
            let context = AudioContextManager::new(device, observers.clone());
            let selection = ActiveSoundPackSelection::new();
            let cache = AudioBufferCache::new(context.clone(), selection.clone());
            let mut packs = SoundPacks::new(cache);
            packs.cache_mut().store(&id, SourceLocator::file(audio_path))?;
            packs.insert_config(pack);
            selection.select(&id);

            let engine = KeystrokePlaybackEngine::new(
                context.clone(),
                Arc::new(RwLock::new(packs)),
                selection,
                config.audio().resume_timeout()?,
                observers,
            );
            for key in keys {
                let outcome = engine.play(key, *volume);
                println!("{}: {:?}", key, outcome);
                thread::sleep(interval);
            }
            thread::sleep(TAIL);
            context.close();
        }
        Commands::Install {
            config: config_path,
            audio: audio_path,
        } => {
            let config = load_config(&cli)?;
            let player = restored_player(&config)?;
            let pack = player.load_sound_pack_files(config_path, audio_path)?;
            println!("Installed {} ({}).", pack.id, pack.name);
            player.close();
        }
        Commands::Remove { id } => {
            let config = load_config(&cli)?;
            let player = restored_player(&config)?;
            player.remove_sound_pack(id)?;
            println!("Removed {}.", id);
            player.close();
        }
        Commands::Select { id } => {
            let config = load_config(&cli)?;
            let player = restored_player(&config)?;
            player.select_sound_pack(id)?;
            println!("Selected {}.", id);
            player.close();
        }
        Commands::List {} => {
            let config = load_config(&cli)?;
            let player = restored_player(&config)?;
            print_packs(&player);
            player.close();
        }
        Commands::Start { message_sound } => {
            let config = load_config(&cli)?;
            let player = Arc::new(restored_player(&config)?);
            player.load_default_sound_pack(&config.default_pack_dir());
            if let Some(path) = message_sound {
                if let Err(e) = player.load_message_sound_file(path) {
                    warn!(path = ?path, err = %e, "Unable to load message sound");
                }
            }

            let driver = Arc::new(keyboard::Driver::new());
            Controller::new(player.clone(), driver, config.ignored_keys())
                .join()
                .await?;
            player.close();
        }
    }

    Ok(())
}
