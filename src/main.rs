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
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use nbs_audio::audio;
use nbs_audio::config::{self, Sequence};
use nbs_audio::instruments::{InstrumentBank, MAX_KEY};
use nbs_audio::playsync::CancelHandle;
use nbs_audio::{SampleEngine, SequenceOutcome, Sequencer};

/// Extra time to wait after a single note's natural length.
const RING_OUT_MARGIN: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sample player for note block music."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the instruments and whether their sounds load.
    Instruments {
        /// The path to the engine config. Uses the default instruments when unset.
        #[arg[short, long]]
        config: Option<PathBuf>,
    },
    /// Plays a single note and waits for it to ring out.
    Play {
        /// The path to the engine config.
        config: PathBuf,
        /// The instrument index.
        #[arg[short, long]]
        instrument: u32,
        /// The piano key, 0-87. 45 plays the sample at its recorded pitch.
        #[arg[short, long, default_value_t = 45]]
        key: u8,
        /// Linear volume, 0.0-1.0.
        #[arg[short, long, default_value_t = 1.0]]
        volume: f32,
        /// Stereo position, -1.0 (left) to 1.0 (right).
        #[arg[short, long, default_value_t = 0.0, allow_hyphen_values = true]]
        panning: f32,
        /// How long to wait before exiting, e.g. "3s". Defaults to the note's length.
        #[arg[long]]
        hold: Option<String>,
    },
    /// Plays a note sequence.
    Sequence {
        /// The path to the engine config.
        config: PathBuf,
        /// The path to the sequence.
        sequence: PathBuf,
    },
    /// Prints the default engine config to stdout.
    Defaults {},
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
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
        Commands::Instruments { config } => {
            let engine_config = match config {
                Some(path) => config::Engine::deserialize(&path)?,
                None => config::Engine::default(),
            };

            // Loading only needs a decoder at the right rate, not the real device.
            let device = Box::new(audio::mock::Device::new(
                "mock-instruments",
                engine_config.audio().output_format()?,
            ));
            let engine = SampleEngine::with_device(
                device,
                engine_config.max_voices(),
                engine_config.eviction(),
                engine_config.audio().master_volume(),
            )?;
            let bank = InstrumentBank::load(
                &engine,
                engine_config.instruments(),
                &engine_config.sounds_dir(),
            );

            println!(
                "Instruments (count: {}, loaded: {}):",
                bank.len(),
                bank.loaded_count()
            );
            for (id, instrument, loaded) in bank.iter() {
                println!(
                    "- {}: {} ({}) sound={} pitch={} press={} {}",
                    id,
                    instrument.name(),
                    instrument.color(),
                    instrument
                        .sound_path()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    instrument.pitch(),
                    instrument.press(),
                    if loaded { "[loaded]" } else { "[missing]" }
                );
            }
            println!("Sample memory: {} KiB", engine.memory_usage() / 1024);
        }
        Commands::Play {
            config,
            instrument,
            key,
            volume,
            panning,
            hold,
        } => {
            if key > MAX_KEY {
                return Err(format!("key {} is above the highest key {}", key, MAX_KEY).into());
            }
            let engine_config = config::Engine::deserialize(&config)?;
            let engine = SampleEngine::new(&engine_config)?;
            let bank = InstrumentBank::load(
                &engine,
                engine_config.instruments(),
                &engine_config.sounds_dir(),
            );

            let Some(definition) = bank.get(instrument) else {
                return Err(format!(
                    "instrument {} does not exist, {} are configured",
                    instrument,
                    bank.len()
                )
                .into());
            };
            let pitch_ratio = definition.pitch_ratio(key, 0);
            engine.play_sound(instrument, volume, pitch_ratio, panning)?;

            let hold = match hold {
                Some(hold) => DurationString::from_string(hold)?.into(),
                None => {
                    engine
                        .voice_length(instrument, pitch_ratio)
                        .unwrap_or_default()
                        + RING_OUT_MARGIN
                }
            };
            std::thread::sleep(hold);
            engine.shutdown();
        }
        Commands::Sequence { config, sequence } => {
            let engine_config = config::Engine::deserialize(&config)?;
            let sequence = Sequence::deserialize(&sequence)?;
            let engine = Arc::new(SampleEngine::new(&engine_config)?);
            let bank = Arc::new(InstrumentBank::load(
                &engine,
                engine_config.instruments(),
                &engine_config.sounds_dir(),
            ));

            let sequencer = Sequencer::new(engine.clone(), bank);
            match sequencer.play(&sequence, CancelHandle::new())? {
                SequenceOutcome::Finished { triggered } => {
                    println!("Finished, {} notes played.", triggered)
                }
                SequenceOutcome::Cancelled { triggered } => {
                    println!("Cancelled after {} notes.", triggered)
                }
            }
            engine.shutdown();
        }
        Commands::Defaults {} => {
            print!("{}", serde_yml::to_string(&config::Engine::defaults())?);
        }
    }

    Ok(())
}
