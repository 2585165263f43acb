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
use std::path::Path;
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::instruments::MAX_KEY;

/// Default playback speed in ticks per second.
pub const DEFAULT_TEMPO: f64 = 10.0;

/// Notes may not land later than this after the start.
pub const MAX_SEQUENCE_LENGTH: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_TAIL: &str = "2s";
const FULL_VOLUME: u8 = 100;
const CENTER_PANNING: u8 = 100;

fn default_volume() -> u8 {
    FULL_VOLUME
}

fn default_panning() -> u8 {
    CENTER_PANNING
}

/// A layer groups notes under a shared volume and panning.
#[derive(Deserialize, Clone, Debug)]
pub struct Layer {
    #[serde(default)]
    name: String,

    /// 0-100 (default: 100)
    #[serde(default = "default_volume")]
    volume: u8,

    /// 0-200, 100 is center (default: 100)
    #[serde(default = "default_panning")]
    panning: u8,

    /// When any layer is solo, only solo layers sound.
    #[serde(default)]
    solo: bool,
}

impl Layer {
    pub fn new(name: &str, volume: u8, panning: u8, solo: bool) -> Layer {
        Layer {
            name: name.to_string(),
            volume,
            panning,
            solo,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn panning(&self) -> u8 {
        self.panning
    }

    pub fn solo(&self) -> bool {
        self.solo
    }
}

/// A single note block.
#[derive(Deserialize, Clone, Debug)]
pub struct Note {
    /// Tick the note sounds on.
    tick: u64,

    /// Index into the sequence's layers.
    #[serde(default)]
    layer: usize,

    /// Index into the instrument set.
    instrument: u32,

    /// Piano key, 0-87.
    key: u8,

    /// 0-100 (default: 100)
    #[serde(default = "default_volume")]
    velocity: u8,

    /// 0-200, 100 is center (default: 100)
    #[serde(default = "default_panning")]
    panning: u8,

    /// Fine tune in cents (default: 0)
    #[serde(default)]
    pitch: i16,
}

impl Note {
    pub fn new(tick: u64, layer: usize, instrument: u32, key: u8) -> Note {
        Note {
            tick,
            layer,
            instrument,
            key,
            velocity: FULL_VOLUME,
            panning: CENTER_PANNING,
            pitch: 0,
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Note {
        self.velocity = velocity;
        self
    }

    pub fn with_panning(mut self, panning: u8) -> Note {
        self.panning = panning;
        self
    }

    pub fn with_pitch(mut self, pitch: i16) -> Note {
        self.pitch = pitch;
        self
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn instrument(&self) -> u32 {
        self.instrument
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn panning(&self) -> u8 {
        self.panning
    }

    pub fn pitch(&self) -> i16 {
        self.pitch
    }
}

/// A YAML representation of a note sequence.
#[derive(Deserialize, Clone, Debug)]
pub struct Sequence {
    /// Ticks per second (default: 10)
    tempo: Option<f64>,

    /// How long to let voices ring after the last note (default: 2s)
    tail: Option<String>,

    #[serde(default)]
    layers: Vec<Layer>,

    #[serde(default)]
    notes: Vec<Note>,
}

impl Sequence {
    pub fn new(tempo: f64, layers: Vec<Layer>, notes: Vec<Note>) -> Sequence {
        Sequence {
            tempo: Some(tempo),
            tail: None,
            layers,
            notes,
        }
    }

    pub fn with_tail(mut self, tail: &str) -> Sequence {
        self.tail = Some(tail.to_string());
        self
    }

    /// Parse a sequence from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Sequence, ConfigError> {
        let sequence = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Sequence>()?;
        sequence.validate()?;
        Ok(sequence)
    }

    /// Checks ranges the YAML types can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tempo = self.tempo();
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(ConfigError::invalid(
                "tempo",
                format!("{} must be a positive number of ticks per second", tempo),
            ));
        }
        self.tail()?;
        self.tick_offset(self.length_ticks())?;

        for (i, layer) in self.layers.iter().enumerate() {
            if layer.volume > FULL_VOLUME {
                return Err(ConfigError::invalid(
                    format!("volume of layer {}", i),
                    format!("{} is above {}", layer.volume, FULL_VOLUME),
                ));
            }
            if layer.panning > 2 * CENTER_PANNING {
                return Err(ConfigError::invalid(
                    format!("panning of layer {}", i),
                    format!("{} is above {}", layer.panning, 2 * CENTER_PANNING),
                ));
            }
        }

        for note in &self.notes {
            if note.key > MAX_KEY {
                return Err(ConfigError::invalid(
                    format!("key of note at tick {}", note.tick),
                    format!("{} is above {}", note.key, MAX_KEY),
                ));
            }
            if note.velocity > FULL_VOLUME {
                return Err(ConfigError::invalid(
                    format!("velocity of note at tick {}", note.tick),
                    format!("{} is above {}", note.velocity, FULL_VOLUME),
                ));
            }
            if note.panning > 2 * CENTER_PANNING {
                return Err(ConfigError::invalid(
                    format!("panning of note at tick {}", note.tick),
                    format!("{} is above {}", note.panning, 2 * CENTER_PANNING),
                ));
            }
        }
        Ok(())
    }

    /// Returns the tempo in ticks per second.
    pub fn tempo(&self) -> f64 {
        self.tempo.unwrap_or(DEFAULT_TEMPO)
    }

    /// Returns how long to wait after the last note.
    pub fn tail(&self) -> Result<Duration, ConfigError> {
        let tail = self.tail.as_deref().unwrap_or(DEFAULT_TAIL);
        DurationString::from_string(tail.to_string())
            .map(Duration::from)
            .map_err(|e| ConfigError::Duration {
                value: tail.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Wall-clock offset of a tick from the start of the sequence. Fails when
    /// the tick lands beyond `MAX_SEQUENCE_LENGTH`.
    pub fn tick_offset(&self, tick: u64) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(tick as f64 / self.tempo())
            .ok()
            .filter(|offset| *offset <= MAX_SEQUENCE_LENGTH)
            .ok_or_else(|| {
                ConfigError::invalid(
                    format!("tick {}", tick),
                    format!(
                        "at {} ticks per second it lands beyond {:?}",
                        self.tempo(),
                        MAX_SEQUENCE_LENGTH
                    ),
                )
            })
    }

    /// Returns the last tick holding a note.
    pub fn length_ticks(&self) -> u64 {
        self.notes.iter().map(|n| n.tick).max().unwrap_or(0)
    }
}
