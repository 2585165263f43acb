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
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::instruments::{self, Rgb, DEFAULT_PITCH, MAX_KEY};

/// A YAML representation of an instrument.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Instrument {
    /// Display name.
    name: String,

    /// RGB display color as three 0-255 components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<Vec<u8>>,

    /// Sample file, relative to the sounds directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sound: Option<String>,

    /// Icon file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon: Option<String>,

    /// Key the sample plays at its native pitch (default: 45)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pitch: Option<u8>,

    /// Whether the instrument sounds on key press only (default: false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    press: Option<bool>,
}

impl Instrument {
    /// Checks the fields that deserialization alone can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("instrument name", "must not be empty"));
        }
        if let Some(color) = &self.color {
            if color.len() != 3 {
                return Err(ConfigError::invalid(
                    format!("color for instrument {}", self.name),
                    format!("expected 3 components, got {}", color.len()),
                ));
            }
        }
        if let Some(pitch) = self.pitch {
            if pitch > MAX_KEY {
                return Err(ConfigError::invalid(
                    format!("pitch for instrument {}", self.name),
                    format!("{} is above the highest key {}", pitch, MAX_KEY),
                ));
            }
        }
        Ok(())
    }

    /// Converts to the runtime instrument.
    pub fn to_instrument(&self) -> instruments::Instrument {
        let color = match self.color.as_deref() {
            Some([r, g, b]) => Rgb::new(*r, *g, *b),
            _ => Rgb::default(),
        };
        instruments::Instrument::new(&self.name, color)
            .with_sound(self.sound.as_ref().map(PathBuf::from))
            .with_icon(self.icon.as_ref().map(PathBuf::from))
            .with_pitch(self.pitch.unwrap_or(DEFAULT_PITCH))
            .with_press(self.press.unwrap_or(false))
    }
}

impl From<&instruments::Instrument> for Instrument {
    fn from(instrument: &instruments::Instrument) -> Self {
        let color = instrument.color();
        Instrument {
            name: instrument.name().to_string(),
            color: Some(vec![color.r, color.g, color.b]),
            sound: instrument
                .sound_path()
                .map(|path| path.to_string_lossy().to_string()),
            icon: instrument
                .icon_path()
                .map(|path| path.to_string_lossy().to_string()),
            pitch: Some(instrument.pitch()),
            press: Some(instrument.press()),
        }
    }
}
