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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};

use super::audio::Audio;
use super::error::ConfigError;
use super::instrument::Instrument;
use crate::instruments;

/// Default maximum number of concurrent voices.
pub const DEFAULT_MAX_VOICES: usize = 32;

/// Default directory holding instrument samples, relative to the config file.
const DEFAULT_SOUNDS_DIR: &str = "sounds";

/// Which voice to drop when the voice limit is reached.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Drop the voice that started first.
    #[default]
    Oldest,
    /// Drop the voice with the lowest trigger volume.
    Quietest,
}

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Engine {
    /// Output device settings.
    #[serde(default)]
    audio: Audio,

    /// Maximum concurrent voices (default: 32)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_voices: Option<usize>,

    /// Which voice to evict at the limit (default: oldest)
    #[serde(default)]
    eviction: EvictionPolicy,

    /// Directory holding instrument samples (default: "sounds")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sounds_dir: Option<String>,

    /// Instrument set. Unset uses the sixteen default instruments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instruments: Option<Vec<Instrument>>,

    /// Directory of the file this was loaded from. Relative paths resolve against it.
    #[serde(skip)]
    base_path: Option<PathBuf>,
}

impl Engine {
    /// Creates an engine configuration with defaults for everything but the audio settings.
    pub fn new(audio: Audio) -> Engine {
        Engine {
            audio,
            ..Default::default()
        }
    }

    /// Parse an engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Engine, ConfigError> {
        let mut engine = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Engine>()?;
        engine.base_path = path.parent().map(Path::to_path_buf);
        engine.validate()?;
        Ok(engine)
    }

    /// The default configuration with every value spelled out.
    pub fn defaults() -> Engine {
        Engine {
            audio: Audio::default().with_defaults(),
            max_voices: Some(DEFAULT_MAX_VOICES),
            eviction: EvictionPolicy::default(),
            sounds_dir: Some(DEFAULT_SOUNDS_DIR.to_string()),
            instruments: Some(
                instruments::default_instruments()
                    .iter()
                    .map(Instrument::from)
                    .collect(),
            ),
            base_path: None,
        }
    }

    /// Checks the fields that deserialization alone can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_voices == Some(0) {
            return Err(ConfigError::invalid("max_voices", "must be at least 1"));
        }
        if let Some(instruments) = &self.instruments {
            if instruments.is_empty() {
                return Err(ConfigError::invalid(
                    "instruments",
                    "must list at least one instrument when present",
                ));
            }
            for instrument in instruments {
                instrument.validate()?;
            }
        }
        Ok(())
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Returns the voice limit (default: 32)
    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES)
    }

    /// Returns the eviction policy.
    pub fn eviction(&self) -> EvictionPolicy {
        self.eviction
    }

    /// Returns the sounds directory, resolved against the config file's directory.
    pub fn sounds_dir(&self) -> PathBuf {
        let dir = PathBuf::from(self.sounds_dir.as_deref().unwrap_or(DEFAULT_SOUNDS_DIR));
        match &self.base_path {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir,
        }
    }

    /// Returns the configured instruments, or the defaults when none are configured.
    pub fn instruments(&self) -> Vec<instruments::Instrument> {
        match &self.instruments {
            Some(instruments) => instruments.iter().map(Instrument::to_instrument).collect(),
            None => instruments::default_instruments(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test]
    fn test_engine_defaults() {
        let engine = Engine::new(Audio::new("mock-device"));
        assert_eq!(engine.max_voices(), DEFAULT_MAX_VOICES);
        assert_eq!(engine.eviction(), EvictionPolicy::Oldest);
        assert_eq!(engine.sounds_dir(), PathBuf::from("sounds"));
        assert_eq!(engine.instruments().len(), 16);
    }

    #[test]
    fn test_engine_deserialize() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.yaml");
        fs::write(
            &path,
            r#"
audio:
  device: mock-device
  sample_rate: 48000
max_voices: 4
eviction: quietest
sounds_dir: samples
instruments:
  - name: Piano
    sound: piano.ogg
  - name: Drum
    sound: drum.wav
    press: true
"#,
        )?;

        let engine = Engine::deserialize(&path)?;
        assert_eq!(engine.audio().device(), "mock-device");
        assert_eq!(engine.audio().sample_rate(), 48000);
        assert_eq!(engine.max_voices(), 4);
        assert_eq!(engine.eviction(), EvictionPolicy::Quietest);
        assert_eq!(engine.sounds_dir(), dir.path().join("samples"));

        let instruments = engine.instruments();
        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].name(), "Piano");
        assert!(instruments[1].press());
        Ok(())
    }

    #[test]
    fn test_engine_validation() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.yaml");
        fs::write(&path, "max_voices: 0\n")?;
        assert!(matches!(
            Engine::deserialize(&path),
            Err(ConfigError::Invalid { .. })
        ));

        assert!(matches!(
            Engine::deserialize(&dir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
        Ok(())
    }

    #[test]
    fn test_defaults_round_trip_through_yaml() -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yml::to_string(&Engine::defaults())?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("defaults.yaml");
        fs::write(&path, yaml)?;

        let engine = Engine::deserialize(&path)?;
        assert_eq!(engine.max_voices(), DEFAULT_MAX_VOICES);
        assert_eq!(engine.audio().device(), "default");
        let instruments = engine.instruments();
        assert_eq!(instruments.len(), 16);
        assert_eq!(instruments[15].name(), "Pling");
        Ok(())
    }
}
