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
//! Note block instruments and the key to pitch mapping.

use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use tracing::{info, span, warn, Level};

use crate::samples::SampleEngine;

/// Index of an instrument in the active set. Doubles as the engine's sample ID.
pub type InstrumentId = u32;

/// Key at which a sample plays at its recorded pitch (F#4).
pub const DEFAULT_PITCH: u8 = 45;

/// Two octaves of keys a vanilla note block can play.
pub const KEY_RANGE: RangeInclusive<u8> = 33..=57;

/// Highest key on the 88-key piano.
pub const MAX_KEY: u8 = 87;

/// Playback-rate factor for a key relative to the default base pitch.
pub fn pitch_ratio(key: u8) -> f32 {
    pitch_ratio_for(key, DEFAULT_PITCH, 0)
}

/// Playback-rate factor for a key on an instrument with the given base pitch and a
/// fine tune in cents.
pub fn pitch_ratio_for(key: u8, base_pitch: u8, cents: i16) -> f32 {
    let semitones = key as f64 - base_pitch as f64 + cents as f64 / 100.0;
    2f64.powf(semitones / 12.0) as f32
}

/// A display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// An instrument a note can be played on.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    name: String,
    color: Rgb,
    pitch: u8,
    press: bool,
    sound_path: Option<PathBuf>,
    icon_path: Option<PathBuf>,
}

impl Instrument {
    pub fn new(name: &str, color: Rgb) -> Instrument {
        Instrument {
            name: name.to_string(),
            color,
            pitch: DEFAULT_PITCH,
            press: false,
            sound_path: None,
            icon_path: None,
        }
    }

    pub fn with_sound(mut self, sound_path: Option<PathBuf>) -> Instrument {
        self.sound_path = sound_path;
        self
    }

    pub fn with_icon(mut self, icon_path: Option<PathBuf>) -> Instrument {
        self.icon_path = icon_path;
        self
    }

    pub fn with_pitch(mut self, pitch: u8) -> Instrument {
        self.pitch = pitch;
        self
    }

    pub fn with_press(mut self, press: bool) -> Instrument {
        self.press = press;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    /// Key at which the sample plays unshifted.
    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    /// True if the sound sustains while its key is held, false if it fires once per press.
    pub fn press(&self) -> bool {
        self.press
    }

    pub fn sound_path(&self) -> Option<&Path> {
        self.sound_path.as_deref()
    }

    pub fn icon_path(&self) -> Option<&Path> {
        self.icon_path.as_deref()
    }

    /// Playback-rate factor for a key on this instrument.
    pub fn pitch_ratio(&self, key: u8, cents: i16) -> f32 {
        pitch_ratio_for(key, self.pitch, cents)
    }
}

/// The stock instruments, in the order note block files index them.
pub fn default_instruments() -> Vec<Instrument> {
    const DEFAULTS: [(&str, Rgb, bool); 16] = [
        ("Harp", Rgb::new(25, 100, 172), true),
        ("Double Bass", Rgb::new(60, 142, 72), false),
        ("Bass Drum", Rgb::new(190, 107, 107), false),
        ("Snare Drum", Rgb::new(190, 190, 25), false),
        ("Click", Rgb::new(157, 90, 152), true),
        ("Guitar", Rgb::new(77, 60, 152), true),
        ("Flute", Rgb::new(190, 182, 92), true),
        ("Bell", Rgb::new(190, 25, 190), true),
        ("Chime", Rgb::new(82, 142, 157), true),
        ("Xylophone", Rgb::new(190, 190, 190), true),
        ("Iron Xylophone", Rgb::new(25, 145, 190), true),
        ("Cow Bell", Rgb::new(190, 35, 40), true),
        ("Didgeridoo", Rgb::new(190, 87, 40), true),
        ("Bit", Rgb::new(25, 190, 25), true),
        ("Banjo", Rgb::new(190, 25, 87), true),
        ("Pling", Rgb::new(87, 87, 87), true),
    ];

    DEFAULTS
        .iter()
        .map(|(name, color, press)| {
            let stem = name.to_lowercase().replace(' ', "_");
            Instrument::new(name, *color)
                .with_sound(Some(PathBuf::from(format!("{}.ogg", stem))))
                .with_icon(Some(PathBuf::from(format!("{}.png", stem))))
                .with_press(*press)
        })
        .collect()
}

/// The active instrument set, with each instrument's sample loaded into the engine
/// under the instrument's index.
#[derive(Debug)]
pub struct InstrumentBank {
    instruments: Vec<Instrument>,
    loaded: Vec<bool>,
}

impl InstrumentBank {
    /// Loads every instrument's sample. Relative sound paths resolve against `sounds_dir`.
    /// Failures are logged and leave the instrument silent; they never shift later IDs.
    pub fn load(
        engine: &SampleEngine,
        instruments: Vec<Instrument>,
        sounds_dir: &Path,
    ) -> InstrumentBank {
        let span = span!(Level::INFO, "load instruments");
        let _enter = span.enter();

        let mut loaded = Vec::with_capacity(instruments.len());
        for (id, instrument) in instruments.iter().enumerate() {
            let Some(sound_path) = instrument.sound_path() else {
                info!(instrument = instrument.name(), "Instrument has no sound");
                loaded.push(false);
                continue;
            };
            let path = if sound_path.is_absolute() {
                sound_path.to_path_buf()
            } else {
                sounds_dir.join(sound_path)
            };

            match engine.load_sound_as(id as InstrumentId, &path) {
                Ok(()) => loaded.push(true),
                Err(e) => {
                    warn!(
                        instrument = instrument.name(),
                        path = ?path,
                        err = %e,
                        "Failed to load instrument sound, instrument will be silent"
                    );
                    loaded.push(false);
                }
            }
        }

        let bank = InstrumentBank {
            instruments,
            loaded,
        };
        info!(
            loaded = bank.loaded_count(),
            failed = bank.len() - bank.loaded_count(),
            "Instruments loaded"
        );
        bank
    }

    pub fn get(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(id as usize)
    }

    /// True if the instrument exists and its sample loaded.
    pub fn is_loaded(&self, id: InstrumentId) -> bool {
        self.loaded.get(id as usize).copied().unwrap_or(false)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.iter().filter(|loaded| **loaded).count()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstrumentId, &Instrument, bool)> {
        self.instruments
            .iter()
            .zip(self.loaded.iter())
            .enumerate()
            .map(|(id, (instrument, loaded))| (id as InstrumentId, instrument, *loaded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::testutil::write_wav;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_pitch_ratio() {
        assert_close(pitch_ratio(45), 1.0);
        assert_close(pitch_ratio(57), 2.0);
        assert_close(pitch_ratio(33), 0.5);
        assert_close(pitch_ratio(46), 2f32.powf(1.0 / 12.0));
    }

    #[test]
    fn test_pitch_ratio_base_and_cents() {
        // A sample recorded an octave up plays unshifted at key 57.
        assert_close(pitch_ratio_for(57, 57, 0), 1.0);
        assert_close(pitch_ratio_for(45, 45, 1200), 2.0);
        assert_close(pitch_ratio_for(45, 45, -100), pitch_ratio(44));
    }

    #[test]
    fn test_key_range_spans_two_octaves() {
        assert_close(
            pitch_ratio(*KEY_RANGE.end()) / pitch_ratio(*KEY_RANGE.start()),
            4.0,
        );
        assert!(KEY_RANGE.contains(&DEFAULT_PITCH));
    }

    #[test]
    fn test_default_instruments() {
        let instruments = default_instruments();
        assert_eq!(instruments.len(), 16);

        let harp = &instruments[0];
        assert_eq!(harp.name(), "Harp");
        assert_eq!(harp.color(), Rgb::new(25, 100, 172));
        assert_eq!(harp.sound_path(), Some(Path::new("harp.ogg")));
        assert_eq!(harp.icon_path(), Some(Path::new("harp.png")));
        assert!(harp.press());
        assert_eq!(harp.pitch(), DEFAULT_PITCH);

        let bass = &instruments[1];
        assert_eq!(bass.sound_path(), Some(Path::new("double_bass.ogg")));
        assert!(!bass.press());
        // Percussion fires once per press.
        assert!(!instruments[2].press() && !instruments[3].press());

        assert_eq!(
            instruments[10].sound_path(),
            Some(Path::new("iron_xylophone.ogg"))
        );
        assert_eq!(instruments[15].name(), "Pling");
    }

    #[test]
    fn test_rgb_display() {
        assert_eq!(Rgb::new(25, 100, 172).to_string(), "#1964ac");
    }

    #[test]
    fn test_bank_skips_failures_without_shifting() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        write_wav(&dir.path().join("good.wav"), &[vec![1000i16; 441]], 44100)?;

        let engine = SampleEngine::new(&config::Engine::new(config::Audio::new("mock-bank")))?;
        let instruments = vec![
            Instrument::new("Missing", Rgb::default())
                .with_sound(Some(PathBuf::from("missing.wav"))),
            Instrument::new("Silent", Rgb::default()),
            Instrument::new("Good", Rgb::default()).with_sound(Some(PathBuf::from("good.wav"))),
        ];

        let bank = InstrumentBank::load(&engine, instruments, dir.path());
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.loaded_count(), 1);
        assert!(!bank.is_loaded(0));
        assert!(!bank.is_loaded(1));
        assert!(bank.is_loaded(2));
        assert!(!bank.is_loaded(3));
        assert_eq!(bank.get(2).map(Instrument::name), Some("Good"));

        // The good sample kept its index.
        assert!(engine.play_sound(2, 0.5, 1.0, 0.0).is_ok());
        assert!(engine.play_sound(0, 0.5, 1.0, 0.0).is_err());
        Ok(())
    }
}
