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

use std::{fmt, str::FromStr, time::Duration};

use super::error::DeviceError;

/// Maximum number of output channels a device stream may be opened with.
pub const MAX_OUTPUT_CHANNELS: u16 = 32;

/// Sample format of the device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed integer samples (16 or 32 bit).
    Int,
    /// 32-bit floating point samples.
    Float,
}

impl FromStr for SampleFormat {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(DeviceError::UnsupportedFormat(format!(
                "unknown sample format '{}'",
                s
            ))),
        }
    }
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The format the mixer renders in and the device stream is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved output channels
    pub channels: u16,
    /// Stream sample format
    pub sample_format: SampleFormat,
    /// Bits per sample (16 or 32 for integer streams, always 32 for float)
    pub bits_per_sample: u16,
}

impl OutputFormat {
    /// Creates and validates an output format.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, DeviceError> {
        if sample_rate == 0 {
            return Err(DeviceError::UnsupportedFormat(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        if channels == 0 || channels > MAX_OUTPUT_CHANNELS {
            return Err(DeviceError::UnsupportedFormat(format!(
                "{} output channels requested, expected 1-{}",
                channels, MAX_OUTPUT_CHANNELS
            )));
        }
        match (sample_format, bits_per_sample) {
            (SampleFormat::Float, 32) | (SampleFormat::Int, 16) | (SampleFormat::Int, 32) => {}
            (format, bits) => {
                return Err(DeviceError::UnsupportedFormat(format!(
                    "{}-bit {} samples",
                    bits, format
                )))
            }
        }

        Ok(OutputFormat {
            sample_rate,
            channels,
            sample_format,
            bits_per_sample,
        })
    }

    /// Wall-clock duration of the given number of frames.
    pub fn frames_to_duration(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Number of frames covering the given duration, rounded up.
    pub fn duration_to_frames(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64).ceil() as usize
    }
}

impl Default for OutputFormat {
    /// Stereo 44.1kHz float, which every backend we target can open.
    fn default() -> Self {
        OutputFormat {
            sample_rate: 44100,
            channels: 2,
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_from_str() {
        assert_eq!(
            SampleFormat::from_str("float").unwrap(),
            SampleFormat::Float
        );
        assert_eq!(SampleFormat::from_str("Int").unwrap(), SampleFormat::Int);
        assert!(SampleFormat::from_str("double").is_err());
        assert!(SampleFormat::from_str("").is_err());
    }

    #[test]
    fn test_output_format_validation() {
        assert!(OutputFormat::new(48000, 2, SampleFormat::Float, 32).is_ok());
        assert!(OutputFormat::new(48000, 2, SampleFormat::Int, 16).is_ok());
        assert!(OutputFormat::new(0, 2, SampleFormat::Float, 32).is_err());
        assert!(OutputFormat::new(48000, 0, SampleFormat::Float, 32).is_err());
        assert!(OutputFormat::new(48000, 64, SampleFormat::Float, 32).is_err());
        assert!(OutputFormat::new(48000, 2, SampleFormat::Float, 16).is_err());
        assert!(OutputFormat::new(48000, 2, SampleFormat::Int, 24).is_err());
    }

    #[test]
    fn test_frame_conversions() {
        let format = OutputFormat::default();
        assert_eq!(format.duration_to_frames(Duration::from_secs(1)), 44100);
        assert_eq!(
            format.frames_to_duration(22050),
            Duration::from_millis(500)
        );
    }
}
