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
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::audio::{DeviceError, OutputFormat, SampleFormat};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BITS_PER_SAMPLE: u16 = 32;
const DEFAULT_MASTER_VOLUME: f32 = 1.0;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. "default" picks the host default; names starting with "mock"
    /// open a device that renders without hardware.
    #[serde(default = "default_device")]
    device: String,

    /// Output sample rate in Hz (default: 44100)
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,

    /// Output channels (default: 2)
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u16>,

    /// Output sample format, "float" or "int" (default: "float")
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_format: Option<String>,

    /// Bits per sample (default: 32)
    #[serde(skip_serializing_if = "Option::is_none")]
    bits_per_sample: Option<u16>,

    /// Master gain applied after mixing (default: 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    master_volume: Option<f32>,

    /// Fixed CPAL stream buffer in frames. Unset uses the backend default.
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_buffer_frames: Option<u32>,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(DEFAULT_DEVICE)
    }
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
            sample_format: None,
            bits_per_sample: None,
            master_volume: None,
            stream_buffer_frames: None,
        }
    }

    /// Returns a copy with every default spelled out, for printing.
    pub fn with_defaults(&self) -> Audio {
        Audio {
            device: self.device.clone(),
            sample_rate: Some(self.sample_rate()),
            channels: Some(self.channels()),
            sample_format: Some(
                self.sample_format
                    .clone()
                    .unwrap_or_else(|| SampleFormat::Float.to_string()),
            ),
            bits_per_sample: Some(self.bits_per_sample()),
            master_volume: Some(self.master_volume()),
            stream_buffer_frames: self.stream_buffer_frames,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    /// Returns the output sample format (default: Float)
    pub fn sample_format(&self) -> Result<SampleFormat, DeviceError> {
        match self.sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format),
            None => Ok(SampleFormat::Float),
        }
    }

    /// Returns the bits per sample (default: 32)
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    /// Returns the master volume, clamped to 0.0-1.0 (default: 1.0)
    pub fn master_volume(&self) -> f32 {
        match self.master_volume {
            Some(volume) if volume.is_finite() => volume.clamp(0.0, 1.0),
            _ => DEFAULT_MASTER_VOLUME,
        }
    }

    /// Returns the fixed stream buffer size in frames, if any.
    pub fn stream_buffer_frames(&self) -> Option<u32> {
        self.stream_buffer_frames.filter(|frames| *frames > 0)
    }

    /// Builds and validates the output format.
    pub fn output_format(&self) -> Result<OutputFormat, DeviceError> {
        OutputFormat::new(
            self.sample_rate(),
            self.channels(),
            self.sample_format()?,
            self.bits_per_sample(),
        )
    }
}
