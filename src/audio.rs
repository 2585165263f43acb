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
use std::{fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod error;
pub mod format;
pub mod mixer;
pub mod mock;
pub mod sample_source;
mod thread_priority;

pub use error::DeviceError;
pub use format::{OutputFormat, SampleFormat};
pub use mixer::AudioMixer;

/// Sending half of the trigger queue feeding the render thread.
pub type VoiceSender = crossbeam_channel::Sender<mixer::ActiveVoice>;
/// Receiving half of the trigger queue, drained by the render thread.
pub type VoiceReceiver = crossbeam_channel::Receiver<mixer::ActiveVoice>;

/// Number of frames mixed per render block.
pub(crate) const BLOCK_FRAMES: usize = 512;

/// An output device that pulls audio from the mixer on its own threads.
pub trait Device: fmt::Display + Send {
    /// The format the device was opened with. The mixer renders in this format.
    fn format(&self) -> &OutputFormat;

    /// Starts rendering. New voices arrive on `voice_rx`.
    fn start(&mut self, mixer: Arc<AudioMixer>, voice_rx: VoiceReceiver)
        -> Result<(), DeviceError>;

    /// Stops rendering and joins the render threads. Safe to call more than once.
    fn stop(&mut self);

    #[cfg(test)]
    fn to_mock(&self) -> Option<&mock::Device>;
}

/// A listed output device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<DeviceInfo>, DeviceError> {
    cpal::Device::list()
}

/// Opens the device named in the configuration. Names starting with "mock" open a
/// hardware-free device that renders in real time.
pub fn get_device(config: &config::Audio) -> Result<Box<dyn Device>, DeviceError> {
    let format = config.output_format()?;
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Box::new(mock::Device::new(device, format)));
    }

    Ok(Box::new(cpal::Device::get(config, format)?))
}
