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

/// Failures opening or running an output device. These are reported once when the
/// engine starts, never per trigger.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no output device found with name {0}")]
    NotFound(String),

    #[error("the audio host has no default output device")]
    NoDefault,

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("device {device} supports {supported} channels, {requested} requested")]
    TooManyChannels {
        device: String,
        supported: u16,
        requested: u16,
    },

    #[error("audio host error: {0}")]
    Host(String),

    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("failed to spawn render thread: {0}")]
    Thread(#[from] std::io::Error),

    #[error("device is already running")]
    AlreadyStarted,
}
