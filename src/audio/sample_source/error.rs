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
/// Errors raised while decoding a sample file.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The container or codec can't be handled.
    #[error("unsupported sample: {0}")]
    Format(String),

    #[error("caller passed {actual} channel buffers for a {expected} channel sample")]
    ChannelCount { expected: usize, actual: usize },

    #[error("codec error: {0}")]
    Codec(#[from] symphonia::core::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
