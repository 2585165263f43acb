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
//! Decoding of sample files into planar f32 chunks.

use std::path::Path;

pub mod audio;
pub mod error;
#[cfg(test)]
pub mod memory;
pub mod traits;

pub use error::DecodeError;
pub use traits::{read_interleaved, SampleSource};

#[cfg(test)]
pub use memory::MemorySampleSource;

/// Opens a sample file. The container is probed from its contents, with the
/// extension as a hint.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Box<dyn SampleSource>, DecodeError> {
    Ok(Box::new(audio::AudioSampleSource::from_file(path)?))
}
