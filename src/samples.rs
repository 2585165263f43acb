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
//! Instrument samples: decoded and cached in memory, then triggered as voices
//! under a global polyphony cap.

mod engine;
mod loader;
pub mod voice;

pub use engine::{PlayError, SampleEngine, MAX_PITCH_RATIO, MIN_PITCH_RATIO};
pub use loader::{LoadError, LoadedSample, SampleLoader};
pub use voice::{VoiceId, VoiceManager, VoiceState};
