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
//! A sequenced sample-playback engine for note block music.
//!
//! Instrument samples are decoded into memory once and triggered with
//! [`SampleEngine::play_sound`] at a pitch ratio, volume and pan. Rendering runs on
//! its own thread; triggering never blocks on it.

pub mod audio;
pub mod config;
pub mod instruments;
pub mod playsync;
pub mod samples;
pub mod sequencer;
#[cfg(test)]
mod testutil;

pub use instruments::{InstrumentBank, InstrumentId};
pub use samples::{LoadError, PlayError, SampleEngine, VoiceId, VoiceState};
pub use sequencer::{SequenceError, SequenceOutcome, Sequencer};
