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
//! Plays tick-based note sequences through the sample engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, span, warn, Level};

use crate::config::{ConfigError, Layer, Note, Sequence};
use crate::instruments::{InstrumentBank, InstrumentId};
use crate::playsync::CancelHandle;
use crate::samples::SampleEngine;

/// Below this, waits spin instead of blocking on the cancel handle.
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Layer used when a sequence declares none.
const DEFAULT_LAYER_VOLUME: u8 = 100;
const DEFAULT_LAYER_PANNING: u8 = 100;

/// Failures that stop a sequence before it starts.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("invalid tempo {0}, must be a positive number of ticks per second")]
    InvalidTempo(f64),

    #[error("note at tick {tick} uses instrument {instrument}, which does not exist")]
    UnknownInstrument { tick: u64, instrument: InstrumentId },

    #[error("note at tick {0} is too far from the start to schedule")]
    TickOutOfRange(u64),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// How a sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Every note was scheduled and the tail rang out.
    Finished { triggered: usize },
    /// The cancel handle fired. All voices were stopped.
    Cancelled { triggered: usize },
}

/// A note ready to trigger.
#[derive(Debug, Clone, PartialEq)]
struct ScheduledNote {
    tick: u64,
    offset: Duration,
    instrument: InstrumentId,
    volume: f32,
    pitch_ratio: f32,
    panning: f32,
}

/// Volume (0-1) and panning (-1 to 1) for a note on a layer.
fn note_mix(layer_volume: u8, layer_panning: u8, note: &Note) -> (f32, f32) {
    let volume = (layer_volume as f32 / 100.0) * (note.velocity() as f32 / 100.0);
    let panning =
        ((layer_panning as f32 - 100.0) + (note.panning() as f32 - 100.0)) / 200.0;
    (volume.clamp(0.0, 1.0), panning.clamp(-1.0, 1.0))
}

/// Plays sequences on an engine using an instrument bank.
pub struct Sequencer {
    engine: Arc<SampleEngine>,
    bank: Arc<InstrumentBank>,
}

impl Sequencer {
    pub fn new(engine: Arc<SampleEngine>, bank: Arc<InstrumentBank>) -> Sequencer {
        Sequencer { engine, bank }
    }

    /// Resolves every audible note into trigger parameters, ordered by tick.
    fn schedule(&self, sequence: &Sequence) -> Result<Vec<ScheduledNote>, SequenceError> {
        let tempo = sequence.tempo();
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(SequenceError::InvalidTempo(tempo));
        }

        let layers = sequence.layers();
        let any_solo = layers.iter().any(Layer::solo);

        let mut scheduled = Vec::with_capacity(sequence.notes().len());
        for note in sequence.notes() {
            let Some(instrument) = self.bank.get(note.instrument()) else {
                return Err(SequenceError::UnknownInstrument {
                    tick: note.tick(),
                    instrument: note.instrument(),
                });
            };

            let (layer_volume, layer_panning) = if layers.is_empty() {
                (DEFAULT_LAYER_VOLUME, DEFAULT_LAYER_PANNING)
            } else {
                let Some(layer) = layers.get(note.layer()) else {
                    warn!(
                        tick = note.tick(),
                        layer = note.layer(),
                        "Note is on a layer that does not exist, skipping"
                    );
                    continue;
                };
                if any_solo && !layer.solo() {
                    continue;
                }
                (layer.volume(), layer.panning())
            };
            if layer_volume == 0 || note.velocity() == 0 {
                continue;
            }

            let (volume, panning) = note_mix(layer_volume, layer_panning, note);
            scheduled.push(ScheduledNote {
                tick: note.tick(),
                offset: sequence.tick_offset(note.tick())?,
                instrument: note.instrument(),
                volume,
                pitch_ratio: instrument.pitch_ratio(note.key(), note.pitch()),
                panning,
            });
        }

        scheduled.sort_by_key(|note| note.tick);
        Ok(scheduled)
    }

    /// Plays the sequence, blocking until it finishes or is cancelled.
    pub fn play(
        &self,
        sequence: &Sequence,
        cancel_handle: CancelHandle,
    ) -> Result<SequenceOutcome, SequenceError> {
        let span = span!(Level::INFO, "play sequence");
        let _enter = span.enter();

        let tail = sequence.tail()?;
        let scheduled = self.schedule(sequence)?;
        info!(
            notes = scheduled.len(),
            tempo = sequence.tempo(),
            length_ticks = sequence.length_ticks(),
            "Playing sequence"
        );

        let start = Instant::now();
        let mut triggered = 0;
        for note in &scheduled {
            let Some(deadline) = start.checked_add(note.offset) else {
                self.engine.stop_all();
                return Err(SequenceError::TickOutOfRange(note.tick));
            };
            if wait_until(deadline, &cancel_handle) {
                return Ok(self.cancel(triggered));
            }

            if self
                .engine
                .play_sound(note.instrument, note.volume, note.pitch_ratio, note.panning)
                .is_ok()
            {
                triggered += 1;
            }
        }

        debug!(tail = ?tail, "Waiting for the last voices to ring out");
        if cancel_handle.wait_timeout(tail) {
            return Ok(self.cancel(triggered));
        }

        info!(triggered, "Sequence finished");
        Ok(SequenceOutcome::Finished { triggered })
    }

    fn cancel(&self, triggered: usize) -> SequenceOutcome {
        self.engine.stop_all();
        info!(triggered, "Sequence cancelled");
        SequenceOutcome::Cancelled { triggered }
    }
}

/// Sleeps until the deadline. Returns true if cancelled first.
fn wait_until(deadline: Instant, cancel_handle: &CancelHandle) -> bool {
    let now = Instant::now();
    if deadline > now {
        let remaining = deadline - now;
        if remaining > SPIN_THRESHOLD && cancel_handle.wait_timeout(remaining - SPIN_THRESHOLD) {
            return true;
        }
        let now = Instant::now();
        if deadline > now {
            spin_sleep::sleep(deadline - now);
        }
    }
    cancel_handle.is_cancelled()
}
