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

//! Voice management for polyphonic sample playback.
//!
//! The engine keeps a [`Voice`] record per trigger so it can enforce the voice cap. The
//! mixer owns the rendering side of the same voice; both sides share a [`SharedVoiceState`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::config::EvictionPolicy;
use crate::instruments::InstrumentId;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one triggered voice.
pub type VoiceId = u64;

/// Returns a fresh, process-unique voice ID.
pub fn next_voice_id() -> VoiceId {
    NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Lifecycle of a voice. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Accepted by the engine, not yet picked up by the mixer.
    Triggered,
    /// At least one frame has been rendered.
    Playing,
    /// Exhausted or cancelled. The mixer has dropped it.
    Finished,
}

impl VoiceState {
    fn from_u8(value: u8) -> VoiceState {
        match value {
            0 => VoiceState::Triggered,
            1 => VoiceState::Playing,
            _ => VoiceState::Finished,
        }
    }
}

struct VoiceStateInner {
    state: AtomicU8,
    cancelled: AtomicBool,
}

/// Lock-free voice state shared between the engine and the audio thread.
#[derive(Clone)]
pub struct SharedVoiceState {
    inner: Arc<VoiceStateInner>,
}

impl SharedVoiceState {
    pub fn new() -> SharedVoiceState {
        SharedVoiceState {
            inner: Arc::new(VoiceStateInner {
                state: AtomicU8::new(VoiceState::Triggered as u8),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn get(&self) -> VoiceState {
        VoiceState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Moves Triggered to Playing. Has no effect on a finished voice.
    pub fn mark_playing(&self) {
        let _ = self.inner.state.compare_exchange(
            VoiceState::Triggered as u8,
            VoiceState::Playing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn mark_finished(&self) {
        self.inner
            .state
            .store(VoiceState::Finished as u8, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.get() == VoiceState::Finished
    }

    /// Requests the mixer to drop this voice on its next block.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

impl Default for SharedVoiceState {
    fn default() -> Self {
        Self::new()
    }
}

/// The engine-side record of a triggered voice.
pub struct Voice {
    id: VoiceId,
    instrument: InstrumentId,
    /// Effective (clamped) trigger volume, used by quietest-first eviction.
    volume: f32,
    start_time: Instant,
    state: SharedVoiceState,
}

impl Voice {
    pub fn new(
        id: VoiceId,
        instrument: InstrumentId,
        volume: f32,
        state: SharedVoiceState,
    ) -> Self {
        Self {
            id,
            instrument,
            volume,
            start_time: Instant::now(),
            state,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn state(&self) -> VoiceState {
        self.state.get()
    }
}

/// Tracks in-flight voices and enforces the global voice cap.
pub struct VoiceManager {
    voices: Vec<Voice>,
    max_voices: usize,
    eviction: EvictionPolicy,
}

impl VoiceManager {
    pub fn new(max_voices: usize, eviction: EvictionPolicy) -> Self {
        Self {
            voices: Vec::with_capacity(max_voices),
            max_voices: max_voices.max(1),
            eviction,
        }
    }

    /// Drops records of voices the mixer has finished with.
    fn reap(&mut self) {
        self.voices.retain(|v| !v.state.is_finished());
    }

    /// Adds a new voice, evicting existing voices while the cap is reached.
    /// Returns the IDs of the evicted voices; they have already been cancelled.
    pub fn add_voice(&mut self, voice: Voice) -> Vec<VoiceId> {
        self.reap();

        let mut evicted = Vec::new();
        while self.voices.len() >= self.max_voices {
            let Some(index) = self.victim_index() else {
                break;
            };
            let victim = self.voices.remove(index);
            victim.state.cancel();
            debug!(
                voice = victim.id,
                instrument = victim.instrument,
                policy = ?self.eviction,
                max_voices = self.max_voices,
                "Voice limit reached, evicting voice"
            );
            evicted.push(victim.id);
        }

        self.voices.push(voice);
        evicted
    }

    fn victim_index(&self) -> Option<usize> {
        match self.eviction {
            EvictionPolicy::Oldest => self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.start_time)
                .map(|(i, _)| i),
            // Ties go to the oldest voice; the list is in trigger order.
            EvictionPolicy::Quietest => self
                .voices
                .iter()
                .enumerate()
                .min_by(|(ia, a), (ib, b)| a.volume.total_cmp(&b.volume).then(ia.cmp(ib)))
                .map(|(i, _)| i),
        }
    }

    /// Returns the state of a voice still tracked by the manager.
    pub fn voice_state(&self, id: VoiceId) -> Option<VoiceState> {
        self.voices.iter().find(|v| v.id == id).map(|v| v.state())
    }

    /// Returns the number of voices that have not finished.
    pub fn active_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| !v.state.is_finished())
            .count()
    }

    /// Cancels and forgets every voice. Returns how many were still active.
    pub fn clear(&mut self) -> usize {
        let active = self.active_count();
        for voice in self.voices.drain(..) {
            voice.state.cancel();
        }
        active
    }
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.active_count())
            .field("max_voices", &self.max_voices)
            .field("eviction", &self.eviction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_voice(instrument: InstrumentId, volume: f32) -> (Voice, SharedVoiceState) {
        let state = SharedVoiceState::new();
        (
            Voice::new(next_voice_id(), instrument, volume, state.clone()),
            state,
        )
    }

    #[test]
    fn test_state_transitions() {
        let state = SharedVoiceState::new();
        assert_eq!(state.get(), VoiceState::Triggered);
        state.mark_playing();
        assert_eq!(state.get(), VoiceState::Playing);
        state.mark_finished();
        state.mark_playing();
        assert_eq!(state.get(), VoiceState::Finished);
    }

    #[test]
    fn test_cancel_does_not_finish() {
        let state = SharedVoiceState::new();
        state.cancel();
        assert!(state.is_cancelled());
        // Only the mixer finishes a voice.
        assert_eq!(state.get(), VoiceState::Triggered);
    }

    #[test]
    fn test_evict_oldest() {
        let mut manager = VoiceManager::new(2, EvictionPolicy::Oldest);

        let (first, first_state) = make_voice(0, 1.0);
        let first_id = first.id();
        assert!(manager.add_voice(first).is_empty());
        let (second, _) = make_voice(1, 0.1);
        assert!(manager.add_voice(second).is_empty());

        let (third, _) = make_voice(2, 0.5);
        let evicted = manager.add_voice(third);
        assert_eq!(evicted, vec![first_id]);
        assert!(first_state.is_cancelled());
        assert_eq!(manager.active_count(), 2);
        assert_eq!(manager.voice_state(first_id), None);
    }

    #[test]
    fn test_evict_quietest() {
        let mut manager = VoiceManager::new(3, EvictionPolicy::Quietest);

        let (loud, _) = make_voice(0, 0.9);
        let (quiet, quiet_state) = make_voice(0, 0.2);
        let quiet_id = quiet.id();
        let (medium, _) = make_voice(0, 0.5);
        manager.add_voice(loud);
        manager.add_voice(quiet);
        manager.add_voice(medium);

        let (next, _) = make_voice(0, 0.7);
        assert_eq!(manager.add_voice(next), vec![quiet_id]);
        assert!(quiet_state.is_cancelled());
    }

    #[test]
    fn test_quietest_tie_goes_to_oldest() {
        let mut manager = VoiceManager::new(2, EvictionPolicy::Quietest);
        let (a, _) = make_voice(0, 0.5);
        let a_id = a.id();
        let (b, _) = make_voice(0, 0.5);
        manager.add_voice(a);
        manager.add_voice(b);

        let (c, _) = make_voice(0, 0.5);
        assert_eq!(manager.add_voice(c), vec![a_id]);
    }

    #[test]
    fn test_finished_voices_are_reaped() {
        let mut manager = VoiceManager::new(1, EvictionPolicy::Oldest);
        let (first, first_state) = make_voice(0, 1.0);
        manager.add_voice(first);
        assert_eq!(manager.active_count(), 1);

        first_state.mark_finished();
        assert_eq!(manager.active_count(), 0);

        // The finished voice frees its slot instead of being evicted.
        let (second, _) = make_voice(0, 1.0);
        assert!(manager.add_voice(second).is_empty());
        assert!(!first_state.is_cancelled());
    }

    #[test]
    fn test_clear() {
        let mut manager = VoiceManager::new(8, EvictionPolicy::Oldest);
        let states: Vec<SharedVoiceState> = (0..3)
            .map(|i| {
                let (voice, state) = make_voice(i, 1.0);
                manager.add_voice(voice);
                state
            })
            .collect();

        assert_eq!(manager.clear(), 3);
        assert_eq!(manager.active_count(), 0);
        assert!(states.iter().all(|s| s.is_cancelled()));
    }
}
