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
// Core audio mixing logic shared by the CPAL and mock devices
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::VoiceReceiver;
use crate::samples::voice::{SharedVoiceState, VoiceId};

/// Left and right channel gains for a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanGains {
    pub left: f32,
    pub right: f32,
}

impl PanGains {
    /// Computes gains from a linear volume (0..1) and a pan position (-1 left .. +1 right).
    ///
    /// Uses a balance law: the center leaves both channels at full volume and panning
    /// attenuates only the opposite channel.
    pub fn new(volume: f32, panning: f32) -> PanGains {
        PanGains {
            left: volume * (1.0 - panning).min(1.0),
            right: volume * (1.0 + panning).min(1.0),
        }
    }
}

/// A voice being rendered by the mixer.
pub struct ActiveVoice {
    /// Unique ID for this voice
    pub id: VoiceId,
    /// Interleaved sample data at the mixer's sample rate, shared with other voices.
    data: Arc<Vec<f32>>,
    channel_count: usize,
    /// Fractional read position in frames.
    position: f64,
    /// Frames advanced per output frame (the pitch ratio).
    step: f64,
    gains: PanGains,
    state: SharedVoiceState,
}

impl ActiveVoice {
    pub fn new(
        id: VoiceId,
        data: Arc<Vec<f32>>,
        channel_count: u16,
        step: f64,
        gains: PanGains,
        state: SharedVoiceState,
    ) -> Self {
        Self {
            id,
            data,
            channel_count: channel_count.max(1) as usize,
            position: 0.0,
            step,
            gains,
            state,
        }
    }

    fn total_frames(&self) -> usize {
        self.data.len() / self.channel_count
    }

    #[inline]
    fn sample_at(&self, frame: usize, frac: f32, channel: usize) -> f32 {
        let s0 = self.data[frame * self.channel_count + channel];
        let s1 = self
            .data
            .get((frame + 1) * self.channel_count + channel)
            .copied()
            .unwrap_or(s0);
        s0 + (s1 - s0) * frac
    }

    /// Mixes up to `frames` frames into the interleaved output. Returns false once the
    /// voice has run past the end of its sample.
    fn render_into(&mut self, output: &mut [f32], num_channels: usize, frames: usize) -> bool {
        let total_frames = self.total_frames();

        for out_frame in output.chunks_exact_mut(num_channels).take(frames) {
            let index = self.position as usize;
            if index >= total_frames {
                return false;
            }
            let frac = (self.position - index as f64) as f32;

            let (left, right) = if self.channel_count == 1 {
                let s = self.sample_at(index, frac, 0);
                (s, s)
            } else {
                (
                    self.sample_at(index, frac, 0),
                    self.sample_at(index, frac, 1),
                )
            };
            let left = left * self.gains.left;
            let right = right * self.gains.right;

            if num_channels == 1 {
                out_frame[0] += (left + right) * 0.5;
            } else {
                out_frame[0] += left;
                out_frame[1] += right;
            }

            self.position += self.step;
        }

        (self.position as usize) < total_frames
    }
}

/// Core audio mixing logic that's independent of any audio backend.
pub struct AudioMixer {
    /// Voices currently rendering. Only the render thread and shutdown touch this.
    voices: Mutex<Vec<ActiveVoice>>,
    num_channels: u16,
    sample_rate: u32,
    master_volume: f32,
    /// Frames rendered since the mixer was created.
    current_sample: AtomicU64,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32, master_volume: f32) -> Self {
        Self {
            voices: Mutex::new(Vec::new()),
            num_channels: num_channels.max(1),
            sample_rate,
            master_volume: master_volume.clamp(0.0, 1.0),
            current_sample: AtomicU64::new(0),
        }
    }

    /// Adds a voice to the mix. It starts on the next rendered block.
    pub fn add_voice(&self, voice: ActiveVoice) {
        self.voices.lock().push(voice);
    }

    /// Moves every queued voice from the trigger channel into the mix without blocking.
    pub fn receive_voices(&self, voice_rx: &VoiceReceiver) {
        if voice_rx.is_empty() {
            return;
        }
        let mut voices = self.voices.lock();
        while let Ok(voice) = voice_rx.try_recv() {
            voices.push(voice);
        }
    }

    /// Renders `num_frames` frames into the front of `output` (interleaved).
    /// Finished and cancelled voices are dropped and marked finished.
    pub fn process_into_output(&self, output: &mut [f32], num_frames: usize) {
        let num_channels = self.num_channels as usize;
        let len = (num_frames * num_channels).min(output.len());
        let output = &mut output[..len];
        output.fill(0.0);
        let frames = len / num_channels;

        let mut voices = self.voices.lock();
        voices.retain_mut(|voice| {
            if voice.state.is_cancelled() {
                voice.state.mark_finished();
                return false;
            }
            voice.state.mark_playing();
            let alive = voice.render_into(output, num_channels, frames);
            if !alive {
                voice.state.mark_finished();
            }
            alive
        });
        drop(voices);

        for sample in output.iter_mut() {
            *sample = (*sample * self.master_volume).clamp(-1.0, 1.0);
        }

        self.current_sample
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Drops every voice, marking each finished. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut voices = self.voices.lock();
        for voice in voices.iter() {
            voice.state.mark_finished();
        }
        let count = voices.len();
        voices.clear();
        count
    }

    /// Number of voices currently in the mix.
    pub fn voice_count(&self) -> usize {
        self.voices.lock().len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Gets the number of frames rendered so far.
    pub fn current_sample(&self) -> u64 {
        self.current_sample.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AudioMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixer")
            .field("num_channels", &self.num_channels)
            .field("sample_rate", &self.sample_rate)
            .field("voices", &self.voice_count())
            .finish()
    }
}
