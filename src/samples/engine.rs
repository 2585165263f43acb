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
//! The sample engine: loads instrument samples and triggers voices on the mixer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, span, warn, Level};

use super::loader::{LoadError, LoadedSample, SampleLoader};
use super::voice::{next_voice_id, SharedVoiceState, Voice, VoiceId, VoiceManager, VoiceState};
use crate::audio::mixer::{ActiveVoice, PanGains};
use crate::audio::{self, AudioMixer, Device as _, DeviceError, VoiceSender};
use crate::config::{self, EvictionPolicy};
use crate::instruments::InstrumentId;

/// Lowest playback-rate factor a trigger may request.
pub const MIN_PITCH_RATIO: f32 = 1.0 / 32.0;
/// Highest playback-rate factor a trigger may request.
pub const MAX_PITCH_RATIO: f32 = 32.0;

/// Failures triggering a sound.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlayError {
    #[error("no sound loaded for instrument {0}")]
    UnknownInstrument(InstrumentId),

    #[error("invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("the engine has been shut down")]
    EngineStopped,
}

/// The sample engine owns the decoded samples and the output device. Triggering is
/// non-blocking: a voice is recorded and handed to the render thread over a channel.
pub struct SampleEngine {
    /// Sample loader for loading audio files.
    loader: Mutex<SampleLoader>,
    /// Loaded samples by instrument ID.
    samples: RwLock<HashMap<InstrumentId, LoadedSample>>,
    /// Next ID handed out by load_sound.
    next_id: AtomicU32,
    /// Voice manager for polyphony.
    voice_manager: RwLock<VoiceManager>,
    /// Channel for handing voices to the render thread.
    voice_tx: VoiceSender,
    mixer: Arc<AudioMixer>,
    /// The running device. Taken on shutdown.
    device: Mutex<Option<Box<dyn audio::Device>>>,
    stopped: AtomicBool,
}

impl SampleEngine {
    /// Opens the configured device and starts rendering.
    pub fn new(config: &config::Engine) -> Result<SampleEngine, DeviceError> {
        let device = audio::get_device(config.audio())?;
        SampleEngine::with_device(
            device,
            config.max_voices(),
            config.eviction(),
            config.audio().master_volume(),
        )
    }

    /// Starts rendering on an already opened device.
    pub fn with_device(
        mut device: Box<dyn audio::Device>,
        max_voices: usize,
        eviction: EvictionPolicy,
        master_volume: f32,
    ) -> Result<SampleEngine, DeviceError> {
        let span = span!(Level::INFO, "start sample engine");
        let _enter = span.enter();

        let format = device.format().clone();
        let mixer = Arc::new(AudioMixer::new(
            format.channels,
            format.sample_rate,
            master_volume,
        ));
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        device.start(mixer.clone(), voice_rx)?;

        info!(
            device = %device,
            max_voices,
            eviction = ?eviction,
            "Sample engine started"
        );

        Ok(SampleEngine {
            loader: Mutex::new(SampleLoader::new(format.sample_rate)),
            samples: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(0),
            voice_manager: RwLock::new(VoiceManager::new(max_voices, eviction)),
            voice_tx,
            mixer,
            device: Mutex::new(Some(device)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Decodes a sound file into memory and returns the ID it was stored under. IDs are
    /// handed out in load order. A failed load consumes no ID.
    pub fn load_sound(&self, path: &Path) -> Result<InstrumentId, LoadError> {
        let sample = self.loader.lock().load(path)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.samples.write().insert(id, sample);
        debug!(instrument = id, path = ?path, "Sound stored");
        Ok(id)
    }

    /// Decodes a sound file and stores it under the given ID, replacing any previous sound.
    pub fn load_sound_as(&self, id: InstrumentId, path: &Path) -> Result<(), LoadError> {
        let sample = self.loader.lock().load(path)?;
        self.samples.write().insert(id, sample);
        // Keep load_sound from handing out this ID later.
        self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
        debug!(instrument = id, path = ?path, "Sound stored");
        Ok(())
    }

    /// Returns the sample stored under an ID.
    pub fn sample(&self, id: InstrumentId) -> Option<LoadedSample> {
        self.samples.read().get(&id).cloned()
    }

    /// How long a voice of this instrument rings at the given pitch ratio, after the
    /// same clamping `play_sound` applies.
    pub fn voice_length(&self, id: InstrumentId, pitch_ratio: f32) -> Option<Duration> {
        if !pitch_ratio.is_finite() || pitch_ratio <= 0.0 {
            return None;
        }
        let pitch_ratio = pitch_ratio.clamp(MIN_PITCH_RATIO, MAX_PITCH_RATIO);
        self.sample(id)
            .map(|sample| sample.duration().div_f64(pitch_ratio as f64))
    }

    /// Starts playback of an instrument's sound and returns immediately.
    ///
    /// * `volume` - linear gain, clamped to 0.0-1.0
    /// * `pitch_ratio` - playback-rate factor, 1.0 is the recorded pitch. Clamped to 1/32-32.
    /// * `panning` - -1.0 is hard left, 0.0 center, 1.0 hard right. Clamped.
    ///
    /// Errors are logged here, so callers are free to ignore the result.
    pub fn play_sound(
        &self,
        instrument: InstrumentId,
        volume: f32,
        pitch_ratio: f32,
        panning: f32,
    ) -> Result<VoiceId, PlayError> {
        let result = self.trigger(instrument, volume, pitch_ratio, panning);
        if let Err(e) = &result {
            warn!(instrument, err = %e, "Unable to play sound");
        }
        result
    }

    fn trigger(
        &self,
        instrument: InstrumentId,
        volume: f32,
        pitch_ratio: f32,
        panning: f32,
    ) -> Result<VoiceId, PlayError> {
        if !volume.is_finite() {
            return Err(PlayError::InvalidParameter {
                name: "volume",
                value: volume,
            });
        }
        if !pitch_ratio.is_finite() || pitch_ratio <= 0.0 {
            return Err(PlayError::InvalidParameter {
                name: "pitch ratio",
                value: pitch_ratio,
            });
        }
        if !panning.is_finite() {
            return Err(PlayError::InvalidParameter {
                name: "panning",
                value: panning,
            });
        }
        let volume = volume.clamp(0.0, 1.0);
        let pitch_ratio = pitch_ratio.clamp(MIN_PITCH_RATIO, MAX_PITCH_RATIO);
        let panning = panning.clamp(-1.0, 1.0);

        let sample = self
            .sample(instrument)
            .ok_or(PlayError::UnknownInstrument(instrument))?;

        let id = next_voice_id();
        let state = SharedVoiceState::new();
        {
            // Checked under the manager lock so shutdown's clear can't miss this voice.
            let mut voices = self.voice_manager.write();
            if self.stopped.load(Ordering::Acquire) {
                return Err(PlayError::EngineStopped);
            }
            voices.add_voice(Voice::new(id, instrument, volume, state.clone()));
        }

        let voice = ActiveVoice::new(
            id,
            sample.data().clone(),
            sample.channel_count(),
            pitch_ratio as f64,
            PanGains::new(volume, panning),
            state.clone(),
        );
        if self.voice_tx.send(voice).is_err() {
            state.mark_finished();
            return Err(PlayError::EngineStopped);
        }

        debug!(
            voice = id,
            instrument, volume, pitch_ratio, panning, "Sound triggered"
        );
        Ok(id)
    }

    /// Cancels every active voice. Returns how many were cancelled.
    pub fn stop_all(&self) -> usize {
        let stopped = self.voice_manager.write().clear();
        if stopped > 0 {
            info!(voices = stopped, "Stopped all voices");
        }
        stopped
    }

    /// Number of voices that have not finished.
    pub fn active_voice_count(&self) -> usize {
        self.voice_manager.read().active_count()
    }

    /// Lifecycle state of a voice, or None once the engine has forgotten it.
    pub fn voice_state(&self, id: VoiceId) -> Option<VoiceState> {
        self.voice_manager.read().voice_state(id)
    }

    /// Bytes held by decoded samples. Samples shared between IDs count once.
    pub fn memory_usage(&self) -> usize {
        self.loader.lock().total_memory_usage()
    }

    /// The mixer's sample rate, which every loaded sample is converted to.
    pub fn sample_rate(&self) -> u32 {
        self.mixer.sample_rate()
    }

    /// Stops every voice and the output device. Safe to call more than once.
    pub fn shutdown(&self) {
        let stopped = {
            let mut voices = self.voice_manager.write();
            if self.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
            voices.clear()
        };
        let span = span!(Level::INFO, "shutdown sample engine");
        let _enter = span.enter();
        info!(voices = stopped, "Stopped all voices");

        if let Some(mut device) = self.device.lock().take() {
            device.stop();
        }
        let reclaimed = self.mixer.clear();
        info!(reclaimed, "Sample engine stopped");
    }

    #[cfg(test)]
    fn with_mock<R>(&self, f: impl FnOnce(&audio::mock::Device) -> R) -> Option<R> {
        self.device
            .lock()
            .as_ref()
            .and_then(|device| device.to_mock())
            .map(f)
    }
}

impl Drop for SampleEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SampleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleEngine")
            .field("loaded_sounds", &self.samples.read().len())
            .field("loader", &*self.loader.lock())
            .field("voice_manager", &*self.voice_manager.read())
            .field("mixer", &self.mixer)
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Instant;

    use super::*;
    use crate::audio::OutputFormat;
    use crate::testutil::{eventually, sine_i16, write_wav};

    fn mock_engine(max_voices: usize, eviction: EvictionPolicy) -> SampleEngine {
        let device = Box::new(audio::mock::Device::new("mock-engine", OutputFormat::default()));
        SampleEngine::with_device(device, max_voices, eviction, 1.0).unwrap()
    }

    /// Writes a mono 44.1kHz tone of the given length and returns its path.
    fn write_tone(dir: &Path, name: &str, frames: usize) -> PathBuf {
        let path = dir.join(name);
        write_wav(&path, &[sine_i16(440.0, 0.5, 44100, frames)], 44100).unwrap();
        path
    }

    #[test]
    fn test_load_sound_assigns_ids_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        let path = write_tone(dir.path(), "harp.wav", 4410);

        assert_eq!(engine.load_sound(&path).unwrap(), 0);
        assert!(engine.load_sound(&dir.path().join("missing.wav")).is_err());
        assert_eq!(engine.load_sound(&path).unwrap(), 1);

        engine.load_sound_as(10, &path).unwrap();
        assert_eq!(engine.load_sound(&path).unwrap(), 11);
    }

    #[test]
    fn test_same_file_twice_gives_independent_handles() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        let path = write_tone(dir.path(), "harp.wav", 4410);

        let first = engine.load_sound(&path).unwrap();
        let second = engine.load_sound(&path).unwrap();
        assert_ne!(first, second);

        let first_sample = engine.sample(first).unwrap();
        let second_sample = engine.sample(second).unwrap();
        assert!(first_sample.shares_data_with(&second_sample));
        assert_eq!(engine.memory_usage(), first_sample.memory_size());

        let a = engine.play_sound(first, 0.5, 1.0, -1.0).unwrap();
        let b = engine.play_sound(second, 0.5, 2.0, 1.0).unwrap();
        assert_ne!(a, b);

        eventually(
            || engine.active_voice_count() == 0,
            "Voices from both handles never finished",
        );
    }

    #[test]
    fn test_unknown_instrument() {
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        assert_eq!(
            engine.play_sound(99, 1.0, 1.0, 0.0),
            Err(PlayError::UnknownInstrument(99))
        );
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_invalid_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        let id = engine
            .load_sound(&write_tone(dir.path(), "bit.wav", 441))
            .unwrap();

        assert!(matches!(
            engine.play_sound(id, f32::NAN, 1.0, 0.0),
            Err(PlayError::InvalidParameter { name: "volume", .. })
        ));
        assert!(matches!(
            engine.play_sound(id, 1.0, 0.0, 0.0),
            Err(PlayError::InvalidParameter {
                name: "pitch ratio",
                ..
            })
        ));
        assert!(matches!(
            engine.play_sound(id, 1.0, -2.0, 0.0),
            Err(PlayError::InvalidParameter { .. })
        ));
        assert!(matches!(
            engine.play_sound(id, 1.0, 1.0, f32::INFINITY),
            Err(PlayError::InvalidParameter {
                name: "panning",
                ..
            })
        ));

        // Out of range but finite values are clamped.
        assert!(engine.play_sound(id, 4.0, 1000.0, -3.0).is_ok());
    }

    #[test]
    fn test_concurrent_voices_finish() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        // 100ms tone
        let id = engine
            .load_sound(&write_tone(dir.path(), "chime.wav", 4410))
            .unwrap();
        let natural = engine.sample(id).unwrap().duration();

        let start = Instant::now();
        let voices: Vec<VoiceId> = (0..8)
            .map(|i| {
                let panning = i as f32 / 4.0 - 1.0;
                engine.play_sound(id, 0.1, 1.0, panning).unwrap()
            })
            .collect();
        assert_eq!(engine.active_voice_count(), 8);

        eventually(
            || {
                voices
                    .iter()
                    .all(|voice| engine.voice_state(*voice) != Some(VoiceState::Triggered))
                    && engine.active_voice_count() == 0
            },
            "Voices never finished",
        );
        let elapsed = start.elapsed();
        // Rendering is paced in real time, so no voice can finish much early.
        assert!(
            elapsed + Duration::from_millis(30) >= natural,
            "voices finished after {:?}, sample is {:?}",
            elapsed,
            natural
        );
        assert!(elapsed < natural + Duration::from_secs(2));
    }

    #[test]
    fn test_rendered_level_follows_volume() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        let path = dir.path().join("dc.wav");
        write_wav(&path, &[vec![16384i16; 4410]], 44100).unwrap();
        let id = engine.load_sound(&path).unwrap();

        engine.play_sound(id, 0.5, 1.0, 0.0).unwrap();
        eventually(|| engine.active_voice_count() == 0, "Voice never finished");

        let peak = engine.with_mock(|mock| mock.peak()).unwrap();
        assert!((peak - 0.25).abs() < 1e-3, "peak was {}", peak);
    }

    #[test]
    fn test_eviction_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(2, EvictionPolicy::Oldest);
        let id = engine
            .load_sound(&write_tone(dir.path(), "bass.wav", 88200))
            .unwrap();

        let first = engine.play_sound(id, 0.5, 1.0, 0.0).unwrap();
        let second = engine.play_sound(id, 0.5, 1.0, 0.0).unwrap();
        let third = engine.play_sound(id, 0.5, 1.0, 0.0).unwrap();

        assert_eq!(engine.voice_state(first), None);
        assert!(engine.voice_state(second).is_some());
        assert!(engine.voice_state(third).is_some());
        assert_eq!(engine.active_voice_count(), 2);
    }

    #[test]
    fn test_eviction_quietest() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(2, EvictionPolicy::Quietest);
        let id = engine
            .load_sound(&write_tone(dir.path(), "bass.wav", 88200))
            .unwrap();

        let loud = engine.play_sound(id, 0.9, 1.0, 0.0).unwrap();
        let quiet = engine.play_sound(id, 0.1, 1.0, 0.0).unwrap();
        let newest = engine.play_sound(id, 0.5, 1.0, 0.0).unwrap();

        assert!(engine.voice_state(loud).is_some());
        assert_eq!(engine.voice_state(quiet), None);
        assert!(engine.voice_state(newest).is_some());
    }

    #[test]
    fn test_stop_all() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        let id = engine
            .load_sound(&write_tone(dir.path(), "flute.wav", 88200))
            .unwrap();

        for _ in 0..4 {
            engine.play_sound(id, 0.5, 1.0, 0.0).unwrap();
        }
        assert_eq!(engine.stop_all(), 4);
        assert_eq!(engine.active_voice_count(), 0);

        // The engine keeps working afterwards.
        assert!(engine.play_sound(id, 0.5, 1.0, 0.0).is_ok());
    }

    #[test]
    fn test_shutdown_with_active_voices() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        // Two seconds, longer than the test waits.
        let id = engine
            .load_sound(&write_tone(dir.path(), "didgeridoo.wav", 88200))
            .unwrap();

        let voice = engine.play_sound(id, 0.5, 1.0, 0.0).unwrap();
        for _ in 0..3 {
            engine.play_sound(id, 0.5, 0.5, 0.0).unwrap();
        }
        eventually(
            || engine.voice_state(voice) == Some(VoiceState::Playing),
            "Voice never started playing",
        );

        engine.shutdown();
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(
            engine.play_sound(id, 0.5, 1.0, 0.0),
            Err(PlayError::EngineStopped)
        );
        assert_eq!(engine.with_mock(|mock| mock.is_running()), None);

        // Second shutdown and the drop are no-ops.
        engine.shutdown();
    }

    #[test]
    fn test_voice_length_follows_clamped_pitch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_engine(32, EvictionPolicy::Oldest);
        // One second at the mixer rate.
        let id = engine
            .load_sound(&write_tone(dir.path(), "bell.wav", 44100))
            .unwrap();

        assert_eq!(engine.voice_length(id, 1.0), Some(Duration::from_secs(1)));
        assert_eq!(engine.voice_length(id, 2.0), Some(Duration::from_millis(500)));
        // Ratios past the cap ring as long as the cap itself.
        assert_eq!(
            engine.voice_length(id, 64.0),
            engine.voice_length(id, MAX_PITCH_RATIO)
        );
        assert_eq!(
            engine.voice_length(id, 1e-6),
            engine.voice_length(id, MIN_PITCH_RATIO)
        );
        assert_eq!(engine.voice_length(id, 0.0), None);
        assert_eq!(engine.voice_length(99, 1.0), None);
    }

    #[test]
    fn test_shutdown_racing_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(mock_engine(256, EvictionPolicy::Oldest));
        let id = engine
            .load_sound(&write_tone(dir.path(), "bass.wav", 88200))
            .unwrap();

        let barrier = Arc::new(std::sync::Barrier::new(5));
        let triggers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    while engine.play_sound(id, 0.5, 1.0, 0.0).is_ok() {}
                })
            })
            .collect();

        barrier.wait();
        std::thread::sleep(Duration::from_millis(5));
        engine.shutdown();
        for trigger in triggers {
            trigger.join().unwrap();
        }

        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(
            engine.play_sound(id, 0.5, 1.0, 0.0),
            Err(PlayError::EngineStopped)
        );
    }

    #[test]
    fn test_new_from_config() {
        let engine =
            SampleEngine::new(&config::Engine::new(config::Audio::new("mock-config"))).unwrap();
        assert_eq!(engine.sample_rate(), 44100);
        assert_eq!(engine.with_mock(|mock| mock.is_running()), Some(true));
    }
}
