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
//! Sample loading and caching.
//!
//! Samples are decoded entirely into memory up front so triggering never touches the disk.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::audio::sample_source::{self, read_interleaved, DecodeError, SampleSource};

/// Frames decoded per read while loading.
const LOAD_CHUNK_FRAMES: usize = 4096;

/// Failures loading a sample file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("{path} contains no audio")]
    Empty { path: PathBuf },
}

impl LoadError {
    fn from_source(path: &Path, error: DecodeError) -> LoadError {
        match error {
            DecodeError::Io(source) => LoadError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => LoadError::Decode {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }
}

/// A decoded sample, ready to be played back.
/// The data sits behind an Arc so every voice shares one copy.
#[derive(Clone, Debug)]
pub struct LoadedSample {
    /// Interleaved f32 samples at the loader's target rate.
    data: Arc<Vec<f32>>,
    /// Number of channels in the sample.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
}

impl LoadedSample {
    pub fn data(&self) -> &Arc<Vec<f32>> {
        &self.data
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count.max(1) as usize
    }

    /// Natural duration at a pitch ratio of 1.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// True if both handles share the same decoded buffer.
    pub fn shares_data_with(&self, other: &LoadedSample) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Manages loading and caching of sample data.
pub struct SampleLoader {
    /// Cache of loaded samples by file path.
    cache: HashMap<PathBuf, LoadedSample>,
    /// Target sample rate for transcoding (matches audio output).
    target_sample_rate: u32,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            cache: HashMap::new(),
            target_sample_rate,
        }
    }

    /// Loads a sample from a file into memory.
    /// Returns a cached version if already loaded.
    pub fn load(&mut self, path: &Path) -> Result<LoadedSample, LoadError> {
        if let Some(sample) = self.cache.get(path) {
            debug!(path = ?path, "Using cached sample");
            return Ok(sample.clone());
        }

        // Malformed headers can trip panics inside the decoder.
        let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut source =
                sample_source::open(path).map_err(|e| LoadError::from_source(path, e))?;
            self.load_from_source(path, source.as_mut())
        }));
        let loaded = match decoded {
            Ok(result) => result?,
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                error!(path = ?path, reason, "Decoder panicked");
                return Err(LoadError::Decode {
                    path: path.to_path_buf(),
                    reason: format!("decoder panicked: {}", reason),
                });
            }
        };
        self.cache.insert(path.to_path_buf(), loaded.clone());
        Ok(loaded)
    }

    /// Decodes a whole source into memory at the target rate.
    pub fn load_from_source<S: SampleSource + ?Sized>(
        &self,
        path: &Path,
        source: &mut S,
    ) -> Result<LoadedSample, LoadError> {
        let source_sample_rate = source.sample_rate();
        let channel_count = source.channel_count();
        if source_sample_rate == 0 {
            return Err(LoadError::Decode {
                path: path.to_path_buf(),
                reason: "sample rate is 0".to_string(),
            });
        }

        let samples = read_interleaved(source, LOAD_CHUNK_FRAMES)
            .map_err(|e| LoadError::from_source(path, e))?;
        if samples.is_empty() || channel_count == 0 {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
            });
        }

        let samples = if source_sample_rate != self.target_sample_rate {
            debug!(
                path = ?path,
                source_rate = source_sample_rate,
                target_rate = self.target_sample_rate,
                "Transcoding sample"
            );
            transcode_samples(
                &samples,
                channel_count,
                source_sample_rate,
                self.target_sample_rate,
            )
        } else {
            samples
        };

        let loaded = LoadedSample {
            data: Arc::new(samples),
            channel_count,
            sample_rate: self.target_sample_rate,
        };

        info!(
            path = ?path,
            channels = channel_count,
            sample_rate = loaded.sample_rate,
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Sample loaded"
        );

        Ok(loaded)
    }

    /// Returns the total memory used by cached samples.
    pub fn total_memory_usage(&self) -> usize {
        self.cache.values().map(|s| s.memory_size()).sum()
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        *reason
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.as_str()
    } else {
        "unknown"
    }
}

/// Converts interleaved samples from one rate to another with linear interpolation.
/// One-shot note samples don't need anything better.
fn transcode_samples(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let channels = channel_count as usize;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let s0 = samples
                .get(source_frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = samples
                .get((source_frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("cached_samples", &self.cache.len())
            .field("target_sample_rate", &self.target_sample_rate)
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_source::MemorySampleSource;
    use crate::testutil::write_wav;

    #[test]
    fn test_transcode_samples() {
        let source_rate = 44100;
        let source_samples: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin())
            .collect();

        let result = transcode_samples(&source_samples, 1, source_rate, 48000);

        let expected_len = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(result.len(), expected_len);
    }

    #[test]
    fn test_transcode_stereo_keeps_channels_apart() {
        let source_samples = vec![1.0f32, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let result = transcode_samples(&source_samples, 2, 22050, 44100);

        assert_eq!(result.len(), 16);
        for frame in result.chunks(2) {
            assert_eq!(frame, &[1.0, -1.0]);
        }
    }

    #[test]
    fn test_load_from_source() {
        let loader = SampleLoader::new(44100);
        let mut source = MemorySampleSource::new(vec![0.25; 882], 2, 44100);
        let sample = loader
            .load_from_source(Path::new("memory"), &mut source)
            .unwrap();

        assert_eq!(sample.channel_count(), 2);
        assert_eq!(sample.frames(), 441);
        assert_eq!(sample.duration().as_millis(), 10);
        assert_eq!(sample.memory_size(), 882 * 4);
    }

    #[test]
    fn test_load_empty_source() {
        let loader = SampleLoader::new(44100);
        let mut source = MemorySampleSource::new(Vec::new(), 1, 44100);
        assert!(matches!(
            loader.load_from_source(Path::new("empty"), &mut source),
            Err(LoadError::Empty { .. })
        ));
    }

    #[test]
    fn test_load_caches_by_path() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("click.wav");
        write_wav(&path, &[vec![1000i16; 2205]], 22050)?;

        let mut loader = SampleLoader::new(44100);
        let first = loader.load(&path)?;
        let second = loader.load(&path)?;

        assert!(first.shares_data_with(&second));
        assert_eq!(first.sample_rate(), 44100);
        assert_eq!(first.frames(), 4410);
        assert_eq!(loader.total_memory_usage(), first.memory_size());
        Ok(())
    }

    #[test]
    fn test_load_errors() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let mut loader = SampleLoader::new(44100);

        assert!(matches!(
            loader.load(&dir.path().join("missing.ogg")),
            Err(LoadError::Io { .. })
        ));

        let garbage = dir.path().join("garbage.ogg");
        std::fs::write(&garbage, b"not audio at all")?;
        assert!(matches!(
            loader.load(&garbage),
            Err(LoadError::Decode { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_load_zero_sample_rate_header() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("zero.wav");
        write_wav(&path, &[vec![1000i16; 100]], 44100)?;

        // Zero the sample rate and byte rate fields of the fmt chunk.
        let mut bytes = std::fs::read(&path)?;
        bytes[24..32].fill(0);
        std::fs::write(&path, &bytes)?;

        let mut loader = SampleLoader::new(44100);
        assert!(matches!(
            loader.load(&path),
            Err(LoadError::Decode { .. })
        ));
        assert_eq!(loader.total_memory_usage(), 0);

        // The loader stays usable afterwards.
        let good = dir.path().join("good.wav");
        write_wav(&good, &[vec![1000i16; 100]], 44100)?;
        assert_eq!(loader.load(&good)?.frames(), 100);
        Ok(())
    }

    #[test]
    fn test_load_from_source_zero_sample_rate() {
        let loader = SampleLoader::new(44100);
        let mut source = MemorySampleSource::new(vec![0.5; 10], 1, 0);
        assert!(matches!(
            loader.load_from_source(Path::new("zero"), &mut source),
            Err(LoadError::Decode { .. })
        ));
    }
}
