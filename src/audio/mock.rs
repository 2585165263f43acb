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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Instant,
};

use tracing::{debug, info, span, Level};

use super::{AudioMixer, DeviceError, OutputFormat, VoiceReceiver, BLOCK_FRAMES};

/// A mock device. Renders the mixer in real time and throws the audio away.
pub struct Device {
    name: String,
    format: OutputFormat,
    running: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    /// Largest absolute sample seen, as f32 bits.
    peak: Arc<AtomicU32>,
    render_thread: Option<thread::JoinHandle<()>>,
}

impl Device {
    pub fn new(name: &str, format: OutputFormat) -> Device {
        Device {
            name: name.to_string(),
            format,
            running: Arc::new(AtomicBool::new(false)),
            frames_rendered: Arc::new(AtomicU64::new(0)),
            peak: Arc::new(AtomicU32::new(0)),
            render_thread: None,
        }
    }

    /// Returns true while the render thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of frames rendered since start.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Largest absolute sample value rendered since start.
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Channels={}) (Mock)", self.name, self.format.channels)
    }
}

impl super::Device for Device {
    fn format(&self) -> &OutputFormat {
        &self.format
    }

    fn start(
        &mut self,
        mixer: Arc<AudioMixer>,
        voice_rx: VoiceReceiver,
    ) -> Result<(), DeviceError> {
        let span = span!(Level::INFO, "start device (mock)");
        let _enter = span.enter();

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::AlreadyStarted);
        }

        let running = self.running.clone();
        let frames_rendered = self.frames_rendered.clone();
        let peak = self.peak.clone();
        let block_duration = self.format.frames_to_duration(BLOCK_FRAMES);
        let block_samples = BLOCK_FRAMES * self.format.channels as usize;

        let handle = thread::Builder::new()
            .name("nbs-mock-render".to_string())
            .spawn(move || {
                let mut scratch = vec![0.0f32; block_samples];
                let mut deadline = Instant::now();

                while running.load(Ordering::Acquire) {
                    mixer.receive_voices(&voice_rx);
                    mixer.process_into_output(&mut scratch, BLOCK_FRAMES);
                    frames_rendered.fetch_add(BLOCK_FRAMES as u64, Ordering::Relaxed);

                    let block_peak = scratch.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
                    peak.fetch_max(block_peak.to_bits(), Ordering::Relaxed);

                    // Pace blocks to the wall clock like a real device would. A stalled
                    // thread resumes from now instead of rendering a burst to catch up.
                    deadline += block_duration;
                    let now = Instant::now();
                    if deadline > now {
                        spin_sleep::sleep(deadline - now);
                    } else if now - deadline > block_duration {
                        deadline = now;
                    }
                }
                debug!("Mock render thread stopped");
            });
        match handle {
            Ok(handle) => self.render_thread = Some(handle),
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        }

        info!(device = self.name, "Mock output started");
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.render_thread.take() {
            let _ = thread.join();
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Option<&Device> {
        Some(self)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        super::Device::stop(self);
    }
}
