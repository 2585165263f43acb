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
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, span, Level};

use super::thread_priority::configure_render_thread;
use super::{
    AudioMixer, DeviceError, DeviceInfo, OutputFormat, SampleFormat, VoiceReceiver, BLOCK_FRAMES,
};
use crate::config;

/// How long the producer backs off when the ring is full.
const PRODUCER_BACKOFF: Duration = Duration::from_micros(500);

/// How often the output thread checks whether it should release the stream.
const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Single-producer single-consumer ring of f32 samples. Samples are stored as raw bits in
/// atomics so both sides can share it without locks.
struct RingBuffer {
    buffer: Box<[AtomicU32]>,
    /// Capacity (power of 2)
    capacity: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        Self {
            buffer: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Samples available to read.
    #[inline]
    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & (self.capacity - 1)
    }

    /// Space available to write. One slot stays empty to tell full from empty.
    #[inline]
    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Writes as many samples as fit. Returns the number written.
    fn write(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        let write = self.write_pos.load(Ordering::Relaxed);
        let mask = self.capacity - 1;

        for (i, sample) in samples.iter().take(to_write).enumerate() {
            self.buffer[(write + i) & mask].store(sample.to_bits(), Ordering::Relaxed);
        }

        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Reads as many samples as are available into the output. Returns the number read.
    fn read(&self, output: &mut [f32]) -> usize {
        let to_read = self.available().min(output.len());
        let read = self.read_pos.load(Ordering::Relaxed);
        let mask = self.capacity - 1;

        for (i, out) in output.iter_mut().take(to_read).enumerate() {
            *out = f32::from_bits(self.buffer[(read + i) & mask].load(Ordering::Relaxed));
        }

        self.read_pos
            .store((read + to_read) & mask, Ordering::Release);
        to_read
    }
}

/// A cpal output device driven by the mixer.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The format the stream is opened with.
    format: OutputFormat,
    /// Fixed stream buffer size in frames, or None for the backend default.
    stream_buffer_frames: Option<u32>,
    /// Cleared to stop the render threads.
    running: Arc<AtomicBool>,
    /// Mixes blocks into the ring buffer.
    producer_thread: Option<thread::JoinHandle<()>>,
    /// Owns the cpal stream, which cannot cross threads.
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// f32 callback: read directly into the cpal buffer.
fn create_f32_callback(
    ring: Arc<RingBuffer>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let read = ring.read(data);
        // Zero-fill any shortfall
        data[read..].fill(0.0);
    }
}

/// Integer callback: read from the ring into a reused scratch buffer and convert.
fn create_int_callback<T>(
    ring: Arc<RingBuffer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        let read = ring.read(&mut scratch);
        scratch[read..].fill(0.0);

        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    format: &OutputFormat,
    stream_buffer_frames: Option<u32>,
    ring: Arc<RingBuffer>,
) -> Result<cpal::Stream, DeviceError> {
    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: format.sample_rate,
        buffer_size: match stream_buffer_frames {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        },
    };
    let on_error = |err| error!(error = %err, "CPAL output stream error");

    let stream = match (format.sample_format, format.bits_per_sample) {
        (SampleFormat::Float, _) => device.build_output_stream(
            &config,
            create_f32_callback(ring),
            on_error,
            None,
        )?,
        (SampleFormat::Int, 16) => device.build_output_stream(
            &config,
            create_int_callback::<i16>(ring),
            on_error,
            None,
        )?,
        (SampleFormat::Int, 32) => device.build_output_stream(
            &config,
            create_int_callback::<i32>(ring),
            on_error,
            None,
        )?,
        (SampleFormat::Int, bits) => {
            return Err(DeviceError::UnsupportedFormat(format!(
                "{}-bit integer stream",
                bits
            )))
        }
    };
    Ok(stream)
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|(info, _)| info)
            .collect())
    }

    /// Lists cpal output devices along with the underlying handles.
    #[allow(deprecated)]
    fn list_cpal_devices() -> Result<Vec<(DeviceInfo, cpal::Device)>, DeviceError> {
        // Suppress noisy backend output while probing.
        let _shh_stdout = shh::stdout().map_err(|e| DeviceError::Host(e.to_string()))?;
        let _shh_stderr = shh::stderr().map_err(|e| DeviceError::Host(e.to_string()))?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host =
                cpal::host_from_id(host_id).map_err(|e| DeviceError::Host(e.to_string()))?;
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|config| config.channels())
                    .max()
                    .unwrap_or(0);
                if max_channels == 0 {
                    continue;
                }
                let Ok(name) = device.name() else {
                    continue;
                };

                devices.push((
                    DeviceInfo {
                        name,
                        host: host_id.name().to_string(),
                        max_channels,
                    },
                    device,
                ));
            }
        }

        devices.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));
        Ok(devices)
    }

    /// Gets the configured cpal device. "default" selects the host's default output.
    #[allow(deprecated)]
    pub fn get(config: &config::Audio, format: OutputFormat) -> Result<Device, DeviceError> {
        let name = config.device();
        let (info, device) = if name == "default" {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(DeviceError::NoDefault)?;
            let max_channels = device
                .supported_output_configs()
                .map_err(|e| DeviceError::Host(e.to_string()))?
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            let info = DeviceInfo {
                name: device.name().unwrap_or_else(|_| "default".to_string()),
                host: host.id().name().to_string(),
                max_channels,
            };
            (info, device)
        } else {
            Device::list_cpal_devices()?
                .into_iter()
                .find(|(info, _)| info.name.trim() == name)
                .ok_or_else(|| DeviceError::NotFound(name.to_string()))?
        };

        if info.max_channels < format.channels {
            return Err(DeviceError::TooManyChannels {
                device: info.name,
                supported: info.max_channels,
                requested: format.channels,
            });
        }

        let host_id = cpal::available_hosts()
            .into_iter()
            .find(|id| id.name() == info.host)
            .unwrap_or_else(|| cpal::default_host().id());

        Ok(Device {
            name: info.name,
            max_channels: info.max_channels,
            host_id,
            device,
            format,
            stream_buffer_frames: config.stream_buffer_frames(),
            running: Arc::new(AtomicBool::new(false)),
            producer_thread: None,
            output_thread: None,
        })
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
        let span = span!(Level::INFO, "start device (cpal)");
        let _enter = span.enter();

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::AlreadyStarted);
        }

        let num_channels = self.format.channels as usize;
        // Roughly 100ms of audio between the mixer and the device callback.
        let capacity = (self.format.sample_rate as usize * num_channels) / 10;
        let ring = Arc::new(RingBuffer::new(capacity.max(BLOCK_FRAMES * num_channels * 2)));

        let producer_thread = {
            let running = self.running.clone();
            let ring = ring.clone();
            thread::Builder::new()
                .name("nbs-render".to_string())
                .spawn(move || {
                    configure_render_thread();
                    let block_samples = BLOCK_FRAMES * num_channels;
                    let mut scratch = vec![0.0f32; block_samples];

                    while running.load(Ordering::Acquire) {
                        mixer.receive_voices(&voice_rx);
                        if ring.space() >= block_samples {
                            mixer.process_into_output(&mut scratch, BLOCK_FRAMES);
                            ring.write(&scratch);
                        } else {
                            thread::sleep(PRODUCER_BACKOFF);
                        }
                    }
                    debug!("Render thread stopped");
                })?
        };
        self.producer_thread = Some(producer_thread);

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);
        let output_thread = {
            let running = self.running.clone();
            let device = self.device.clone();
            let format = self.format.clone();
            let stream_buffer_frames = self.stream_buffer_frames;
            let output_thread = thread::Builder::new()
                .name("nbs-output".to_string())
                .spawn(move || {
                    let stream = match build_stream(&device, &format, stream_buffer_frames, ring)
                    {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    while running.load(Ordering::Acquire) {
                        thread::sleep(OUTPUT_POLL_INTERVAL);
                    }
                    drop(stream);
                    debug!("Output stream released");
                });
            match output_thread {
                Ok(handle) => handle,
                Err(e) => {
                    super::Device::stop(self);
                    return Err(e.into());
                }
            }
        };
        self.output_thread = Some(output_thread);

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    device = self.name,
                    sample_rate = self.format.sample_rate,
                    channels = self.format.channels,
                    format = %self.format.sample_format,
                    "CPAL output stream started"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                super::Device::stop(self);
                Err(e)
            }
            Err(_) => {
                super::Device::stop(self);
                Err(DeviceError::Host(
                    "output thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.producer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Option<&super::mock::Device> {
        None
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        super::Device::stop(self);
    }
}
