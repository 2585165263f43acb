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
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use super::error::DecodeError;
use super::traits::SampleSource;

/// A sample source that decodes audio files (Ogg/Vorbis, WAV, FLAC, MP3, ...) with symphonia.
pub struct AudioSampleSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    is_finished: bool,
    /// Decoded planar samples that have not been handed out yet.
    pending: Vec<Vec<f32>>,
    /// Read offset into every channel of `pending`.
    pending_offset: usize,
    channels: u16,
    sample_rate: u32,
}

impl SampleSource for AudioSampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, DecodeError> {
        let channels = self.channels as usize;
        if output.len() != channels {
            return Err(DecodeError::ChannelCount {
                expected: channels,
                actual: output.len(),
            });
        }

        while self.pending_frames() < max_frames && !self.is_finished {
            self.decode_next_packet()?;
        }

        let to_copy = self.pending_frames().min(max_frames);
        for (out_ch, pending_ch) in output.iter_mut().zip(self.pending.iter()) {
            out_ch.clear();
            out_ch.extend_from_slice(
                &pending_ch[self.pending_offset..self.pending_offset + to_copy],
            );
        }
        self.pending_offset += to_copy;

        // Compact once everything buffered has been consumed.
        if self.pending_frames() == 0 {
            for ch in self.pending.iter_mut() {
                ch.clear();
            }
            self.pending_offset = 0;
        }

        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AudioSampleSource {
    /// Opens and probes the audio file at the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DecodeError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| {
                DecodeError::Format(format!("'{}': {}", path.display(), e))
            })?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Format("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = match params.sample_rate {
            Some(0) => {
                return Err(DecodeError::Format(format!(
                    "'{}': sample rate is 0",
                    path.display()
                )))
            }
            Some(rate) => rate,
            None => return Err(DecodeError::Format("Sample rate not specified".to_string())),
        };

        let decoder_opts: DecoderOptions = Default::default();
        let decoder = get_codecs().make(&params, &decoder_opts).map_err(|e| {
            DecodeError::Format(format!("'{}': {}", path.display(), e))
        })?;

        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);

        let mut source = Self {
            format_reader,
            decoder,
            track_id,
            is_finished: false,
            pending: vec![Vec::new(); channels as usize],
            pending_offset: 0,
            channels,
            sample_rate,
        };

        // Some containers leave the channel layout to the first decoded packet.
        if channels == 0 {
            source.decode_next_packet()?;
            if source.channels == 0 {
                return Err(DecodeError::Format(
                    "Channels not specified".to_string(),
                ));
            }
        }

        Ok(source)
    }

    fn pending_frames(&self) -> usize {
        self.pending
            .first()
            .map(|ch| ch.len() - self.pending_offset)
            .unwrap_or(0)
    }

    /// Reads the next packet. Returns Ok(None) at the end of the stream.
    fn read_next_packet(
        format_reader: &mut dyn FormatReader,
    ) -> Result<Option<Packet>, DecodeError> {
        match format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            // Some demuxers report a decode error instead of EOF on the final page.
            Err(SymphoniaError::DecodeError(_)) => Ok(None),
            Err(e) => Err(DecodeError::Codec(e)),
        }
    }

    /// Decodes one packet of our track into the pending buffer, or marks the source finished.
    fn decode_next_packet(&mut self) -> Result<(), DecodeError> {
        loop {
            let packet = match Self::read_next_packet(self.format_reader.as_mut()) {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    self.is_finished = true;
                    return Ok(());
                }
                Err(DecodeError::Codec(SymphoniaError::ResetRequired)) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    self.decoder.decode(&packet)?
                }
                // A corrupt packet is skipped rather than ending the sample.
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(DecodeError::Codec(e)),
            };

            // Vorbis header packets decode to zero frames.
            if decoded.frames() == 0 {
                continue;
            }

            let decoded_channels = decoded.spec().channels.count();
            if self.channels == 0 {
                self.channels = decoded_channels as u16;
                self.pending = vec![Vec::new(); decoded_channels];
            }
            Self::append_decoded(&mut self.pending, decoded);
            return Ok(());
        }
    }

    fn append_decoded(pending: &mut [Vec<f32>], decoded: AudioBufferRef) {
        match decoded {
            AudioBufferRef::F32(buf) => Self::append_planar(pending, &buf, |s| s),
            AudioBufferRef::F64(buf) => Self::append_planar(pending, &buf, |s| s as f32),
            AudioBufferRef::S8(buf) => Self::append_planar(pending, &buf, Self::scale_s8),
            AudioBufferRef::S16(buf) => Self::append_planar(pending, &buf, Self::scale_s16),
            AudioBufferRef::S24(buf) => {
                Self::append_planar(pending, &buf, |s| Self::scale_s24(s.inner()))
            }
            AudioBufferRef::S32(buf) => Self::append_planar(pending, &buf, Self::scale_s32),
            AudioBufferRef::U8(buf) => Self::append_planar(pending, &buf, Self::scale_u8),
            AudioBufferRef::U16(buf) => Self::append_planar(pending, &buf, Self::scale_u16),
            AudioBufferRef::U24(buf) => {
                Self::append_planar(pending, &buf, |s| Self::scale_u24(s.inner()))
            }
            AudioBufferRef::U32(buf) => Self::append_planar(pending, &buf, Self::scale_u32),
        }
    }

    fn append_planar<T, F>(pending: &mut [Vec<f32>], buf: &AudioBuffer<T>, convert: F)
    where
        T: symphonia::core::sample::Sample,
        F: Fn(T) -> f32,
    {
        let channels = buf.spec().channels.count().min(pending.len());
        for (ch_idx, pending_ch) in pending.iter_mut().enumerate().take(channels) {
            pending_ch.extend(buf.chan(ch_idx).iter().map(|&s| convert(s)));
        }
    }

    #[inline]
    pub(crate) fn scale_s8(sample: i8) -> f32 {
        sample as f32 / (1i64 << 7) as f32
    }

    #[inline]
    pub(crate) fn scale_s16(sample: i16) -> f32 {
        sample as f32 / (1i64 << 15) as f32
    }

    #[inline]
    pub(crate) fn scale_s24(sample: i32) -> f32 {
        sample as f32 / (1i64 << 23) as f32
    }

    #[inline]
    pub(crate) fn scale_s32(sample: i32) -> f32 {
        sample as f32 / (1i64 << 31) as f32
    }

    #[inline]
    pub(crate) fn scale_u8(sample: u8) -> f32 {
        (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
    }

    #[inline]
    pub(crate) fn scale_u16(sample: u16) -> f32 {
        (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
    }

    #[inline]
    pub(crate) fn scale_u24(sample: u32) -> f32 {
        let max = (1u32 << 24) - 1;
        (sample as f32 / max as f32) * 2.0 - 1.0
    }

    #[inline]
    pub(crate) fn scale_u32(sample: u32) -> f32 {
        (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}
