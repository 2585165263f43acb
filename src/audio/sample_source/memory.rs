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
use super::error::DecodeError;
use super::traits::SampleSource;

/// Serves an interleaved buffer as planar chunks. Used to feed the loader in tests.
pub struct MemorySampleSource {
    interleaved: Vec<f32>,
    channel_count: u16,
    sample_rate: u32,
    position: usize,
}

impl MemorySampleSource {
    pub fn new(interleaved: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        Self {
            interleaved,
            channel_count,
            sample_rate,
            position: 0,
        }
    }

    fn frames(&self) -> usize {
        match self.channel_count {
            0 => 0,
            channels => self.interleaved.len() / channels as usize,
        }
    }
}

impl SampleSource for MemorySampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, DecodeError> {
        let channels = self.channel_count as usize;
        if output.len() != channels {
            return Err(DecodeError::ChannelCount {
                expected: channels,
                actual: output.len(),
            });
        }
        output.iter_mut().for_each(Vec::clear);
        if channels == 0 {
            return Ok(0);
        }

        let end = self.frames().min(self.position + max_frames);
        let read = end.saturating_sub(self.position);
        let span = &self.interleaved[self.position * channels..end * channels];
        for frame in span.chunks_exact(channels) {
            for (channel, sample) in output.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        self.position = end;

        Ok(read)
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_source::read_interleaved;

    #[test]
    fn test_planar_chunks() {
        let mut source = MemorySampleSource::new(vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 44100);
        let mut output = vec![Vec::new(), Vec::new()];

        assert_eq!(source.next_chunk(&mut output, 2).unwrap(), 2);
        assert_eq!(output[0], vec![0.1, 0.2]);
        assert_eq!(output[1], vec![-0.1, -0.2]);

        assert_eq!(source.next_chunk(&mut output, 2).unwrap(), 1);
        assert_eq!(output[0], vec![0.3]);
        assert_eq!(source.next_chunk(&mut output, 2).unwrap(), 0);
        assert!(output[0].is_empty());
    }

    #[test]
    fn test_wrong_buffer_count() {
        let mut source = MemorySampleSource::new(vec![0.0; 4], 2, 44100);
        let mut output = vec![Vec::new()];
        assert!(matches!(
            source.next_chunk(&mut output, 4),
            Err(DecodeError::ChannelCount {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_read_interleaved() {
        let samples = vec![0.5, -0.5, 0.25, -0.25, 0.125, -0.125];
        let mut source = MemorySampleSource::new(samples.clone(), 2, 48000);
        assert_eq!(read_interleaved(&mut source, 2).unwrap(), samples);
    }
}
