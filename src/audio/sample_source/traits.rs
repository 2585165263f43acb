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

/// Decoded audio handed out in planar chunks, one buffer per channel.
pub trait SampleSource: Send {
    /// Fills `output` with up to `max_frames` frames. `output` needs one buffer per
    /// channel; each is cleared first. Returns the frames written, 0 once exhausted.
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, DecodeError>;

    fn channel_count(&self) -> u16;

    fn sample_rate(&self) -> u32;
}

/// Drains a source and returns its samples interleaved.
pub fn read_interleaved<S: SampleSource + ?Sized>(
    source: &mut S,
    chunk_frames: usize,
) -> Result<Vec<f32>, DecodeError> {
    let mut planar = vec![Vec::with_capacity(chunk_frames); source.channel_count() as usize];
    let mut interleaved = Vec::new();

    loop {
        let frames = source.next_chunk(&mut planar, chunk_frames)?;
        if frames == 0 {
            return Ok(interleaved);
        }
        interleaved.reserve(frames * planar.len());
        interleaved.extend((0..frames).flat_map(|frame| planar.iter().map(move |c| c[frame])));
    }
}
