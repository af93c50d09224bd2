// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interleaved sample buffers.

use std::slice::ChunksExactMut;
use tracing::warn;

/// Sample rate and channel layout of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
        }
    }
}

/// Interleaved `f32` samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    format: AudioFormat,
    samples: Vec<f32>,
}

impl AudioBuffer {
    /// A buffer of `frames` silent frames.
    pub fn silence(format: AudioFormat, frames: usize) -> Self {
        Self {
            format,
            samples: vec![0.0; frames * format.channels as usize],
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels as usize
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Mutable access one frame (all channels) at a time.
    pub fn frames_mut(&mut self) -> ChunksExactMut<'_, f32> {
        self.samples.chunks_exact_mut(self.format.channels as usize)
    }

    /// Replace the contents (and format) with a copy of `other`.
    pub fn init_from(&mut self, other: &AudioBuffer) {
        self.format = other.format;
        self.samples.clear();
        self.samples.extend_from_slice(&other.samples);
    }

    /// Add `other` sample by sample, clamping to [-1.0, 1.0].
    ///
    /// Only the overlapping frames are mixed. Buffers with a different
    /// channel count are skipped.
    pub fn mix_in(&mut self, other: &AudioBuffer) {
        if other.format.channels != self.format.channels {
            warn!(
                "Not mixing {}-channel buffer into {}-channel buffer",
                other.format.channels, self.format.channels
            );
            return;
        }

        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            *dst = (*dst + *src).clamp(-1.0, 1.0);
        }
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}
