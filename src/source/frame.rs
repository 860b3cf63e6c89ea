//! Frames delivered by a receiver poll

use bytes::{Bytes, BytesMut};

use crate::constants::SAMPLE_SIZE;

/// Result of a single receiver poll
#[derive(Debug, Clone, Default)]
pub enum CapturedFrame {
    /// Nothing arrived before the timeout
    #[default]
    None,
    Audio(AudioFrame),
    Video(VideoFrame),
}

impl CapturedFrame {
    pub fn is_none(&self) -> bool {
        matches!(self, CapturedFrame::None)
    }

    pub fn as_audio(&self) -> Option<&AudioFrame> {
        match self {
            CapturedFrame::Audio(frame) => Some(frame),
            _ => None,
        }
    }
}

/// Planar 32-bit float audio.
///
/// Channel `i` occupies `data[i * stride..(i + 1) * stride]`.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: usize,
    pub samples_per_channel: usize,
    pub channel_stride_bytes: usize,
    pub data: Bytes,
}

impl AudioFrame {
    /// Build a frame from one sample vector per channel.
    /// Channels shorter than the longest one are padded with silence.
    pub fn from_planar(sample_rate: u32, channels: &[Vec<f32>]) -> Self {
        let samples_per_channel = channels.iter().map(Vec::len).max().unwrap_or(0);
        let stride = samples_per_channel * SAMPLE_SIZE;
        let mut data = BytesMut::zeroed(stride * channels.len());

        for (index, samples) in channels.iter().enumerate() {
            let region = &mut data[index * stride..(index + 1) * stride];
            for (chunk, sample) in region.chunks_exact_mut(SAMPLE_SIZE).zip(samples) {
                chunk.copy_from_slice(&sample.to_ne_bytes());
            }
        }

        Self {
            sample_rate,
            channels: channels.len(),
            samples_per_channel,
            channel_stride_bytes: stride,
            data: data.freeze(),
        }
    }

    /// Raw bytes of one channel, empty if the index is out of range
    pub fn channel_bytes(&self, index: usize) -> &[u8] {
        index
            .checked_mul(self.channel_stride_bytes)
            .and_then(|start| Some(start..start.checked_add(self.channel_stride_bytes)?))
            .and_then(|range| self.data.get(range))
            .unwrap_or(&[])
    }
}

/// Video frame. The audio path skips these.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub frame_rate_n: u32,
    pub frame_rate_d: u32,
    pub data: Bytes,
}
