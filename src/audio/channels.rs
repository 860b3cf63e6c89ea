//! Per-channel ring buffers, audio format and fill gate
//!
//! Everything in here lives behind the buffers lock as one unit, so a format
//! rebuild can never interleave with a consumer read.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::buffer::RingBuffer;
use crate::constants::{
    BUFFER_HEADROOM, DEFAULT_BUFFER_LENGTH_S, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, SAMPLE_SIZE,
};
use crate::source::AudioFrame;

/// Channel count and sample rate of the captured stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: usize,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub fn of(frame: &AudioFrame) -> Self {
        Self {
            channels: frame.channels,
            sample_rate: frame.sample_rate,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// What a consumer read produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Output was filled with zeros and nothing was consumed
    Silence,
    /// Samples were read; `short_bytes` were missing and zero-filled
    Samples { short_bytes: usize },
}

/// Result of pushing one frame into the buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub rebuilt: bool,
    pub bytes_written: usize,
    pub bytes_dropped: usize,
}

/// The set of per-channel rings
pub struct ChannelBuffers {
    format: AudioFormat,
    buffer_length: f64,
    rings: Vec<RingBuffer>,
    waiting_for_fill: bool,
    scratch: Vec<u8>,
}

/// Buffers shared between the capture loop and the consumer
pub type SharedChannelBuffers = Arc<Mutex<ChannelBuffers>>;

impl ChannelBuffers {
    /// Build rings for the default format
    pub fn new(buffer_length: f64) -> Self {
        let mut buffers = Self {
            format: AudioFormat::default(),
            buffer_length: sanitize_length(buffer_length),
            rings: Vec::new(),
            waiting_for_fill: true,
            scratch: Vec::new(),
        };
        buffers.rebuild();
        buffers
    }

    pub fn shared(buffer_length: f64) -> SharedChannelBuffers {
        Arc::new(Mutex::new(Self::new(buffer_length)))
    }

    /// Per-ring capacity: buffer length with headroom for rate jitter.
    /// Always a whole number of samples, so a capped write never splits one.
    pub fn capacity_bytes(&self) -> usize {
        whole_samples(self.buffer_length * self.format.sample_rate as f64 * BUFFER_HEADROOM)
    }

    /// Bytes the first ring must hold before output resumes after a reset
    pub fn fill_threshold_bytes(&self) -> usize {
        whole_samples(self.buffer_length * self.format.sample_rate as f64)
    }

    /// Discard all rings and allocate a fresh set for the current format
    pub fn rebuild(&mut self) {
        let capacity = self.capacity_bytes();
        self.rings = (0..self.format.channels)
            .map(|_| RingBuffer::new(capacity))
            .collect();
        self.waiting_for_fill = true;
    }

    /// Empty every ring and re-arm the fill gate
    pub fn clear(&mut self) {
        for ring in &mut self.rings {
            ring.clear();
        }
        self.waiting_for_fill = true;
    }

    /// Change the buffer length, rebuilding if it differs.
    /// Returns whether a rebuild happened.
    pub fn set_buffer_length(&mut self, seconds: f64) -> bool {
        let seconds = sanitize_length(seconds);
        if (seconds - self.buffer_length).abs() <= f64::EPSILON {
            return false;
        }
        self.buffer_length = seconds;
        self.rebuild();
        true
    }

    /// Demultiplex one planar frame into the rings, rebuilding first if the
    /// frame's format differs from the current one. Excess bytes for a full
    /// ring are dropped.
    pub fn ingest(&mut self, frame: &AudioFrame) -> IngestReport {
        let mut report = IngestReport::default();

        let format = AudioFormat::of(frame);
        if format != self.format {
            self.format = format;
            self.rebuild();
            report.rebuilt = true;
        }

        for (index, ring) in self.rings.iter_mut().enumerate() {
            let bytes = frame.channel_bytes(index);
            let written = ring.write(bytes);
            report.bytes_written += written;
            report.bytes_dropped += bytes.len() - written;
        }

        report
    }

    /// Fill `outputs` with `num_samples` samples per channel.
    ///
    /// Produces silence without consuming anything when the first ring is
    /// empty, or while the fill gate is armed and less than one buffer length
    /// is available. Output channels without a ring, and any shortfall in a
    /// ring, are zero-filled.
    pub fn read_cycle(&mut self, num_samples: usize, outputs: &mut [Vec<f32>]) -> ReadOutcome {
        for out in outputs.iter_mut() {
            out.clear();
            out.resize(num_samples, 0.0);
        }

        let available = self.rings.first().map_or(0, RingBuffer::read_available);
        if available == 0 || (self.waiting_for_fill && available < self.fill_threshold_bytes()) {
            return ReadOutcome::Silence;
        }

        self.waiting_for_fill = false;

        let wanted = num_samples * SAMPLE_SIZE;
        self.scratch.resize(wanted, 0);
        let mut short_bytes = 0;

        for (out, ring) in outputs.iter_mut().zip(self.rings.iter_mut()) {
            let read = ring.read(&mut self.scratch[..wanted]);
            short_bytes += wanted - read;

            for (sample, chunk) in out.iter_mut().zip(self.scratch[..read].chunks_exact(SAMPLE_SIZE)) {
                *sample = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }

        ReadOutcome::Samples { short_bytes }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn buffer_length(&self) -> f64 {
        self.buffer_length
    }

    pub fn waiting_for_fill(&self) -> bool {
        self.waiting_for_fill
    }

    pub fn channel_count(&self) -> usize {
        self.rings.len()
    }

    pub fn ring(&self, index: usize) -> Option<&RingBuffer> {
        self.rings.get(index)
    }

    /// Readable bytes in the first ring
    pub fn read_available(&self) -> usize {
        self.rings.first().map_or(0, RingBuffer::read_available)
    }
}

/// Byte size of `samples` (fractional part dropped)
fn whole_samples(samples: f64) -> usize {
    samples as usize * SAMPLE_SIZE
}

fn sanitize_length(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        DEFAULT_BUFFER_LENGTH_S
    }
}
