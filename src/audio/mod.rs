//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod channels;

pub use buffer::RingBuffer;
pub use capture::{CaptureLoop, CaptureStats};
pub use channels::{AudioFormat, ChannelBuffers, ReadOutcome, SharedChannelBuffers};
