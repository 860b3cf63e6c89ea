//! # Live Source Receiver
//!
//! Receives a named live network media source and exposes its audio as a
//! time-sliced signal to a host that runs on its own cadence.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── CYCLE THREAD (host) ───────────────────────────┐
//! │                                                                            │
//! │   cook(params)                          execute(n)                         │
//! │        │                                    ▲                              │
//! │        ▼                                    │                              │
//! │  ┌──────────────────────────┐     ┌─────────┴──────────┐                   │
//! │  │ Connection Manager       │     │ Consumer read      │                   │
//! │  │  finder ─► source list   │     │  fill gate,        │                   │
//! │  │  bind / rebind / drop    │     │  zero-fill         │                   │
//! │  └────────────┬─────────────┘     └─────────▲──────────┘                   │
//! └───────────────┼─────────────────────────────┼──────────────────────────────┘
//!                 │ connection lock              │ buffers lock
//!                 ▼                              │
//!        ┌──────────────────┐          ┌─────────┴──────────────────────┐
//!        │ Receiver slot    │          │ Channel buffers                │
//!        │ Option<Receiver> │          │  ┌──────┐ ┌──────┐   ┌──────┐  │
//!        └────────▲─────────┘          │  │ ch 1 │ │ ch 2 │...│ ch N │  │
//!                 │                    │  └──▲───┘ └──▲───┘   └──▲───┘  │
//!                 │ poll(timeout)      └─────┼────────┼──────────┼──────┘
//! ┌───────────────┴──────── CAPTURE THREAD ──┼────────┼──────────┼───────┐
//! │  release previous frame ─► poll ─► format check ─► demultiplex        │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod node;
pub mod source;
pub mod status;

pub use connection::{ConnectionManager, ConnectionParameters, ConnectionState};
pub use error::{Error, Result, SourceError};
pub use node::{OutputInfo, ReceiverNode};
pub use status::NodeStatus;

/// Application-wide constants
pub mod constants {
    /// Bytes per sample (32-bit float)
    pub const SAMPLE_SIZE: usize = std::mem::size_of::<f32>();

    /// Sample rate assumed until the first frame arrives
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Channel count assumed until the first frame arrives
    pub const DEFAULT_CHANNELS: usize = 2;

    /// Default buffer length in seconds
    pub const DEFAULT_BUFFER_LENGTH_S: f64 = 0.25;

    /// Largest accepted buffer length in seconds
    pub const MAX_BUFFER_LENGTH_S: f64 = 10.0;

    /// Ring capacity multiplier over the buffer length
    pub const BUFFER_HEADROOM: f64 = 2.0;

    /// Bounded wait of each receiver poll
    pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10;

    /// Default host cycle rate
    pub const DEFAULT_CYCLE_RATE_HZ: f64 = 60.0;
}
