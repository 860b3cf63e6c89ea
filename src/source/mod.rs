//! Media-source boundary
//!
//! The receiver node only talks to the network media library through these
//! traits. Handles are destroyed by dropping them: dropping a [`Finder`]
//! stops discovery, dropping a [`Receiver`] disconnects the subscription.

pub mod frame;
pub mod loopback;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub use frame::{AudioFrame, CapturedFrame, VideoFrame};
pub use loopback::{LoopbackNetwork, LoopbackSource};

/// A source visible on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub display_name: String,
    pub network_address: String,
}

impl SourceDescriptor {
    pub fn new(display_name: impl Into<String>, network_address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            network_address: network_address.into(),
        }
    }
}

/// Receive bandwidth requested from the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bandwidth {
    Low,
    #[default]
    High,
}

impl Bandwidth {
    /// Parse a menu value. Anything other than `Low` selects `High`.
    pub fn from_menu(value: &str) -> Self {
        if value.eq_ignore_ascii_case("low") {
            Bandwidth::Low
        } else {
            Bandwidth::High
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bandwidth::Low => f.write_str("Low"),
            Bandwidth::High => f.write_str("High"),
        }
    }
}

/// Entry point of a media library
pub trait MediaLibrary: Send + Sync {
    /// Check the library is usable on this machine
    fn initialize(&self) -> Result<(), SourceError>;

    /// Start discovery, also probing the comma-separated `extra_addresses`
    fn discover(&self, extra_addresses: &str) -> Result<Box<dyn Finder>, SourceError>;

    /// Subscribe to a discovered source
    fn connect(
        &self,
        source: &SourceDescriptor,
        bandwidth: Bandwidth,
    ) -> Result<Box<dyn Receiver>, SourceError>;
}

/// Discovery handle
pub trait Finder: Send {
    /// Sources currently visible, in discovery order
    fn current_sources(&mut self) -> Result<Vec<SourceDescriptor>, SourceError>;
}

/// Subscription handle
pub trait Receiver: Send {
    /// Wait up to `timeout` for the next frame
    fn capture(&mut self, timeout: Duration) -> CapturedFrame;

    /// Hand a captured frame's memory back to the library
    fn release(&mut self, frame: CapturedFrame) {
        drop(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandwidth_menu() {
        assert_eq!(Bandwidth::from_menu("Low"), Bandwidth::Low);
        assert_eq!(Bandwidth::from_menu("High"), Bandwidth::High);
        assert_eq!(Bandwidth::from_menu("whatever"), Bandwidth::High);
        assert_eq!(Bandwidth::Low.to_string(), "Low");
    }
}
