//! Source discovery and subscription management

pub mod manager;
pub mod params;

pub use manager::{ConnectionManager, ConnectionState};
pub use params::ConnectionParameters;
