//! Per-cycle status reported to the host

use serde::Serialize;

use crate::audio::capture::CaptureStats;
use crate::connection::ConnectionState;
use crate::source::SourceDescriptor;

/// Snapshot of the node after a cycle
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub source_count: usize,
    pub channel_count: usize,
    pub sample_rate: u32,
    /// First-channel fill level, 0.0 to 1.0
    pub buffer_fill: f32,
    pub waiting_for_fill: bool,
    pub sources: Vec<SourceDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub capture: CaptureStats,
}

/// Named scalar exposed to the host's info channels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoChannel {
    pub name: &'static str,
    pub value: f64,
}

impl NodeStatus {
    pub fn info_channels(&self) -> Vec<InfoChannel> {
        vec![
            InfoChannel {
                name: "connected",
                value: if self.connected { 1.0 } else { 0.0 },
            },
            InfoChannel {
                name: "num_sources",
                value: self.source_count as f64,
            },
        ]
    }

    /// Header row followed by one `(name, address)` row per source
    pub fn info_table(&self) -> Vec<[String; 2]> {
        std::iter::once(["Sources".to_string(), "Addresses".to_string()])
            .chain(
                self.sources
                    .iter()
                    .map(|s| [s.display_name.clone(), s.network_address.clone()]),
            )
            .collect()
    }
}
