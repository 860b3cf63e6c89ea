//! Host-facing receiver node
//!
//! The host drives the node from a single cycle thread: [`ReceiverNode::cook`]
//! with the cycle's parameters, then [`ReceiverNode::output_info`] and
//! [`ReceiverNode::execute`] for the output phase.

use std::sync::Arc;
use std::time::Duration;

use crate::audio::channels::ReadOutcome;
use crate::connection::{ConnectionManager, ConnectionParameters};
use crate::source::MediaLibrary;
use crate::status::{InfoChannel, NodeStatus};

/// Shape of the next output block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub channels: usize,
    pub sample_rate: u32,
}

/// Receiver node exposing a network source as time-sliced audio
pub struct ReceiverNode {
    manager: ConnectionManager,
}

impl ReceiverNode {
    pub fn new(library: Arc<dyn MediaLibrary>) -> Self {
        Self {
            manager: ConnectionManager::new(library),
        }
    }

    pub fn with_poll_timeout(library: Arc<dyn MediaLibrary>, poll_timeout: Duration) -> Self {
        Self {
            manager: ConnectionManager::with_poll_timeout(library, poll_timeout),
        }
    }

    /// Evaluate this cycle's parameters
    pub fn cook(&mut self, params: &ConnectionParameters) {
        self.manager.cook(params);
    }

    /// Channel count and rate of the output. No channels unless a
    /// subscription is live and no error is set.
    pub fn output_info(&self) -> OutputInfo {
        let format = self.manager.buffers().lock().format();

        if self.manager.error().is_some() || !self.manager.is_connected() || !self.manager.is_active() {
            return OutputInfo {
                channels: 0,
                sample_rate: format.sample_rate,
            };
        }

        OutputInfo {
            channels: format.channels,
            sample_rate: format.sample_rate,
        }
    }

    /// Positional channel name
    pub fn channel_name(&self, index: usize) -> String {
        format!("chan{}", index + 1)
    }

    /// Fill each output channel with exactly `num_samples` samples,
    /// silence when nothing can be read.
    pub fn execute(&mut self, num_samples: usize, outputs: &mut [Vec<f32>]) -> ReadOutcome {
        if !self.manager.is_connected() {
            for out in outputs.iter_mut() {
                out.clear();
                out.resize(num_samples, 0.0);
            }
            return ReadOutcome::Silence;
        }

        self.manager.buffers().lock().read_cycle(num_samples, outputs)
    }

    /// Allocate a block sized by [`output_info`](Self::output_info) and fill it
    pub fn execute_block(&mut self, num_samples: usize) -> Vec<Vec<f32>> {
        let mut outputs = vec![Vec::new(); self.output_info().channels];
        self.execute(num_samples, &mut outputs);
        outputs
    }

    pub fn status(&self) -> NodeStatus {
        let (format, buffer_fill, waiting_for_fill) = {
            let buffers = self.manager.buffers().lock();
            let fill = buffers.ring(0).map_or(0.0, |ring| ring.fill_level());
            (buffers.format(), fill, buffers.waiting_for_fill())
        };

        NodeStatus {
            state: self.manager.state(),
            connected: self.manager.is_connected(),
            source_count: self.manager.sources().len(),
            channel_count: format.channels,
            sample_rate: format.sample_rate,
            buffer_fill,
            waiting_for_fill,
            sources: self.manager.sources().to_vec(),
            error: self.manager.error().map(ToString::to_string),
            warning: self.manager.warning().map(String::from),
            capture: self.manager.capture_stats(),
        }
    }

    pub fn info_channels(&self) -> Vec<InfoChannel> {
        self.status().info_channels()
    }

    pub fn info_table(&self) -> Vec<[String; 2]> {
        self.status().info_table()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LoopbackNetwork;

    fn node_for(network: &LoopbackNetwork) -> ReceiverNode {
        ReceiverNode::with_poll_timeout(Arc::new(network.clone()), Duration::from_millis(2))
    }

    #[test]
    fn test_silence_without_subscription() {
        let network = LoopbackNetwork::new();
        let mut node = node_for(&network);
        node.cook(&ConnectionParameters::for_source("Nobody"));

        assert_eq!(node.output_info().channels, 0);

        for n in [0, 1, 512, 4096] {
            let mut outputs = vec![vec![1.0; 3]; 2];
            assert_eq!(node.execute(n, &mut outputs), ReadOutcome::Silence);
            assert!(outputs.iter().all(|ch| ch.len() == n && ch.iter().all(|s| *s == 0.0)));
        }
    }

    #[test]
    fn test_output_info_when_connected() {
        let network = LoopbackNetwork::new();
        let _cam = network.publish("Cam", "10.0.0.1", true);
        let mut node = node_for(&network);
        node.cook(&ConnectionParameters::for_source("Cam"));

        assert_eq!(node.output_info(), OutputInfo { channels: 2, sample_rate: 44100 });
        assert_eq!(node.channel_name(0), "chan1");
        assert_eq!(node.channel_name(5), "chan6");

        let mut params = ConnectionParameters::for_source("Cam");
        params.active = false;
        node.cook(&params);
        assert_eq!(node.output_info().channels, 0);
    }

    #[test]
    fn test_status_and_info() {
        let network = LoopbackNetwork::new();
        let _a = network.publish("CamA", "10.0.0.1", true);
        let _b = network.publish("CamB", "10.0.0.2", true);
        let mut node = node_for(&network);
        node.cook(&ConnectionParameters::for_source("CamB"));

        let status = node.status();
        assert!(status.connected);
        assert_eq!(status.source_count, 2);
        assert_eq!(status.channel_count, 2);
        assert_eq!(status.sample_rate, 44100);
        assert!(status.waiting_for_fill);
        assert!(status.error.is_none());

        let channels = node.info_channels();
        assert_eq!(channels[0], InfoChannel { name: "connected", value: 1.0 });
        assert_eq!(channels[1], InfoChannel { name: "num_sources", value: 2.0 });

        let table = node.info_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table[0], ["Sources".to_string(), "Addresses".to_string()]);
        assert_eq!(table[2], ["CamB".to_string(), "10.0.0.2".to_string()]);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "Connected");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_hides_output() {
        let network = LoopbackNetwork::new();
        network.set_fail_initialize(true);
        let mut node = node_for(&network);
        node.cook(&ConnectionParameters::for_source("Cam"));

        assert_eq!(node.output_info().channels, 0);
        let status = node.status();
        assert!(status.error.unwrap().starts_with("Could not initialize"));
        assert!(node.execute_block(64).is_empty());
    }
}
