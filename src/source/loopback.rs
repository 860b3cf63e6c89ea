//! In-process loopback media library
//!
//! Sources are published on a shared [`LoopbackNetwork`] and fan their frames
//! out to every connected receiver through bounded channels. Used by the demo
//! binary and the tests, and handy for hosts without a real network library.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver as FrameRx, RecvTimeoutError, Sender as FrameTx, TrySendError};
use parking_lot::RwLock;

use super::{Bandwidth, CapturedFrame, Finder, MediaLibrary, Receiver, SourceDescriptor};
use crate::error::SourceError;

/// Frames queued per receiver before new ones are dropped
pub const RECEIVER_QUEUE_CAPACITY: usize = 64;

struct PublishedSource {
    id: u64,
    descriptor: SourceDescriptor,
    discoverable: bool,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    bandwidth: Bandwidth,
    tx: FrameTx<CapturedFrame>,
}

#[derive(Default)]
struct NetworkInner {
    sources: RwLock<Vec<PublishedSource>>,
    next_id: AtomicU64,
    fail_initialize: AtomicBool,
    fail_connect: AtomicBool,
    fail_discover: AtomicBool,
    live_receivers: AtomicUsize,
    peak_receivers: AtomicUsize,
    connects: AtomicUsize,
}

/// Shared in-process network
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a source. Non-discoverable sources are only visible to finders
    /// whose extra addresses include `address`.
    pub fn publish(
        &self,
        name: impl Into<String>,
        address: impl Into<String>,
        discoverable: bool,
    ) -> LoopbackSource {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let descriptor = SourceDescriptor::new(name, address);
        tracing::debug!("Publishing loopback source {}", descriptor.display_name);

        self.inner.sources.write().push(PublishedSource {
            id,
            descriptor: descriptor.clone(),
            discoverable,
            subscribers: Vec::new(),
        });

        LoopbackSource {
            network: self.clone(),
            id,
            descriptor,
        }
    }

    /// Make `initialize` fail, as on an unsupported CPU
    pub fn set_fail_initialize(&self, fail: bool) {
        self.inner.fail_initialize.store(fail, Ordering::SeqCst);
    }

    /// Make every `connect` fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make every finder's source query fail
    pub fn set_fail_discover(&self, fail: bool) {
        self.inner.fail_discover.store(fail, Ordering::SeqCst);
    }

    /// Receivers currently alive
    pub fn live_receivers(&self) -> usize {
        self.inner.live_receivers.load(Ordering::SeqCst)
    }

    /// Highest number of receivers ever alive at once
    pub fn peak_receivers(&self) -> usize {
        self.inner.peak_receivers.load(Ordering::SeqCst)
    }

    /// Successful connections so far
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    fn visible_sources(&self, extra_addresses: &[String]) -> Vec<SourceDescriptor> {
        self.inner
            .sources
            .read()
            .iter()
            .filter(|s| {
                s.discoverable || extra_addresses.iter().any(|a| *a == s.descriptor.network_address)
            })
            .map(|s| s.descriptor.clone())
            .collect()
    }

    fn unpublish(&self, id: u64) {
        self.inner.sources.write().retain(|s| s.id != id);
    }
}

impl MediaLibrary for LoopbackNetwork {
    fn initialize(&self) -> Result<(), SourceError> {
        if self.inner.fail_initialize.load(Ordering::SeqCst) {
            return Err(SourceError::Initialization("CPU may be unsupported".into()));
        }
        Ok(())
    }

    fn discover(&self, extra_addresses: &str) -> Result<Box<dyn Finder>, SourceError> {
        let extra_addresses = extra_addresses
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();

        Ok(Box::new(LoopbackFinder {
            network: self.clone(),
            extra_addresses,
        }))
    }

    fn connect(
        &self,
        source: &SourceDescriptor,
        bandwidth: Bandwidth,
    ) -> Result<Box<dyn Receiver>, SourceError> {
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(SourceError::ConnectionFailed(source.display_name.clone()));
        }

        let (tx, rx) = bounded(RECEIVER_QUEUE_CAPACITY);
        {
            let mut sources = self.inner.sources.write();
            let published = sources
                .iter_mut()
                .find(|s| s.descriptor == *source)
                .ok_or_else(|| SourceError::ConnectionFailed(source.display_name.clone()))?;
            published.subscribers.push(Subscriber { bandwidth, tx });
        }

        let live = self.inner.live_receivers.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_receivers.fetch_max(live, Ordering::SeqCst);
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(LoopbackReceiver {
            network: self.clone(),
            rx,
        }))
    }
}

struct LoopbackFinder {
    network: LoopbackNetwork,
    extra_addresses: Vec<String>,
}

impl Finder for LoopbackFinder {
    fn current_sources(&mut self) -> Result<Vec<SourceDescriptor>, SourceError> {
        if self.network.inner.fail_discover.load(Ordering::SeqCst) {
            return Err(SourceError::Runtime("discovery query failed".into()));
        }
        Ok(self.network.visible_sources(&self.extra_addresses))
    }
}

struct LoopbackReceiver {
    network: LoopbackNetwork,
    rx: FrameRx<CapturedFrame>,
}

impl Receiver for LoopbackReceiver {
    fn capture(&mut self, timeout: Duration) -> CapturedFrame {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => CapturedFrame::None,
            Err(RecvTimeoutError::Disconnected) => {
                // Source went away; keep the bounded wait so the caller's loop
                // does not spin.
                std::thread::sleep(timeout);
                CapturedFrame::None
            }
        }
    }
}

impl Drop for LoopbackReceiver {
    fn drop(&mut self) {
        self.network.inner.live_receivers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Publisher handle. Dropping it removes the source from the network.
pub struct LoopbackSource {
    network: LoopbackNetwork,
    id: u64,
    descriptor: SourceDescriptor,
}

impl LoopbackSource {
    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    /// Deliver a frame to every connected receiver.
    /// Returns how many receivers accepted it.
    pub fn send(&self, frame: CapturedFrame) -> usize {
        let mut sources = self.network.inner.sources.write();
        let Some(published) = sources.iter_mut().find(|s| s.id == self.id) else {
            return 0;
        };

        let mut delivered = 0;
        published.subscribers.retain(|sub| match sub.tx.try_send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    /// Bandwidth modes of the receivers currently connected
    pub fn subscriber_bandwidths(&self) -> Vec<Bandwidth> {
        self.network
            .inner
            .sources
            .read()
            .iter()
            .find(|s| s.id == self.id)
            .map(|s| {
                s.subscribers.iter().map(|sub| sub.bandwidth).collect()
            })
            .unwrap_or_default()
    }
}

impl Drop for LoopbackSource {
    fn drop(&mut self) {
        self.network.unpublish(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::AudioFrame;

    #[test]
    fn test_discovery_order_and_extra_addresses() {
        let network = LoopbackNetwork::new();
        let _a = network.publish("CamA", "10.0.0.1", true);
        let _hidden = network.publish("Remote", "192.168.5.9", false);
        let _b = network.publish("CamB", "10.0.0.2", true);

        let mut finder = network.discover("").unwrap();
        let names: Vec<_> = finder
            .current_sources()
            .unwrap()
            .into_iter()
            .map(|s| s.display_name)
            .collect();
        assert_eq!(names, vec!["CamA", "CamB"]);

        let mut finder = network.discover("1.2.3.4, 192.168.5.9").unwrap();
        assert_eq!(finder.current_sources().unwrap().len(), 3);
    }

    #[test]
    fn test_unpublish_on_drop() {
        let network = LoopbackNetwork::new();
        let source = network.publish("CamA", "10.0.0.1", true);
        let mut finder = network.discover("").unwrap();
        assert_eq!(finder.current_sources().unwrap().len(), 1);

        drop(source);
        assert!(finder.current_sources().unwrap().is_empty());
    }

    #[test]
    fn test_frames_reach_receiver() {
        let network = LoopbackNetwork::new();
        let source = network.publish("CamA", "10.0.0.1", true);
        let mut receiver = network.connect(source.descriptor(), Bandwidth::Low).unwrap();
        assert_eq!(network.live_receivers(), 1);
        assert_eq!(source.subscriber_bandwidths(), vec![Bandwidth::Low]);

        let frame = AudioFrame::from_planar(48000, &[vec![0.5; 4]]);
        assert_eq!(source.send(CapturedFrame::Audio(frame)), 1);

        let captured = receiver.capture(Duration::from_millis(100));
        assert_eq!(captured.as_audio().map(|f| f.samples_per_channel), Some(4));
        assert!(receiver.capture(Duration::from_millis(1)).is_none());

        drop(receiver);
        assert_eq!(network.live_receivers(), 0);
        assert_eq!(source.send(CapturedFrame::None), 0);
    }

    #[test]
    fn test_failure_switches() {
        let network = LoopbackNetwork::new();
        let source = network.publish("CamA", "10.0.0.1", true);

        network.set_fail_initialize(true);
        assert!(matches!(network.initialize(), Err(SourceError::Initialization(_))));

        network.set_fail_connect(true);
        assert!(matches!(
            network.connect(source.descriptor(), Bandwidth::High),
            Err(SourceError::ConnectionFailed(_))
        ));
        assert_eq!(network.live_receivers(), 0);

        let mut finder = network.discover("").unwrap();
        network.set_fail_discover(true);
        assert!(matches!(finder.current_sources(), Err(SourceError::Runtime(_))));
        network.set_fail_discover(false);
        assert_eq!(finder.current_sources().unwrap().len(), 1);
    }

    #[test]
    fn test_connect_to_unknown_source_fails() {
        let network = LoopbackNetwork::new();
        let ghost = SourceDescriptor::new("Ghost", "10.0.0.9");
        assert!(network.connect(&ghost, Bandwidth::High).is_err());
    }
}
