//! Discovery and subscription lifecycle
//!
//! Evaluated once per host cycle on the cycle thread. Keeps at most one
//! subscription alive, rebuilding discovery or the subscription whenever the
//! relevant parameters differ from the previous cycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::audio::capture::{CaptureLoop, CaptureStats, ReceiverSlot};
use crate::audio::channels::{ChannelBuffers, SharedChannelBuffers};
use crate::connection::params::ConnectionParameters;
use crate::constants::{DEFAULT_BUFFER_LENGTH_S, DEFAULT_POLL_TIMEOUT_MS};
use crate::error::SourceError;
use crate::source::{Finder, MediaLibrary, SourceDescriptor};

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Inactive,
    Discovering,
    Connected,
    Error,
}

/// Owns the discovery handle, the subscription slot and the capture loop
pub struct ConnectionManager {
    library: Arc<dyn MediaLibrary>,
    finder: Option<Box<dyn Finder>>,
    receiver: ReceiverSlot,
    /// Cycle-thread mirror of the slot, so checks never take the connection lock
    connected: Option<SourceDescriptor>,
    buffers: SharedChannelBuffers,
    capture: CaptureLoop,
    params: ConnectionParameters,
    sources: Vec<SourceDescriptor>,
    state: ConnectionState,
    error: Option<SourceError>,
    warning: Option<String>,
}

impl ConnectionManager {
    /// Create a manager, initializing the media library once
    pub fn new(library: Arc<dyn MediaLibrary>) -> Self {
        Self::with_poll_timeout(library, Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
    }

    pub fn with_poll_timeout(library: Arc<dyn MediaLibrary>, poll_timeout: Duration) -> Self {
        let mut manager = Self {
            library,
            finder: None,
            receiver: Arc::new(Mutex::new(None)),
            connected: None,
            buffers: ChannelBuffers::shared(DEFAULT_BUFFER_LENGTH_S),
            capture: CaptureLoop::new(poll_timeout),
            params: ConnectionParameters {
                active: false,
                ..Default::default()
            },
            sources: Vec::new(),
            state: ConnectionState::Inactive,
            error: None,
            warning: None,
        };

        if let Err(err) = manager.library.initialize() {
            let err = match err {
                SourceError::Initialization(_) => err,
                other => SourceError::Initialization(other.to_string()),
            };
            tracing::error!("{}", err);
            manager.error = Some(err);
            manager.state = ConnectionState::Error;
        }

        manager
    }

    /// Apply this cycle's parameters.
    ///
    /// Faults raised by the library are recorded as the current error rather
    /// than returned.
    pub fn cook(&mut self, params: &ConnectionParameters) {
        if self.is_permanently_errored() {
            return;
        }

        if let Err(err) = self.evaluate(params) {
            let err = match err {
                SourceError::Runtime(_) => err,
                other => SourceError::Runtime(other.to_string()),
            };
            tracing::warn!("{}", err);
            self.error = Some(err);
            self.state = ConnectionState::Error;
        }
    }

    fn evaluate(&mut self, params: &ConnectionParameters) -> Result<(), SourceError> {
        if !params.active {
            if self.params.active {
                tracing::info!("Receiver deactivated");
            }
            self.deactivate();
            self.params.active = false;
            return Ok(());
        }

        if self.buffers.lock().set_buffer_length(params.clamped_buffer_length()) {
            tracing::debug!("Buffer length set to {}s", params.clamped_buffer_length());
        }

        if params.bandwidth != self.params.bandwidth && self.connected.is_some() {
            tracing::info!("Bandwidth changed to {}, dropping subscription", params.bandwidth);
            self.stop_receiving();
        }

        if params.extra_search_addresses != self.params.extra_search_addresses && self.finder.is_some() {
            tracing::debug!("Search addresses changed, restarting discovery");
            self.finder = None;
        }

        if params.source_name != self.params.source_name && self.connected.is_some() {
            tracing::info!("Requested source changed to {}, dropping subscription", params.source_name);
            self.stop_receiving();
        }

        self.params = params.clone();

        let sources = match self.refresh_sources() {
            Ok(sources) => sources,
            Err(err) => {
                self.sources.clear();
                return Err(err);
            }
        };
        if sources != self.sources {
            tracing::debug!("{} source(s) visible", sources.len());
        }
        self.sources = sources;

        if matches!(self.error, Some(SourceError::Runtime(_))) {
            self.error = None;
        }

        // Discovery and liveness are independent: a bound source that dropped
        // out of the list stays bound.
        if self.connected.is_some() {
            self.state = ConnectionState::Connected;
            return Ok(());
        }

        let Some(source) = self
            .sources
            .iter()
            .find(|s| s.display_name == params.source_name)
            .cloned()
        else {
            self.warning = Some(format!("Looking for source {}...", params.source_name));
            self.state = if self.error.is_some() {
                ConnectionState::Error
            } else {
                ConnectionState::Discovering
            };
            return Ok(());
        };

        self.start_receiving(source);
        Ok(())
    }

    /// Create the finder if needed and ask it for the current source list
    fn refresh_sources(&mut self) -> Result<Vec<SourceDescriptor>, SourceError> {
        if self.finder.is_none() {
            self.finder = Some(self.library.discover(&self.params.extra_search_addresses)?);
        }
        match self.finder.as_mut() {
            Some(finder) => finder.current_sources(),
            None => Ok(Vec::new()),
        }
    }

    fn start_receiving(&mut self, source: SourceDescriptor) {
        self.buffers.lock().clear();

        let receiver = match self.library.connect(&source, self.params.bandwidth) {
            Ok(receiver) => receiver,
            Err(err) => {
                tracing::error!("Failed to connect to {}: {}", source.display_name, err);
                self.error = Some(SourceError::ConnectionFailed(source.display_name));
                self.state = ConnectionState::Error;
                return;
            }
        };

        *self.receiver.lock() = Some(receiver);
        tracing::info!(
            "Connected to {} ({}) with {} bandwidth",
            source.display_name,
            source.network_address,
            self.params.bandwidth
        );
        self.connected = Some(source);

        if let Err(err) = self.capture.start(self.receiver.clone(), self.buffers.clone()) {
            tracing::error!("{}", err);
            self.stop_receiving();
            self.error = Some(err);
            self.state = ConnectionState::Error;
            return;
        }

        self.error = None;
        self.warning = None;
        self.state = ConnectionState::Connected;
    }

    /// Destroy the subscription under the connection lock, then wait for the
    /// capture loop to notice.
    fn stop_receiving(&mut self) {
        let Some(source) = self.connected.take() else {
            return;
        };

        drop(self.receiver.lock().take());
        self.capture.stop();
        self.state = ConnectionState::Discovering;

        tracing::info!("Disconnected from {}", source.display_name);
    }

    fn deactivate(&mut self) {
        self.stop_receiving();
        if self.finder.take().is_some() {
            tracing::debug!("Discovery stopped");
        }
        self.sources.clear();
        self.warning = None;
        self.state = ConnectionState::Inactive;
    }

    fn is_permanently_errored(&self) -> bool {
        self.error.as_ref().is_some_and(SourceError::is_permanent)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.params.active
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    pub fn connected_source(&self) -> Option<&SourceDescriptor> {
        self.connected.as_ref()
    }

    /// Sources seen by the last discovery pass
    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn error(&self) -> Option<&SourceError> {
        self.error.as_ref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    pub fn buffers(&self) -> &SharedChannelBuffers {
        &self.buffers
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.capture.stats()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_receiving();
        self.finder = None;
    }
}
