//! Background capture loop
//!
//! One dedicated thread per subscription polls the receiver and demultiplexes
//! audio frames into the channel buffers. The subscription itself lives in a
//! lock-guarded slot owned by the connection manager; the loop checks it out
//! under the connection lock on every iteration and exits once the slot is
//! empty or the running flag is cleared.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::audio::channels::SharedChannelBuffers;
use crate::error::SourceError;
use crate::source::{CapturedFrame, Receiver};

/// Slot holding the live subscription, guarded by the connection lock
pub type ReceiverSlot = Arc<Mutex<Option<Box<dyn Receiver>>>>;

/// Counters shared with the capture thread
#[derive(Debug, Default)]
pub struct CaptureCounters {
    frames_captured: AtomicU64,
    frames_skipped: AtomicU64,
    bytes_dropped: AtomicU64,
    format_changes: AtomicU64,
}

/// Snapshot of [`CaptureCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub frames_skipped: u64,
    pub bytes_dropped: u64,
    pub format_changes: u64,
}

/// What one poll step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The slot is empty, the loop must exit
    Disconnected,
    /// Nothing arrived, or the frame was not audio
    Idle,
    /// An audio frame was demultiplexed
    Audio { rebuilt: bool },
}

/// Capture thread handle
pub struct CaptureLoop {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    counters: Arc<CaptureCounters>,
    poll_timeout: Duration,
}

impl CaptureLoop {
    pub fn new(poll_timeout: Duration) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            counters: Arc::new(CaptureCounters::default()),
            poll_timeout,
        }
    }

    /// Start the capture thread. Does nothing if it is already running.
    pub fn start(
        &mut self,
        slot: ReceiverSlot,
        buffers: SharedChannelBuffers,
    ) -> Result<(), SourceError> {
        if self.is_running() {
            return Ok(());
        }

        // A previous thread that exited on its own is reaped here
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        let running = self.running.clone();
        let counters = self.counters.clone();
        let poll_timeout = self.poll_timeout;

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("source-capture".into())
            .spawn(move || {
                tracing::debug!("Capture loop started");
                run(&running, &slot, &buffers, &counters, poll_timeout);
                running.store(false, Ordering::SeqCst);
                tracing::debug!("Capture loop exited");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                SourceError::ThreadSpawn(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Signal the thread and wait for it. The subscription must already have
    /// been removed from the slot, or the flag alone stops it after at most one
    /// poll timeout.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Capture thread panicked");
            }
        }
    }

    /// Check if the capture thread is alive
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .thread_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CaptureCounters {
    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
            format_changes: self.format_changes.load(Ordering::Relaxed),
        }
    }
}

fn run(
    running: &AtomicBool,
    slot: &ReceiverSlot,
    buffers: &SharedChannelBuffers,
    counters: &CaptureCounters,
    poll_timeout: Duration,
) {
    let mut previous = CapturedFrame::None;

    while running.load(Ordering::SeqCst) {
        if capture_step(slot, buffers, counters, &mut previous, poll_timeout)
            == StepOutcome::Disconnected
        {
            break;
        }
    }

    // Hand the last frame back if the receiver is still around
    if let Some(receiver) = slot.lock().as_mut() {
        receiver.release(std::mem::take(&mut previous));
    }
}

/// One iteration of the capture loop.
///
/// Holds the connection lock for the whole step and the buffers lock while
/// rebuilding or writing.
pub fn capture_step(
    slot: &ReceiverSlot,
    buffers: &SharedChannelBuffers,
    counters: &CaptureCounters,
    previous: &mut CapturedFrame,
    poll_timeout: Duration,
) -> StepOutcome {
    let mut connection = slot.lock();
    let Some(receiver) = connection.as_mut() else {
        return StepOutcome::Disconnected;
    };

    if !previous.is_none() {
        receiver.release(std::mem::take(previous));
    }

    *previous = receiver.capture(poll_timeout);

    let Some(frame) = previous.as_audio() else {
        if !previous.is_none() {
            counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
        }
        return StepOutcome::Idle;
    };

    let report = buffers.lock().ingest(frame);
    drop(connection);

    counters.frames_captured.fetch_add(1, Ordering::Relaxed);
    counters
        .bytes_dropped
        .fetch_add(report.bytes_dropped as u64, Ordering::Relaxed);

    if report.rebuilt {
        counters.format_changes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "Audio format changed: {} channels at {} Hz",
            frame.channels,
            frame.sample_rate
        );
    }

    StepOutcome::Audio {
        rebuilt: report.rebuilt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::channels::ChannelBuffers;
    use crate::source::{AudioFrame, VideoFrame};
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Receiver replaying a fixed script of frames
    struct ScriptedReceiver {
        frames: VecDeque<CapturedFrame>,
        released: Arc<AtomicU64>,
    }

    impl Receiver for ScriptedReceiver {
        fn capture(&mut self, timeout: Duration) -> CapturedFrame {
            self.frames.pop_front().unwrap_or_else(|| {
                thread::sleep(timeout);
                CapturedFrame::None
            })
        }

        fn release(&mut self, frame: CapturedFrame) {
            if !frame.is_none() {
                self.released.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn scripted(frames: Vec<CapturedFrame>) -> (ReceiverSlot, Arc<AtomicU64>) {
        let released = Arc::new(AtomicU64::new(0));
        let receiver: Box<dyn Receiver> = Box::new(ScriptedReceiver {
            frames: frames.into(),
            released: released.clone(),
        });
        (Arc::new(Mutex::new(Some(receiver))), released)
    }

    fn audio(channels: usize, samples: usize) -> CapturedFrame {
        CapturedFrame::Audio(AudioFrame::from_planar(44100, &vec![vec![0.5; samples]; channels]))
    }

    fn video() -> CapturedFrame {
        CapturedFrame::Video(VideoFrame {
            width: 2,
            height: 2,
            frame_rate_n: 30,
            frame_rate_d: 1,
            data: Bytes::from_static(&[0; 16]),
        })
    }

    #[test]
    fn test_step_skips_video_and_releases_frames() {
        let (slot, released) = scripted(vec![video(), audio(2, 16), audio(6, 16)]);
        let buffers = ChannelBuffers::shared(0.25);
        let counters = CaptureCounters::default();
        let mut previous = CapturedFrame::None;
        let timeout = Duration::from_millis(1);

        assert_eq!(capture_step(&slot, &buffers, &counters, &mut previous, timeout), StepOutcome::Idle);
        assert_eq!(
            capture_step(&slot, &buffers, &counters, &mut previous, timeout),
            StepOutcome::Audio { rebuilt: false }
        );
        assert_eq!(
            capture_step(&slot, &buffers, &counters, &mut previous, timeout),
            StepOutcome::Audio { rebuilt: true }
        );
        assert_eq!(capture_step(&slot, &buffers, &counters, &mut previous, timeout), StepOutcome::Idle);

        // Every frame is released before the next poll
        assert_eq!(released.load(Ordering::SeqCst), 3);

        let stats = counters.snapshot();
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(stats.format_changes, 1);

        let buffers = buffers.lock();
        assert_eq!(buffers.channel_count(), 6);
        assert_eq!(buffers.read_available(), 64);
    }

    #[test]
    fn test_step_on_empty_slot() {
        let slot: ReceiverSlot = Arc::new(Mutex::new(None));
        let buffers = ChannelBuffers::shared(0.25);
        let mut previous = CapturedFrame::None;

        let outcome = capture_step(
            &slot,
            &buffers,
            &CaptureCounters::default(),
            &mut previous,
            Duration::from_millis(1),
        );
        assert_eq!(outcome, StepOutcome::Disconnected);
    }

    #[test]
    fn test_thread_exits_when_slot_cleared() {
        let (slot, _) = scripted(vec![audio(2, 32)]);
        let buffers = ChannelBuffers::shared(0.25);
        let mut capture = CaptureLoop::new(Duration::from_millis(5));

        capture.start(slot.clone(), buffers.clone()).unwrap();
        assert!(capture.is_running());

        // Second start is a no-op
        capture.start(slot.clone(), buffers.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while capture.stats().frames_captured == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(capture.stats().frames_captured, 1);

        slot.lock().take();
        let started = Instant::now();
        capture.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!capture.is_running());
        assert_eq!(buffers.lock().read_available(), 128);
    }

    #[test]
    fn test_restart_after_exit() {
        let (slot, _) = scripted(Vec::new());
        let buffers = ChannelBuffers::shared(0.25);
        let mut capture = CaptureLoop::new(Duration::from_millis(1));

        let empty: ReceiverSlot = Arc::new(Mutex::new(None));
        capture.start(empty, buffers.clone()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while capture.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!capture.is_running());

        capture.start(slot, buffers).unwrap();
        assert!(capture.is_running());
        capture.stop();
    }
}
