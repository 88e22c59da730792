//! Push transports
//!
//! A reader with `transport: notify` does not poll. Its frames come from a
//! [`NotificationSource`] backend, looked up by the reader's `backend` name in
//! a [`NotifierRegistry`]. The backend sends every notification payload into a
//! channel; the broker drains that channel on its own thread and feeds the
//! device's `NotificationLoop`, so one thread decodes and publishes per device.
//!
//! | Backend | Source |
//! |---------|--------|
//! | `capture` | [`CaptureNotifier`], replays a capture file as notifications |
//!
//! A Bluetooth stack plugs in by registering its own [`NotifierFactory`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use airlog_core::decoder::Frame;
use airlog_core::errors::{ConfigError, SourceError};
use airlog_core::source::{FrameSource, NotificationSource};

use crate::config::ReaderConfig;
use crate::replay::ReplaySource;
use crate::ConnectorError;

/// Backend used when the reader names none
pub const DEFAULT_BACKEND: &str = "capture";

/// Channel end a backend delivers notification payloads to
pub type FrameSender = Sender<Frame>;

/// Builds a notification backend for a reader
///
/// `idle` is the reader's timeout, the longest a backend should block before
/// checking whether it was stopped.
pub type NotifierFactory =
    fn(&ReaderConfig, FrameSender, Duration) -> Result<Box<dyn NotificationSource>, ConnectorError>;

fn capture(reader: &ReaderConfig, frames: FrameSender, idle: Duration) -> Result<Box<dyn NotificationSource>, ConnectorError> {
    Ok(Box::new(CaptureNotifier::new(&reader.device, frames).with_idle_delay(idle)))
}

#[derive(Clone)]
pub struct NotifierRegistry {
    factories: BTreeMap<&'static str, NotifierFactory>,
}

impl NotifierRegistry {
    /// Registry without any backends
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the bundled backends
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_BACKEND, capture);
        registry
    }

    /// Add or replace a backend
    pub fn register(&mut self, name: &'static str, factory: NotifierFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(
        &self,
        reader: &ReaderConfig,
        frames: FrameSender,
        idle: Duration,
    ) -> Result<Box<dyn NotificationSource>, ConnectorError> {
        let name = reader.backend.as_deref().unwrap_or(DEFAULT_BACKEND);
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown notification backend {:?}", name)))?;
        factory(reader, frames, idle)
    }
}

impl std::fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct Worker {
    running: Arc<AtomicBool>,
    /// Yields the sender back when the thread was stopped, not failed
    handle: JoinHandle<Option<FrameSender>>,
}

/// Capture file delivered as notifications from a background thread
///
/// Frames flow only between `start_notify` and `stop_notify`. The capture is
/// opened by `start_notify`, so a missing file fails the subscription. The
/// delivery thread owns the channel sender; when it fails the channel
/// disconnects and the receiving side sees the end of the stream.
pub struct CaptureNotifier {
    path: PathBuf,
    idle: Duration,
    frames: Option<FrameSender>,
    worker: Option<Worker>,
}

impl CaptureNotifier {
    pub fn new(path: impl Into<PathBuf>, frames: FrameSender) -> Self {
        Self {
            path: path.into(),
            idle: Duration::from_millis(100),
            frames: Some(frames),
            worker: None,
        }
    }

    /// Pause between polls once the capture is exhausted
    pub fn with_idle_delay(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_notifying(&self) -> bool {
        self.worker.is_some()
    }
}

fn deliver(mut source: ReplaySource, frames: FrameSender, running: &AtomicBool, label: &str) -> Option<FrameSender> {
    let mut frames = Some(frames);
    while running.load(Ordering::Acquire) {
        let Some(sender) = frames.as_ref() else { break };
        match source.read_frame() {
            Ok(frame) if frame.is_empty() => {}
            Ok(frame) => {
                if sender.send(frame).is_err() {
                    log::debug!("{}: receiver gone, stopping notifications", label);
                    frames = None;
                }
            }
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(e)) => {
                log::error!("{}: {}", label, e);
                frames = None;
            }
        }
    }
    source.close();
    frames
}

impl NotificationSource for CaptureNotifier {
    fn start_notify(&mut self) -> Result<(), SourceError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let mut source = ReplaySource::new(&self.path).with_idle_delay(self.idle);
        source.open()?;
        let frames = self.frames.take().ok_or(SourceError::EndOfStream)?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let label = self.path.display().to_string();
        let handle = thread::Builder::new()
            .name("notify-capture".into())
            .spawn(move || deliver(source, frames, &flag, &label))
            .map_err(|e| SourceError::Io(e.to_string()))?;

        log::debug!("Notifications from {} started", self.path.display());
        self.worker = Some(Worker { running, handle });
        Ok(())
    }

    fn stop_notify(&mut self) -> Result<(), SourceError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.running.store(false, Ordering::Release);
        self.frames = worker
            .handle
            .join()
            .map_err(|_| SourceError::Io(format!("notification thread for {} panicked", self.path.display())))?;
        log::debug!("Notifications from {} stopped", self.path.display());
        Ok(())
    }
}

impl Drop for CaptureNotifier {
    fn drop(&mut self) {
        if let Err(e) = self.stop_notify() {
            log::warn!("{}", e);
        }
    }
}

impl std::fmt::Debug for CaptureNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureNotifier")
            .field("path", &self.path)
            .field("notifying", &self.is_notifying())
            .finish()
    }
}
