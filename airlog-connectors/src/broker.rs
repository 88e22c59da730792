//! Logger broker
//!
//! Built once at startup from a [`LoggerConfig`]: resolves the sensor model
//! and every sink through their registries, opens nothing yet, and subscribes
//! one [`SinkPipeline`] per writer to the device's bus. [`Broker::run_until`]
//! then connects the source and drives the acquisition loop.
//!
//! Poll transports (`serial`, `replay`) run an [`AcquisitionLoop`]. The
//! `notify` transport runs a [`NotificationLoop`] fed from the channel its
//! backend delivers into; see [`crate::notify`].

use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use airlog_core::acquisition::{AcquisitionLoop, LoopState, NotificationLoop, StepOutcome};
use airlog_core::bus::EventBus;
use airlog_core::decoder::{Frame, FrameDecoder};
use airlog_core::errors::{AcquisitionError, SourceError};
use airlog_core::events::DeviceId;
use airlog_core::reducer::WindowReducer;
use airlog_core::registry::ModelRegistry;
use airlog_core::sink::{Sink, SinkPipeline};
use airlog_core::source::{FrameSource, NotificationSource};
use airlog_core::time::SystemTime;
use airlog_core::validators::ValidationChain;

use crate::config::{LoggerConfig, ReaderConfig, Transport, WriterConfig};
use crate::notify::NotifierRegistry;
use crate::registry::SinkRegistry;
use crate::replay::ReplaySource;
use crate::Result;

/// Acquisition loop over type-erased transport and decoder
pub type DeviceLoop = AcquisitionLoop<Box<dyn FrameSource>, Box<dyn FrameDecoder>, SystemTime>;

/// Notification loop over a type-erased backend and decoder
pub type PushLoop = NotificationLoop<Box<dyn NotificationSource>, Box<dyn FrameDecoder>, SystemTime>;

enum Driver {
    Poll(DeviceLoop),
    Push {
        acquisition: PushLoop,
        frames: Receiver<Frame>,
        idle: Duration,
    },
}

pub struct Broker {
    driver: Driver,
    writers: usize,
}

fn read_timeout(reader: &ReaderConfig, decoder: &dyn FrameDecoder) -> Duration {
    Duration::from_millis(reader.timeout_ms.unwrap_or_else(|| decoder.read_timeout_ms()))
}

impl Broker {
    /// Broker with the bundled models, sinks and notification backends
    pub fn from_config(config: &LoggerConfig) -> Result<Self> {
        Self::with_registries(config, &ModelRegistry::new(), &SinkRegistry::new())
    }

    pub fn with_registries(config: &LoggerConfig, models: &ModelRegistry, sinks: &SinkRegistry) -> Result<Self> {
        Self::with_notifiers(config, models, sinks, &NotifierRegistry::new())
    }

    /// Broker resolving `notify` readers through `notifiers`
    pub fn with_notifiers(
        config: &LoggerConfig,
        models: &ModelRegistry,
        sinks: &SinkRegistry,
        notifiers: &NotifierRegistry,
    ) -> Result<Self> {
        let decoder = models.create(&config.reader.model, &config.reader.model_options())?;
        if config.reader.transport != Transport::Notify {
            let source = open_source(&config.reader, decoder.as_ref())?;
            return Self::assemble(config, source, decoder, sinks);
        }

        let idle = read_timeout(&config.reader, decoder.as_ref());
        let (tx, frames) = mpsc::channel();
        let source = notifiers.create(&config.reader, tx, idle)?;
        let device = DeviceId::new(config.reader.device.as_str());
        let mut acquisition = NotificationLoop::new(device.clone(), source, decoder, SystemTime);
        if let Some(count) = config.reader.frames_per_event {
            acquisition = acquisition.with_frames_per_event(count);
        }
        subscribe_writers(&device, config, sinks, acquisition.bus_mut())?;
        log::info!(
            "{}: {} notifications with {} writers",
            device,
            acquisition.decoder().model(),
            config.writers.len()
        );
        Ok(Self {
            driver: Driver::Push {
                acquisition,
                frames,
                idle,
            },
            writers: config.writers.len(),
        })
    }

    /// Broker reading from `source` instead of the configured transport
    pub fn with_source(
        config: &LoggerConfig,
        source: Box<dyn FrameSource>,
        models: &ModelRegistry,
        sinks: &SinkRegistry,
    ) -> Result<Self> {
        let decoder = models.create(&config.reader.model, &config.reader.model_options())?;
        Self::assemble(config, source, decoder, sinks)
    }

    fn assemble(
        config: &LoggerConfig,
        source: Box<dyn FrameSource>,
        decoder: Box<dyn FrameDecoder>,
        sinks: &SinkRegistry,
    ) -> Result<Self> {
        let device = DeviceId::new(config.reader.device.as_str());
        let model = decoder.model();

        let mut acquisition = AcquisitionLoop::new(device.clone(), source, decoder, SystemTime);
        if let Some(frames) = config.reader.frames_per_event {
            acquisition = acquisition.with_frames_per_event(frames);
        }
        subscribe_writers(&device, config, sinks, acquisition.bus_mut())?;

        log::info!("{}: {} reader with {} writers", device, model, config.writers.len());
        Ok(Self {
            driver: Driver::Poll(acquisition),
            writers: config.writers.len(),
        })
    }

    pub fn device(&self) -> &DeviceId {
        match &self.driver {
            Driver::Poll(acquisition) => acquisition.device(),
            Driver::Push { acquisition, .. } => acquisition.device(),
        }
    }

    pub fn model(&self) -> &'static str {
        match &self.driver {
            Driver::Poll(acquisition) => acquisition.decoder().model(),
            Driver::Push { acquisition, .. } => acquisition.decoder().model(),
        }
    }

    pub fn writers(&self) -> usize {
        self.writers
    }

    /// Whether the reader is push-driven
    pub fn is_push(&self) -> bool {
        matches!(self.driver, Driver::Push { .. })
    }

    /// Poll loop state; a push reader is `Streaming` while subscribed
    pub fn state(&self) -> LoopState {
        match &self.driver {
            Driver::Poll(acquisition) => acquisition.state(),
            Driver::Push { acquisition, .. } if acquisition.is_subscribed() => LoopState::Streaming,
            Driver::Push { .. } => LoopState::Disconnected,
        }
    }

    pub fn bus(&self) -> &EventBus {
        match &self.driver {
            Driver::Poll(acquisition) => acquisition.bus(),
            Driver::Push { acquisition, .. } => acquisition.bus(),
        }
    }

    /// Read and dispatch until `stop` returns true or the source fails
    ///
    /// Returns the number of published events.
    pub fn run_until<F>(&mut self, stop: F) -> Result<usize>
    where
        F: FnMut() -> bool,
    {
        let published = match &mut self.driver {
            Driver::Poll(acquisition) => acquisition.run_until(stop)?,
            Driver::Push {
                acquisition,
                frames,
                idle,
            } => run_push(acquisition, frames, *idle, stop)?,
        };
        log::info!("{}: {} events published", self.device(), published);
        Ok(published)
    }
}

/// Subscribe, feed every delivered frame to the loop, unsubscribe
fn run_push<F>(acquisition: &mut PushLoop, frames: &Receiver<Frame>, idle: Duration, mut stop: F) -> Result<usize>
where
    F: FnMut() -> bool,
{
    acquisition.subscribe()?;

    let mut published = 0;
    while !stop() {
        match frames.recv_timeout(idle) {
            Ok(frame) => {
                if acquisition.on_notification(&frame) == StepOutcome::Published {
                    published += 1;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if let Err(e) = acquisition.unsubscribe() {
                    log::warn!("{}", e);
                }
                return Err(AcquisitionError::SourceFailed {
                    device: acquisition.device().to_string(),
                    error: SourceError::EndOfStream,
                }
                .into());
            }
        }
    }

    acquisition.unsubscribe()?;
    Ok(published)
}

fn subscribe_writers(device: &DeviceId, config: &LoggerConfig, sinks: &SinkRegistry, bus: &mut EventBus) -> Result<()> {
    for writer in &config.writers {
        let pipeline = build_pipeline(device, writer, sinks)?;
        log::info!(
            "{}: writer {} with filters {:?}",
            device,
            pipeline.sink().name(),
            pipeline.chain().names().collect::<Vec<_>>()
        );
        bus.subscribe(pipeline);
    }
    Ok(())
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("device", self.device())
            .field("model", &self.model())
            .field("writers", &self.writers)
            .field("state", &self.state())
            .finish()
    }
}

/// Wrap a configured sink with its reducer and filters
pub fn build_pipeline(
    device: &DeviceId,
    writer: &WriterConfig,
    sinks: &SinkRegistry,
) -> Result<SinkPipeline<Box<dyn Sink>>> {
    let sink = sinks.create(&writer.sink, &writer.params)?;

    let mut chain = ValidationChain::new(device.clone());
    for filter in &writer.filters {
        chain.push(filter.build()?);
    }

    let mut pipeline = SinkPipeline::new(device.clone(), sink).with_chain(chain);
    if let Some(size) = writer.window {
        pipeline = pipeline.with_reducer(WindowReducer::new(size)?);
    }
    Ok(pipeline)
}

/// Transport for the reader; nothing is opened until the loop connects
pub fn open_source(reader: &ReaderConfig, decoder: &dyn FrameDecoder) -> Result<Box<dyn FrameSource>> {
    let timeout = read_timeout(reader, decoder);
    match reader.transport {
        Transport::Serial => serial_source(reader, decoder, timeout),
        Transport::Replay => {
            let source = ReplaySource::new(Path::new(&reader.device)).with_idle_delay(timeout);
            Ok(Box::new(source))
        }
        Transport::Notify => Err(crate::ConnectorError::Config(airlog_core::errors::ConfigError::Invalid(
            "notify readers have no poll source".into(),
        ))),
    }
}

#[cfg(feature = "serial")]
fn serial_source(reader: &ReaderConfig, decoder: &dyn FrameDecoder, timeout: Duration) -> Result<Box<dyn FrameSource>> {
    use crate::serial::{SerialSource, DEFAULT_BAUD_RATE};

    let baud_rate = reader.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    let source = SerialSource::for_decoder(reader.device.as_str(), baud_rate, decoder).with_timeout(timeout);
    Ok(Box::new(source))
}

#[cfg(not(feature = "serial"))]
fn serial_source(_: &ReaderConfig, _: &dyn FrameDecoder, _: Duration) -> Result<Box<dyn FrameSource>> {
    Err(crate::ConnectorError::Config(airlog_core::errors::ConfigError::Invalid(
        "serial transport not available in this build".into(),
    )))
}
