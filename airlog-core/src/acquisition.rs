//! Acquisition Loops
//!
//! ## Overview
//!
//! An acquisition loop owns one device: its source, its decoder, its clock and
//! its [`EventBus`]. It cuts the incoming data into cycles, decodes every
//! frame, merges the partial records of a cycle and publishes the result as a
//! stamped [`Event`].
//!
//! Two flavours exist because transports come in two shapes:
//!
//! - [`AcquisitionLoop`] polls a [`FrameSource`] (serial port, capture file).
//! - [`NotificationLoop`] is driven by a [`NotificationSource`] that pushes
//!   frames into [`NotificationLoop::on_notification`] (BLE notify).
//!
//! ## State Machine
//!
//! ```text
//!                connect()                 frame start
//! Disconnected ────────────> Syncing ─────────────────────> Streaming
//!      ^                        │                               │
//!      │      SourceError       │         SourceError           │
//!      └────────────────────────┴───────────────────────────────┘
//!                        disconnect() / drop
//! ```
//!
//! While `Syncing`, frames that cannot open a dataset are thrown away. The
//! first frame that can is kept as the first frame of the first cycle.
//!
//! While `Streaming`, a cycle collects `frames_per_event` frames. Models with
//! multi-line datasets only start a cycle on a frame-start frame. A malformed
//! frame drops the partial cycle; the loop keeps streaming.
//!
//! ## Failure Handling
//!
//! | Failure | Log level | Effect |
//! |---------|-----------|--------|
//! | Malformed frame | warn | partial cycle dropped, state unchanged |
//! | Empty read (timeout) | none | idle step |
//! | Source error | error | source closed, `Disconnected`, error returned |
//!
//! There is no automatic reconnect. Callers that want one call
//! [`AcquisitionLoop::connect`] again.

use alloc::string::ToString;
use core::mem;

use crate::bus::EventBus;
use crate::decoder::FrameDecoder;
use crate::errors::{AcquisitionError, DecodeError, SourceError};
use crate::events::{DeviceId, Event, Record};
use crate::source::{FrameSource, NotificationSource};
use crate::time::TimeSource;

/// Connection state of an [`AcquisitionLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Disconnected,
    /// Connected, waiting for a frame that opens a dataset
    Syncing,
    Streaming,
}

/// What a single step did with the frame it read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Read timed out without data
    Idle,
    /// Frame skipped while looking for a dataset start
    Discarded,
    /// Frame decoded, cycle not complete yet
    Pending,
    /// Frame malformed, partial cycle dropped
    Rejected,
    /// Cycle complete, event published
    Published,
}

enum Assembled {
    Discarded,
    Pending,
    Rejected(DecodeError),
    Complete(Record),
}

/// Merges the decoded frames of one cycle
struct CycleAssembler<D> {
    decoder: D,
    frames_per_event: usize,
    record: Record,
    frames: usize,
    /// Dataset starts that landed inside an open cycle
    merged: usize,
}

impl<D: FrameDecoder> CycleAssembler<D> {
    fn new(decoder: D) -> Self {
        let frames_per_event = decoder.frames_per_event().max(1);
        Self {
            decoder,
            frames_per_event,
            record: Record::new(),
            frames: 0,
            merged: 0,
        }
    }

    fn multi_frame(&self) -> bool {
        self.frames_per_event > 1
    }

    fn push(&mut self, frame: &[u8]) -> Assembled {
        if self.multi_frame() && self.frames == 0 && !self.decoder.is_frame_start(frame) {
            return Assembled::Discarded;
        }
        if self.multi_frame() && self.frames > 0 && self.decoder.is_frame_start(frame) {
            // a line of the previous dataset went missing; the cycle is not restarted
            self.merged += 1;
            log::debug!(
                "{}: dataset start after {} of {} frames, merging into the open cycle",
                self.decoder.model(),
                self.frames,
                self.frames_per_event
            );
        }

        match self.decoder.decode(frame) {
            Ok(partial) => {
                self.record.extend(partial);
                self.frames += 1;
                if self.frames < self.frames_per_event {
                    Assembled::Pending
                } else {
                    self.frames = 0;
                    Assembled::Complete(mem::take(&mut self.record))
                }
            }
            Err(e) => {
                self.reset();
                Assembled::Rejected(e)
            }
        }
    }

    fn reset(&mut self) {
        self.record.clear();
        self.frames = 0;
    }
}

fn dispatch<T: TimeSource>(device: &DeviceId, clock: &T, bus: &mut EventBus, assembled: Assembled) -> StepOutcome {
    match assembled {
        Assembled::Discarded => {
            log::debug!("{}: frame outside a dataset discarded", device);
            StepOutcome::Discarded
        }
        Assembled::Pending => StepOutcome::Pending,
        Assembled::Rejected(e) => {
            log::warn!("{}: {}, dropping partial cycle", device, e);
            StepOutcome::Rejected
        }
        Assembled::Complete(record) => {
            let event = Event::new(device.clone(), clock.now(), record);
            let delivered = bus.publish(&event);
            log::debug!("{}: event at {} delivered to {} subscribers", device, event.timestamp, delivered);
            StepOutcome::Published
        }
    }
}

/// Poll-driven acquisition loop for one device
pub struct AcquisitionLoop<S: FrameSource, D: FrameDecoder, T: TimeSource> {
    device: DeviceId,
    source: S,
    cycle: CycleAssembler<D>,
    clock: T,
    bus: EventBus,
    state: LoopState,
}

impl<S: FrameSource, D: FrameDecoder, T: TimeSource> AcquisitionLoop<S, D, T> {
    pub fn new(device: DeviceId, source: S, decoder: D, clock: T) -> Self {
        Self {
            bus: EventBus::new(device.clone()),
            device,
            source,
            cycle: CycleAssembler::new(decoder),
            clock,
            state: LoopState::Disconnected,
        }
    }

    /// Override the decoder's frames-per-event count
    pub fn with_frames_per_event(mut self, frames: usize) -> Self {
        self.cycle.frames_per_event = frames.max(1);
        self
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn decoder(&self) -> &D {
        &self.cycle.decoder
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The device's bus, for subscribing sink pipelines
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Open the source, flush stale input and send the activation command
    pub fn connect(&mut self) -> Result<(), AcquisitionError> {
        if self.state != LoopState::Disconnected {
            return Ok(());
        }

        let opened = self.source.open().and_then(|()| self.source.flush_input()).and_then(|()| {
            match self.cycle.decoder.activation_command() {
                Some(command) => self.source.write(command),
                None => Ok(()),
            }
        });
        if let Err(error) = opened {
            return Err(self.fail(error));
        }

        self.cycle.reset();
        self.state = LoopState::Syncing;
        log::info!("{}: connected, synchronizing {} stream", self.device, self.cycle.decoder.model());
        Ok(())
    }

    /// Read one frame and advance the state machine
    pub fn step(&mut self) -> Result<StepOutcome, AcquisitionError> {
        if self.state == LoopState::Disconnected {
            return Err(AcquisitionError::NotConnected {
                device: self.device.to_string(),
            });
        }

        let frame = match self.source.read_frame() {
            Ok(frame) if frame.is_empty() => return Ok(StepOutcome::Idle),
            Ok(frame) => frame,
            Err(nb::Error::WouldBlock) => return Ok(StepOutcome::Idle),
            Err(nb::Error::Other(error)) => return Err(self.fail(error)),
        };
        log::trace!("{}: read {} bytes", self.device, frame.len());

        if self.state == LoopState::Syncing {
            if !self.cycle.decoder.is_frame_start(&frame) {
                log::debug!("{}: waiting for dataset start, {} bytes skipped", self.device, frame.len());
                return Ok(StepOutcome::Discarded);
            }
            self.state = LoopState::Streaming;
            log::info!("{}: synchronized", self.device);
        }

        let assembled = self.cycle.push(&frame);
        Ok(dispatch(&self.device, &self.clock, &mut self.bus, assembled))
    }

    /// Connect, step until `stop` returns true, then disconnect
    ///
    /// Returns the number of published events. A source failure ends the run
    /// early with the source already closed.
    pub fn run_until<F>(&mut self, mut stop: F) -> Result<usize, AcquisitionError>
    where
        F: FnMut() -> bool,
    {
        self.connect()?;

        let mut published = 0;
        while !stop() {
            if self.step()? == StepOutcome::Published {
                published += 1;
            }
        }

        self.disconnect();
        Ok(published)
    }

    /// Send the deactivation command and close the source
    pub fn disconnect(&mut self) {
        if self.state == LoopState::Disconnected {
            return;
        }
        if let Some(command) = self.cycle.decoder.deactivation_command() {
            if let Err(e) = self.source.write(command) {
                log::warn!("{}: deactivation command failed: {}", self.device, e);
            }
        }
        self.source.close();
        self.cycle.reset();
        self.state = LoopState::Disconnected;
        log::info!("{}: disconnected", self.device);
    }

    fn fail(&mut self, error: SourceError) -> AcquisitionError {
        log::error!("{}: source failed: {}", self.device, error);
        self.source.close();
        self.cycle.reset();
        self.state = LoopState::Disconnected;
        AcquisitionError::SourceFailed {
            device: self.device.to_string(),
            error,
        }
    }
}

impl<S: FrameSource, D: FrameDecoder, T: TimeSource> Drop for AcquisitionLoop<S, D, T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Push-driven acquisition loop for one device
///
/// The transport calls [`on_notification`](Self::on_notification) from its
/// delivery context; decoding and publishing happen synchronously there.
pub struct NotificationLoop<S: NotificationSource, D: FrameDecoder, T: TimeSource> {
    device: DeviceId,
    source: S,
    cycle: CycleAssembler<D>,
    clock: T,
    bus: EventBus,
    subscribed: bool,
}

impl<S: NotificationSource, D: FrameDecoder, T: TimeSource> NotificationLoop<S, D, T> {
    pub fn new(device: DeviceId, source: S, decoder: D, clock: T) -> Self {
        Self {
            bus: EventBus::new(device.clone()),
            device,
            source,
            cycle: CycleAssembler::new(decoder),
            clock,
            subscribed: false,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Override the decoder's frames-per-event count
    pub fn with_frames_per_event(mut self, frames: usize) -> Self {
        self.cycle.frames_per_event = frames.max(1);
        self
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn decoder(&self) -> &D {
        &self.cycle.decoder
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Start notifications on the source
    pub fn subscribe(&mut self) -> Result<(), AcquisitionError> {
        if self.subscribed {
            return Ok(());
        }
        if let Err(error) = self.source.start_notify() {
            log::error!("{}: could not start notifications: {}", self.device, error);
            return Err(AcquisitionError::SourceFailed {
                device: self.device.to_string(),
                error,
            });
        }
        self.cycle.reset();
        self.subscribed = true;
        log::info!("{}: subscribed to {} notifications", self.device, self.cycle.decoder.model());
        Ok(())
    }

    /// Stop notifications; frames arriving afterwards are ignored
    pub fn unsubscribe(&mut self) -> Result<(), AcquisitionError> {
        if !self.subscribed {
            return Ok(());
        }
        self.subscribed = false;
        self.cycle.reset();
        log::info!("{}: unsubscribed", self.device);
        self.source.stop_notify().map_err(|error| AcquisitionError::SourceFailed {
            device: self.device.to_string(),
            error,
        })
    }

    /// Decode, stamp and publish one pushed frame
    pub fn on_notification(&mut self, frame: &[u8]) -> StepOutcome {
        if !self.subscribed {
            log::debug!("{}: notification while unsubscribed ignored", self.device);
            return StepOutcome::Discarded;
        }
        let assembled = self.cycle.push(frame);
        dispatch(&self.device, &self.clock, &mut self.bus, assembled)
    }
}

impl<S: NotificationSource, D: FrameDecoder, T: TimeSource> Drop for NotificationLoop<S, D, T> {
    fn drop(&mut self) {
        if let Err(e) = self.unsubscribe() {
            log::warn!("{}: {}", self.device, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Frame, PceAqd20Decoder, PlantowerDecoder, XiaomiMiDecoder};
    use crate::errors::HandlerError;
    use crate::events::fields;
    use crate::source::MemorySource;
    use crate::time::SteppingTime;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    type Events = Arc<Mutex<Vec<Event>>>;

    fn collect(bus: &mut EventBus) -> Events {
        let events: Events = Arc::default();
        let sink = Arc::clone(&events);
        bus.subscribe(move |event: Event| -> Result<(), HandlerError> {
            sink.lock().unwrap().push(event);
            Ok(())
        });
        events
    }

    fn pce_line(kind: u8, magnitude: &str) -> Frame {
        let unit: &[u8] = match kind {
            b'1' => b"H0",
            b'2' => b"04",
            b'3' => b"01",
            b'4' => b"G4",
            _ => b"91",
        };
        let mut line = vec![0x02, b'4', kind];
        line.extend_from_slice(unit);
        line.extend_from_slice(b"01");
        line.extend_from_slice(magnitude.as_bytes());
        line.push(b'\r');
        line
    }

    fn pce_dataset() -> Vec<Frame> {
        vec![
            pce_line(b'1', "00000125"),
            pce_line(b'2', "00000402"),
            pce_line(b'3', "00000215"),
            pce_line(b'4', "00004120"),
            pce_line(b'5', "00010132"),
        ]
    }

    #[test]
    fn good_malformed_good_keeps_streaming() {
        let source = MemorySource::new()
            .frame(&[0x66, 0x08, 45])
            .frame(&[0x01, 0x02])
            .frame(&[0x70, 0x08, 46]);
        let mut acq = AcquisitionLoop::new(DeviceId::from("mi"), source, XiaomiMiDecoder::new(), SteppingTime::new(1000, 10));
        let events = collect(acq.bus_mut());

        acq.connect().unwrap();
        assert_eq!(acq.step().unwrap(), StepOutcome::Published);
        assert_eq!(acq.step().unwrap(), StepOutcome::Rejected);
        assert_eq!(acq.state(), LoopState::Streaming);
        assert_eq!(acq.step().unwrap(), StepOutcome::Published);
        assert_eq!(acq.state(), LoopState::Streaming);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].value(fields::TEMPERATURE), Some(21.5));
        assert_eq!(events[1].timestamp, 1010);
    }

    #[test]
    fn syncs_on_first_dataset_line() {
        let mut frames = vec![pce_line(b'4', "00004120"), pce_line(b'5', "00010132")];
        frames.extend(pce_dataset());
        let mut acq = AcquisitionLoop::new(
            DeviceId::from("/dev/ttyUSB0"),
            MemorySource::from_frames(frames),
            PceAqd20Decoder::new(),
            SteppingTime::new(0, 1),
        );
        let events = collect(acq.bus_mut());

        acq.connect().unwrap();
        assert_eq!(acq.step().unwrap(), StepOutcome::Discarded);
        assert_eq!(acq.step().unwrap(), StepOutcome::Discarded);
        assert_eq!(acq.state(), LoopState::Syncing);

        for _ in 0..4 {
            assert_eq!(acq.step().unwrap(), StepOutcome::Pending);
        }
        assert_eq!(acq.state(), LoopState::Streaming);
        assert_eq!(acq.step().unwrap(), StepOutcome::Published);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.fields.len(), 6);
        assert_eq!(event.value(fields::PM25), Some(12.5));
        assert_eq!(event.value(fields::TEMPERATURE), Some(21.5));
        assert_eq!(event.value(fields::PRESSURE), Some(1013.2));
    }

    #[test]
    fn malformed_line_drops_partial_dataset() {
        let mut frames = pce_dataset();
        frames[2][1] = b'9';
        frames.extend(pce_dataset());
        let mut acq = AcquisitionLoop::new(
            DeviceId::from("/dev/ttyUSB0"),
            MemorySource::from_frames(frames),
            PceAqd20Decoder::new(),
            SteppingTime::new(0, 1),
        );
        let events = collect(acq.bus_mut());

        acq.connect().unwrap();
        let outcomes: Vec<_> = (0..10).map(|_| acq.step().unwrap()).collect();

        assert_eq!(outcomes[2], StepOutcome::Rejected);
        assert_eq!(outcomes[3], StepOutcome::Discarded);
        assert_eq!(outcomes[4], StepOutcome::Discarded);
        assert_eq!(outcomes[9], StepOutcome::Published);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn dataset_start_mid_cycle_is_merged() {
        let mut frames = pce_dataset();
        frames.remove(3);
        frames.extend(pce_dataset());
        let mut acq = AcquisitionLoop::new(
            DeviceId::from("/dev/ttyUSB0"),
            MemorySource::from_frames(frames),
            PceAqd20Decoder::new(),
            SteppingTime::new(0, 1),
        );
        let events = collect(acq.bus_mut());

        acq.connect().unwrap();
        let outcomes: Vec<_> = (0..9).map(|_| acq.step().unwrap()).collect();

        assert_eq!(outcomes[4], StepOutcome::Published);
        assert!(outcomes[5..].iter().all(|o| *o == StepOutcome::Discarded));
        assert_eq!(acq.cycle.merged, 1);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn source_failure_disconnects() {
        let source = MemorySource::new()
            .frame(&[0x66, 0x08, 45])
            .fail(SourceError::Io("unplugged".into()));
        let mut acq = AcquisitionLoop::new(DeviceId::from("mi"), source, XiaomiMiDecoder::new(), SteppingTime::new(0, 1));

        acq.connect().unwrap();
        acq.step().unwrap();
        let err = acq.step().unwrap_err();

        assert!(matches!(err, AcquisitionError::SourceFailed { error: SourceError::Io(_), .. }));
        assert_eq!(acq.state(), LoopState::Disconnected);
        assert!(!acq.source().is_open());
        assert!(matches!(acq.step(), Err(AcquisitionError::NotConnected { .. })));
    }

    #[test]
    fn idle_reads_do_not_change_state() {
        let source = MemorySource::new().idle().frame(b"").frame(&[0x66, 0x08, 45]);
        let mut acq = AcquisitionLoop::new(DeviceId::from("mi"), source, XiaomiMiDecoder::new(), SteppingTime::new(0, 1));

        acq.connect().unwrap();
        assert_eq!(acq.step().unwrap(), StepOutcome::Idle);
        assert_eq!(acq.step().unwrap(), StepOutcome::Idle);
        assert_eq!(acq.state(), LoopState::Syncing);
        assert_eq!(acq.step().unwrap(), StepOutcome::Published);
    }

    #[test]
    fn run_until_sends_commands_and_closes() {
        let frame = br#"{cpm2.5:1,cpm1.0:2,cpm10:3,apm2.5:4,apm1.0:5,apm10:6,t:21.5,r:40,aqi:10,f1:0,f2:0,f3:0,f4:0,f5:0,f6:0,f7:0}"#;
        let source = MemorySource::new().frame(b"boot").frame(frame).frame(frame);
        let mut acq = AcquisitionLoop::new(DeviceId::from("/dev/ttyUSB1"), source, PlantowerDecoder::new(), SteppingTime::new(0, 1));

        let mut steps = 0;
        let published = acq
            .run_until(|| {
                steps += 1;
                steps > 3
            })
            .unwrap();

        assert_eq!(published, 2);
        assert_eq!(acq.state(), LoopState::Disconnected);
        assert!(!acq.source().is_open());
        let written = acq.source().written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], br#"{"fun":"05","flag":"1"}"#.to_vec());
        assert_eq!(written[1], br#"{"fun":"05","flag":"0"}"#.to_vec());
    }

    #[test]
    fn run_until_propagates_source_failure() {
        let source = MemorySource::new().fail(SourceError::EndOfStream);
        let mut acq = AcquisitionLoop::new(DeviceId::from("mi"), source, XiaomiMiDecoder::new(), SteppingTime::new(0, 1));

        let err = acq.run_until(|| false).unwrap_err();
        assert!(matches!(err, AcquisitionError::SourceFailed { error: SourceError::EndOfStream, .. }));
        assert!(!acq.source().is_open());
    }

    struct TrackedSource {
        open: Arc<AtomicBool>,
    }

    impl FrameSource for TrackedSource {
        fn open(&mut self) -> Result<(), SourceError> {
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn read_frame(&mut self) -> nb::Result<Frame, SourceError> {
            Err(nb::Error::WouldBlock)
        }

        fn write(&mut self, _bytes: &[u8]) -> Result<(), SourceError> {
            Ok(())
        }

        fn close(&mut self) {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn drop_closes_source() {
        let open = Arc::new(AtomicBool::new(false));
        {
            let source = TrackedSource { open: Arc::clone(&open) };
            let mut acq = AcquisitionLoop::new(DeviceId::from("mi"), source, XiaomiMiDecoder::new(), SteppingTime::new(0, 1));
            acq.connect().unwrap();
            assert!(open.load(Ordering::SeqCst));
        }
        assert!(!open.load(Ordering::SeqCst));
    }

    #[test]
    fn notifications_only_while_subscribed() {
        let mut mi = NotificationLoop::new(DeviceId::from("A4:C1:38:00:00:01"), MemorySource::new(), XiaomiMiDecoder::new(), SteppingTime::new(0, 1));
        let events = collect(mi.bus_mut());

        assert_eq!(mi.on_notification(&[0x66, 0x08, 45]), StepOutcome::Discarded);

        mi.subscribe().unwrap();
        assert!(mi.source().is_notifying());
        assert_eq!(mi.on_notification(&[0x66, 0x08, 45]), StepOutcome::Published);
        assert_eq!(mi.on_notification(&[0x66]), StepOutcome::Rejected);

        mi.unsubscribe().unwrap();
        assert!(!mi.source().is_notifying());
        assert_eq!(mi.on_notification(&[0x66, 0x08, 45]), StepOutcome::Discarded);

        assert_eq!(events.lock().unwrap().len(), 1);
    }
}
