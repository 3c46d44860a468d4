//! Streaming/capture engine (spec §3 "DataBus", §4.7).
//!
//! Grounded on
//! `examples/original_source/faraabin/faraabin_fobject_databus.c/.h`: the
//! five-state machine, per-state tick dividers, and the overwrite-oldest
//! capture ring are preserved; channel/capture storage is a const-generic
//! array instead of the source's optionally-static pointer pair
//! (`_pBufferChannels`/`_pBufferCapture`), since this crate never
//! allocates.

pub mod channel;
pub mod trigger;

use crate::chrono::Chrono;
use crate::error::DataBusError;
use crate::fobject::{FobjectHeader, FobjectId, FobjectKind};
use crate::port::Port;
use crate::sync::{CriticalSection, NoopCriticalSection};
use crate::vartype::PrimitiveId;

pub use channel::{CaptureSample, Channel, ChannelKind};
pub use trigger::{TrigSource, TrigType, TriggerConfig};

/// DataBus run state (spec §4.7 state diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBusState {
    /// Idle; no sampling.
    Off,
    /// Periodically emitting live channel values.
    Stream,
    /// Periodically capturing into the ring for a fixed time window.
    Timer,
    /// Sampling the trigger channel, waiting for the configured edge.
    TrigWait,
    /// Trigger fired; capturing for `TimeAfterTrigMs` more.
    TrigWindow,
    /// Replaying the capture ring to the host.
    CaptureSend,
}

/// What happened during a [`DataBus::run`] tick, for the caller to turn
/// into an outbound frame. Kept separate from the serializer so the state
/// machine has no wire-format dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBusEvent {
    /// Time to emit a stream-value frame; caller reads current channel
    /// values via [`DataBus::channels`].
    StreamTick,
    /// A state transition the host must be told about.
    StateChange {
        /// The state just entered.
        new_state: DataBusState,
        /// What armed/fired the trigger, if relevant.
        trig_source: TrigSource,
        /// Tick timestamp of the trigger, if relevant.
        trig_timestamp: u32,
    },
    /// A capture window (Timer or TrigWindow) ended naturally.
    CaptureEnd,
}

/// Outcome of one [`DataBus::send_capture_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSendStep {
    /// `count` samples were written via the caller's callback; more
    /// remain.
    Progress {
        /// Samples emitted this call.
        count: usize,
    },
    /// The ring was exhausted; the DataBus returned to `Off`.
    Done,
}

/// Fixed-capacity, overwrite-oldest ring of [`CaptureSample`] (spec §3
/// invariant "item_count <= BufferCaptureSize"; §8 invariant 5 "retains
/// the newest N in original order").
struct CaptureRing<const CAP: usize> {
    buf: [CaptureSample; CAP],
    head: usize,
    tail: usize,
    count: usize,
}

impl<const CAP: usize> CaptureRing<CAP> {
    const fn new() -> Self {
        Self {
            buf: [CaptureSample::zeroed(); CAP],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    fn push(&mut self, sample: CaptureSample) {
        self.buf[self.head] = sample;
        let was_full = self.count == CAP;
        self.head = (self.head + 1) % CAP;
        if was_full {
            self.tail = (self.tail + 1) % CAP;
        } else {
            self.count += 1;
        }
    }

    fn pop_front(&mut self) -> Option<CaptureSample> {
        if self.count == 0 {
            return None;
        }
        let s = self.buf[self.tail];
        self.tail = (self.tail + 1) % CAP;
        self.count -= 1;
        Some(s)
    }

    const fn len(&self) -> usize {
        self.count
    }

    fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

/// A configurable channel set with stream/capture/trigger modes (spec §3
/// "DataBus"). `CHQTY` is `ChannelQty`; `CAP` is `BufferCaptureSize`. `CS`
/// guards capture-ring insertion the way the original wraps it in a
/// disable-IRQ section (spec §5); it defaults to a no-op for
/// single-threaded host/test builds.
pub struct DataBus<const CHQTY: usize, const CAP: usize, CS: CriticalSection = NoopCriticalSection> {
    header: FobjectHeader,
    channels: [Channel; CHQTY],
    attached_count: u16,
    available_count: u16,
    capture: CaptureRing<CAP>,

    state: DataBusState,

    stream_divide_by: u16,
    stream_div_cnt: u16,

    timer_divide_by: u16,
    timer_div_cnt: u16,
    timer_window_ms: u32,
    window_chrono: Chrono,

    trig_divide_by: u16,
    trig_div_cnt: u16,
    time_after_trig_ms: u32,
    trigger: TriggerConfig,

    capture_sending_idx: usize,
    _cs: core::marker::PhantomData<CS>,
}

impl<const CHQTY: usize, const CAP: usize, CS: CriticalSection> DataBus<CHQTY, CAP, CS> {
    /// A created-inert DataBus (spec §3 lifecycle: "created inert").
    pub const fn new() -> Self {
        Self {
            header: FobjectHeader::new(FobjectKind::DataBus),
            channels: [Channel::empty(); CHQTY],
            attached_count: 0,
            available_count: 0,
            capture: CaptureRing::new(),
            state: DataBusState::Off,
            stream_divide_by: 1,
            stream_div_cnt: 0,
            timer_divide_by: 1,
            timer_div_cnt: 0,
            timer_window_ms: 0,
            window_chrono: Chrono::new(),
            trig_divide_by: 1,
            trig_div_cnt: 0,
            time_after_trig_ms: 0,
            trigger: TriggerConfig::new(),
            capture_sending_idx: 0,
            _cs: core::marker::PhantomData,
        }
    }

    /// Marks the fobject initialized; `ChannelQty` is fixed at `CHQTY` by
    /// construction, so init here only flips the flag (spec §3 lifecycle).
    pub fn init(&mut self) {
        self.header.is_init = true;
    }

    pub(crate) fn header_mut(&mut self) -> &mut FobjectHeader {
        &mut self.header
    }

    /// The channel table, for reading current values (e.g. to build a
    /// stream-value payload after [`DataBusEvent::StreamTick`]).
    pub fn channels(&self) -> &[Channel; CHQTY] {
        &self.channels
    }

    /// Current state.
    pub const fn state(&self) -> DataBusState {
        self.state
    }

    /// Number of attached channels.
    pub const fn attached_count(&self) -> u16 {
        self.attached_count
    }

    /// Number of attached *and enabled* channels.
    pub const fn available_count(&self) -> u16 {
        self.available_count
    }

    /// Number of samples currently queued in the capture ring.
    pub const fn capture_len(&self) -> usize {
        self.capture.len()
    }

    // --- attach / detach --------------------------------------------------

    /// Attaches a variable to a specific channel index (spec §4.7
    /// "Attach").
    #[allow(clippy::too_many_arguments)]
    pub fn attach_variable_to_channel(
        &mut self,
        ch: usize,
        item_handle: FobjectId,
        item_fobject_kind: FobjectKind,
        item_param_size: u8,
        primitive_id: PrimitiveId,
    ) -> Result<(), DataBusError> {
        if ch >= CHQTY {
            return Err(DataBusError::ChannelOutOfRange);
        }
        if item_handle.is_null() {
            return Err(DataBusError::ActionWithNullReference);
        }
        if self.channels[ch].is_attached() {
            return Err(DataBusError::Attach);
        }
        self.channels[ch] = Channel {
            kind: Some(ChannelKind::Var),
            item_handle,
            item_fobject_kind,
            item_param_size,
            primitive_id,
            enabled: true,
        };
        self.attached_count += 1;
        self.available_count += 1;
        Ok(())
    }

    /// Attaches a variable to the first free channel slot.
    pub fn attach_variable(
        &mut self,
        item_handle: FobjectId,
        item_fobject_kind: FobjectKind,
        item_param_size: u8,
        primitive_id: PrimitiveId,
    ) -> Result<usize, DataBusError> {
        let ch = self
            .channels
            .iter()
            .position(|c| !c.is_attached())
            .ok_or(DataBusError::Attach)?;
        self.attach_variable_to_channel(
            ch,
            item_handle,
            item_fobject_kind,
            item_param_size,
            primitive_id,
        )?;
        Ok(ch)
    }

    /// Detaches whatever occupies channel `ch` (spec §4.7 "Detach").
    pub fn detach_from_channel(&mut self, ch: usize) -> Result<(), DataBusError> {
        if ch >= CHQTY {
            return Err(DataBusError::ChannelOutOfRange);
        }
        if !self.channels[ch].is_attached() {
            return Err(DataBusError::Detach);
        }
        let was_enabled = self.channels[ch].enabled;
        self.channels[ch] = Channel::empty();
        self.attached_count -= 1;
        if was_enabled {
            self.available_count -= 1;
        }
        Ok(())
    }

    /// Detaches every attached channel.
    pub fn detach_all_channels(&mut self) {
        for ch in 0..CHQTY {
            let _ = self.detach_from_channel(ch);
        }
    }

    // --- mode transitions ---------------------------------------------------

    /// `start_stream` (spec §4.7 diagram): `Off -> Stream`.
    pub fn start_stream(&mut self, divide_by: u16) {
        self.stream_divide_by = divide_by.max(1);
        self.stream_div_cnt = 0;
        self.state = DataBusState::Stream;
    }

    /// `start_timer`: `Off -> Timer`, clearing the capture ring.
    pub fn start_timer<P: Port>(&mut self, port: &P, divide_by: u16, window_ms: u32) {
        self.capture.clear();
        self.timer_divide_by = divide_by.max(1);
        self.timer_div_cnt = 0;
        self.timer_window_ms = window_ms;
        self.window_chrono.start(port);
        self.state = DataBusState::Timer;
    }

    /// Sets the edge condition a later [`DataBus::start_trigger`] arms
    /// (spec §4.7 "Trigger detection"). Takes effect on the next
    /// `start_trigger` call, which re-baselines the edge detector.
    pub fn configure_trigger(&mut self, source_channel: usize, trig_type: TrigType, threshold: [u8; 8]) {
        self.trigger.source_channel = source_channel;
        self.trigger.trig_type = trig_type;
        self.trigger.threshold = threshold;
    }

    /// `start_trigger`: `Off -> TrigWait`, clearing the capture ring and
    /// rearming the trigger detector.
    pub fn start_trigger(&mut self, divide_by: u16, time_after_trig_ms: u32) {
        self.capture.clear();
        self.trig_divide_by = divide_by.max(1);
        self.trig_div_cnt = 0;
        self.time_after_trig_ms = time_after_trig_ms;
        self.trigger.reset([0u8; 8]);
        self.state = DataBusState::TrigWait;
    }

    /// Host/desktop-tool "force trigger" while in `TrigWait`, attributed to
    /// [`TrigSource::Api`] (spec §11 supplement).
    pub fn force_trigger<P: Port>(&mut self, port: &P) {
        self.force_trigger_with_source(port, TrigSource::Api);
    }

    /// Host/desktop-tool "force trigger" attributed to [`TrigSource::Manual`]
    /// (spec §11 supplement: distinct from the API source).
    pub fn force_manual_trigger<P: Port>(&mut self, port: &P) {
        self.force_trigger_with_source(port, TrigSource::Manual);
    }

    fn force_trigger_with_source<P: Port>(&mut self, port: &P, source: TrigSource) {
        if self.state != DataBusState::TrigWait {
            return;
        }
        self.trigger.is_triggered = true;
        self.trigger.source = source;
        self.trigger.trig_timestamp = port.tick();
        self.window_chrono.start(port);
        self.state = DataBusState::TrigWindow;
    }

    /// Begins replaying the capture ring to the host.
    pub fn start_capture_send(&mut self) {
        self.capture_sending_idx = 0;
        self.state = DataBusState::CaptureSend;
    }

    /// `stop`: returns to `Off` from any state.
    pub fn stop(&mut self) {
        self.state = DataBusState::Off;
    }

    // --- per-tick work --------------------------------------------------

    /// One `Run()` tick for the Stream/Timer/TrigWait/TrigWindow states.
    /// `CaptureSend` is handled separately by
    /// [`DataBus::send_capture_chunk`] so it cannot starve the ring (spec
    /// §4.7).
    pub fn run<P: Port>(&mut self, port: &P) -> Option<DataBusEvent> {
        if !self.header.is_enabled || self.available_count == 0 {
            return None;
        }
        match self.state {
            DataBusState::Off | DataBusState::CaptureSend => None,
            DataBusState::Stream => self.run_stream(),
            DataBusState::Timer => self.run_timer(port),
            DataBusState::TrigWait => self.run_trig_wait(port),
            DataBusState::TrigWindow => self.run_trig_window(port),
        }
    }

    fn run_stream(&mut self) -> Option<DataBusEvent> {
        self.stream_div_cnt += 1;
        if self.stream_div_cnt >= self.stream_divide_by {
            self.stream_div_cnt = 0;
            Some(DataBusEvent::StreamTick)
        } else {
            None
        }
    }

    fn run_timer<P: Port>(&mut self, port: &P) -> Option<DataBusEvent> {
        self.timer_div_cnt += 1;
        if self.timer_div_cnt >= self.timer_divide_by {
            self.timer_div_cnt = 0;
            self.sample_all(port);
        }
        if self.window_chrono.is_expired_ms(port, self.timer_window_ms) {
            self.state = DataBusState::Off;
            Some(DataBusEvent::CaptureEnd)
        } else {
            None
        }
    }

    fn run_trig_wait<P: Port>(&mut self, port: &P) -> Option<DataBusEvent> {
        self.trig_div_cnt += 1;
        if self.trig_div_cnt < self.trig_divide_by {
            return None;
        }
        self.trig_div_cnt = 0;
        let Some(sample) = self.sample_trigger_channel(port) else {
            return None;
        };
        CS::without_preemption(|| self.capture.push(sample));
        let primitive = self.channels[self.trigger.source_channel].primitive_id;
        if self.trigger.evaluate(&sample, primitive) {
            self.trigger.is_triggered = true;
            self.trigger.source = TrigSource::Channel;
            self.trigger.trig_timestamp = sample.timestamp;
            self.window_chrono.start(port);
            self.state = DataBusState::TrigWindow;
            Some(DataBusEvent::StateChange {
                new_state: DataBusState::TrigWindow,
                trig_source: self.trigger.source,
                trig_timestamp: self.trigger.trig_timestamp,
            })
        } else {
            None
        }
    }

    fn run_trig_window<P: Port>(&mut self, port: &P) -> Option<DataBusEvent> {
        self.trig_div_cnt += 1;
        if self.trig_div_cnt >= self.trig_divide_by {
            self.trig_div_cnt = 0;
            self.sample_all(port);
        }
        if self.window_chrono.is_expired_ms(port, self.time_after_trig_ms) {
            self.state = DataBusState::Off;
            Some(DataBusEvent::CaptureEnd)
        } else {
            None
        }
    }

    fn sample_all<P: Port>(&mut self, port: &P) {
        let now = port.tick();
        for ch in self.channels.iter() {
            if let Some(sample) = Self::sample_channel(ch, now) {
                CS::without_preemption(|| self.capture.push(sample));
            }
        }
    }

    fn sample_trigger_channel<P: Port>(&mut self, port: &P) -> Option<CaptureSample> {
        let idx = self.trigger.source_channel;
        let ch = self.channels.get(idx)?;
        Self::sample_channel(ch, port.tick())
    }

    fn sample_channel(ch: &Channel, now: u32) -> Option<CaptureSample> {
        if !ch.is_available() {
            return None;
        }
        match ch.kind {
            Some(ChannelKind::Var) | Some(ChannelKind::EntityNumerical) => Some(CaptureSample {
                fobject_kind: ch.item_fobject_kind,
                fobject_handle: ch.item_handle,
                timestamp: now,
                // Real sampling copies `item_param_size` bytes from the
                // variable's live address; that memory access is supplied
                // by the application layer through a future accessor hook.
                // Until wired up, channels sample as zero.
                value: [0u8; 8],
            }),
            _ => None,
        }
    }

    /// Feeds one externally-sampled value (the application's read of the
    /// variable's live memory) into whichever state is currently sampling.
    /// This is how a firmware integrator's accessor loop supplies actual
    /// bytes; [`DataBus::run`] alone cannot read arbitrary addresses in a
    /// `no_std`, no-`unsafe`-pointer-cast crate (spec §9 "opaque handles").
    pub fn feed_channel_value(&mut self, ch: usize, now: u32, bytes: &[u8]) {
        if ch >= CHQTY || !self.channels[ch].is_available() {
            return;
        }
        let mut value = [0u8; 8];
        let n = bytes.len().min(8);
        value[..n].copy_from_slice(&bytes[..n]);
        let sample = CaptureSample {
            fobject_kind: self.channels[ch].item_fobject_kind,
            fobject_handle: self.channels[ch].item_handle,
            timestamp: now,
            value,
        };
        match self.state {
            DataBusState::Timer | DataBusState::TrigWindow => {
                CS::without_preemption(|| self.capture.push(sample));
            }
            DataBusState::TrigWait if ch == self.trigger.source_channel => {
                CS::without_preemption(|| self.capture.push(sample));
                let primitive = self.channels[ch].primitive_id;
                if self.trigger.evaluate(&sample, primitive) {
                    self.trigger.is_triggered = true;
                    self.trigger.source = TrigSource::Channel;
                    self.trigger.trig_timestamp = sample.timestamp;
                    self.window_chrono.start_at(now);
                    self.state = DataBusState::TrigWindow;
                }
            }
            _ => {}
        }
    }

    // --- capture replay --------------------------------------------------

    /// Emits up to `chunk` captured samples via `emit`, in FIFO (oldest
    /// first) order, transitioning to `Off` once the ring is drained (spec
    /// §4.7 "CaptureSend").
    pub fn send_capture_chunk(
        &mut self,
        chunk: usize,
        mut emit: impl FnMut(CaptureSample),
    ) -> CaptureSendStep {
        let mut sent = 0;
        while sent < chunk {
            match self.capture.pop_front() {
                Some(s) => {
                    emit(s);
                    sent += 1;
                }
                None => break,
            }
        }
        self.capture_sending_idx += sent;
        if self.capture.len() == 0 {
            self.state = DataBusState::Off;
            CaptureSendStep::Done
        } else {
            CaptureSendStep::Progress { count: sent }
        }
    }

    /// RAM footprint of this DataBus in bytes (spec §11 supplement).
    pub const fn ram_usage(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

impl<const CHQTY: usize, const CAP: usize, CS: CriticalSection> Default for DataBus<CHQTY, CAP, CS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePort {
        tick: core::cell::Cell<u32>,
    }
    impl Port for FakePort {
        fn fw_name(&self) -> &str {
            "t"
        }
        fn fw_info(&self) -> &str {
            ""
        }
        fn send(&mut self, _b: &[u8]) -> Result<(), ()> {
            Ok(())
        }
        fn is_sending(&self) -> bool {
            false
        }
        fn reset_mcu(&mut self) -> ! {
            panic!()
        }
        fn tick(&self) -> u32 {
            self.tick.get()
        }
        fn tick_to_ns(&self) -> u32 {
            1_000_000
        }
        fn boot_time_ms(&self) -> u32 {
            0
        }
    }

    #[test]
    fn stream_emits_every_divide_by_ticks() {
        let mut db: DataBus<4, 8> = DataBus::new();
        db.init();
        db.attach_variable_to_channel(0, FobjectId(1), FobjectKind::EntityNumerical, 4, PrimitiveId::U32)
            .unwrap();
        db.start_stream(5);
        let port = FakePort { tick: core::cell::Cell::new(0) };
        let mut ticks = 0;
        for _ in 0..25 {
            if db.run(&port).is_some() {
                ticks += 1;
            }
        }
        assert_eq!(ticks, 5);
    }

    #[test]
    fn capture_ring_retains_newest_n_in_order() {
        let mut ring: CaptureRing<3> = CaptureRing::new();
        for v in 0..5u32 {
            ring.push(CaptureSample {
                fobject_kind: FobjectKind::EntityNumerical,
                fobject_handle: FobjectId(1),
                timestamp: v,
                value: [0; 8],
            });
        }
        let mut seen = Vec::new();
        while let Some(s) = ring.pop_front() {
            seen.push(s.timestamp);
        }
        assert_eq!(seen, vec![2, 3, 4]);
    }

    #[test]
    fn feed_channel_value_fires_trigger_and_enters_window() {
        let mut db: DataBus<2, 16> = DataBus::new();
        db.init();
        db.attach_variable_to_channel(0, FobjectId(1), FobjectKind::EntityNumerical, 4, PrimitiveId::I32)
            .unwrap();
        db.trigger.trig_type = TrigType::Rising;
        db.trigger.threshold[..4].copy_from_slice(&10i32.to_le_bytes());
        db.start_trigger(1, 10);

        // below threshold: captured into the ring, but the trigger must not
        // fire yet.
        db.feed_channel_value(0, 0, &0i32.to_le_bytes());
        assert_eq!(db.state(), DataBusState::TrigWait);
        assert_eq!(db.capture_len(), 1);

        // crossing the threshold fires the trigger and transitions to
        // TrigWindow, with the window chrono started at the sample's tick.
        db.feed_channel_value(0, 7, &12i32.to_le_bytes());
        assert_eq!(db.state(), DataBusState::TrigWindow);
        assert_eq!(db.capture_len(), 2);
        assert!(db.trigger.is_triggered);
        assert_eq!(db.trigger.source, TrigSource::Channel);
        assert_eq!(db.trigger.trig_timestamp, 7);

        let port = FakePort { tick: core::cell::Cell::new(7) };
        assert!(!db.window_chrono.is_expired_ms(&port, 10));
        port.tick.set(7 + 10);
        assert!(db.window_chrono.is_expired_ms(&port, 10));
    }

    #[test]
    fn capture_send_drains_then_returns_off() {
        let mut db: DataBus<2, 4> = DataBus::new();
        db.init();
        for v in 0..4u32 {
            db.capture.push(CaptureSample {
                fobject_kind: FobjectKind::EntityNumerical,
                fobject_handle: FobjectId(1),
                timestamp: v,
                value: [0; 8],
            });
        }
        db.start_capture_send();
        let mut collected = Vec::new();
        let step = db.send_capture_chunk(2, |s| collected.push(s.timestamp));
        assert_eq!(step, CaptureSendStep::Progress { count: 2 });
        let step = db.send_capture_chunk(2, |s| collected.push(s.timestamp));
        assert_eq!(step, CaptureSendStep::Done);
        assert_eq!(collected, vec![0, 1, 2, 3]);
        assert_eq!(db.state(), DataBusState::Off);
    }
}
