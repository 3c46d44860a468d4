//! The glue layer: initialization order and the per-tick `Run()` that fans
//! out to every component (spec §2 "Glue (Init/Run/Port)", §3 "Global
//! lifecycle").
//!
//! Grounded on
//! `examples/original_source/faraabin/faraabin.c`'s `fFaraabin_Init`/
//! `fFaraabin_Run`: init order (link buffer, link handler, registry, MCU,
//! function engine, boot event) and the per-`Run()` fan-out (live timeout
//! check, one deferred low-priority dispatch, component `Run()`s, flush)
//! are preserved; each bounded resource keeps its own const-generic size
//! instead of the source's build-time `#define`s.

use crate::databus::DataBus;
use crate::dict::{DictCursor, DictPass, DictSendingMode};
use crate::event::EventSerializer;
use crate::fobject::{FobjectHeader, FobjectKind};
use crate::function_engine::{FunctionEngine, FunctionEventId};
use crate::link_handler::{LinkHandler, OnByteOutcome, PendingFrame};
use crate::mcu::{Mcu, McuEventId};
use crate::port::Port;
use crate::registry::Registry;
use crate::ring_buffer::RingBuffer;
use crate::status::{FeatureFlags, StatusFlags};
use crate::sync::{CriticalSection, NoopCriticalSection};
use crate::vartype::{Member, MemberEnumerator};
use crate::wire::control::{FrameType, PropertyByte, PropertyGroup};
use crate::MCU_HANDLE;

/// Monitoring/Command-group property ids this runtime recognizes for the
/// MCU singleton. Exact numbering is this crate's own choice (spec §6.2
/// pins the group/id bit widths, not specific id values per command).
mod mcu_prop {
    pub const PING: u8 = 0;
    pub const SEND_LIVE: u8 = 1;
    pub const SEND_WHOAMI: u8 = 2;
    pub const SEND_ALL_DICT: u8 = 0;
    pub const RESET_CPU: u8 = 1;
    pub const CLEAR_BUFFER_OVF: u8 = 2;
}

/// Command-group property ids for a `Function` fobject (spec §4.9 Dispatch
/// table, "Function | Command (Run/Stop/Pause/Resume)").
mod function_prop {
    pub const RUN: u8 = 0;
    pub const STOP: u8 = 1;
    pub const PAUSE: u8 = 2;
    pub const RESUME: u8 = 3;
}

/// Command-group property ids for the default-owned `DataBus` fobject
/// (spec §4.9 Dispatch table, "DataBus | Setting, Monitoring, Command,
/// Event"). Monitoring/Setting are not yet assigned ids; unlisted ids fall
/// through to [`Faraabin::reject_unsupported_property`].
mod databus_prop {
    pub const START_STREAM: u8 = 0;
    pub const START_TIMER: u8 = 1;
    pub const START_TRIGGER: u8 = 2;
    pub const STOP: u8 = 3;
    pub const FORCE_TRIGGER: u8 = 4;
}

const PROTOCOL_MAJOR: u8 = 1;
const PROTOCOL_MINOR: u8 = 0;

/// Reserved handle for the single `DataBus` this runtime owns directly when
/// [`FeatureFlags::DEFAULT_DATABUS`] is set (spec §4.9 Dispatch table).
/// Application fobjects should avoid registering this handle themselves
/// while that feature is enabled.
pub const DEFAULT_DATABUS_HANDLE: u32 = 1;

/// Top-level runtime: owns every bounded resource and orchestrates RX
/// dispatch, dictionary enumeration, and TX flush. Additional `DataBus`
/// instances beyond the one owned default bus are the firmware
/// integrator's own (their channel/capture sizes vary per bus) and are
/// driven through their own `run`/`feed_channel_value` API alongside this
/// struct's `run()`; only the owned default bus is reachable through wire
/// dispatch.
pub struct Faraabin<
    P: Port,
    const MAX_FOBJECTS: usize,
    const TXLEN: usize,
    const RXLEN: usize,
    const PAYLOAD: usize,
    const REENTRANCE: usize,
    const SCRATCH: usize,
    const FUNC_SLOTS: usize,
    const DB_CHQTY: usize,
    const DB_CAP: usize,
    CS: CriticalSection = NoopCriticalSection,
> {
    port: P,
    registry: Registry<MAX_FOBJECTS>,
    ring: RingBuffer<TXLEN>,
    link: LinkHandler<RXLEN, PAYLOAD>,
    serializer: EventSerializer<REENTRANCE, SCRATCH, CS>,
    mcu: Mcu,
    functions: FunctionEngine<FUNC_SLOTS>,
    function_header: FobjectHeader,
    databus: DataBus<DB_CHQTY, DB_CAP, CS>,
    dict_mode: DictSendingMode,
    status: StatusFlags,
    features: FeatureFlags,
    password: Option<&'static [u8]>,
}

impl<
        P: Port,
        const MAX_FOBJECTS: usize,
        const TXLEN: usize,
        const RXLEN: usize,
        const PAYLOAD: usize,
        const REENTRANCE: usize,
        const SCRATCH: usize,
        const FUNC_SLOTS: usize,
        const DB_CHQTY: usize,
        const DB_CAP: usize,
        CS: CriticalSection,
    > Faraabin<P, MAX_FOBJECTS, TXLEN, RXLEN, PAYLOAD, REENTRANCE, SCRATCH, FUNC_SLOTS, DB_CHQTY, DB_CAP, CS>
{
    /// Builds an uninitialized runtime. Call [`Faraabin::init`] before use
    /// (spec §3 global lifecycle step 1→2).
    pub fn new(port: P, features: FeatureFlags) -> Self {
        Self {
            port,
            registry: Registry::new(),
            ring: RingBuffer::new(),
            link: LinkHandler::new(),
            serializer: EventSerializer::new(),
            mcu: Mcu::new(),
            functions: FunctionEngine::new(),
            function_header: FobjectHeader::new(FobjectKind::Function),
            databus: DataBus::new(),
            dict_mode: DictSendingMode::new(),
            status: StatusFlags::default(),
            features,
            password: None,
        }
    }

    /// Arms the link handler, constructs the MCU singleton, registers the
    /// default DataBus when enabled, and enqueues the boot event (spec §3
    /// global lifecycle step 2).
    pub fn init(&mut self) {
        self.mcu.init(&self.port);
        if self.features.contains(FeatureFlags::DEFAULT_DATABUS) {
            if self
                .registry
                .add_dict(crate::FobjectId(DEFAULT_DATABUS_HANDLE), FobjectKind::DataBus)
                .is_ok()
            {
                self.databus.init();
            }
        }
        log::info!("faraabin runtime: init complete");
        self.serializer.send_puts(
            &mut self.ring,
            self.mcu.header_mut(),
            MCU_HANDLE,
            PropertyByte::from_parts(PropertyGroup::Event, McuEventId::Boot as u8),
            self.port.tick(),
            0,
            "boot",
        );
    }

    /// Configures the password `SendAllDict` checks against when
    /// [`FeatureFlags::PASSWORD`] is set (spec §4.9 MCU commands).
    pub fn set_password(&mut self, password: &'static [u8]) {
        self.password = Some(password);
    }

    /// Registers an application fobject handle with its kind, latching the
    /// "new dict" status bit on success (spec §4.3 `add_dict`).
    pub fn register_fobject(
        &mut self,
        handle: crate::FobjectId,
        kind: FobjectKind,
    ) -> Result<(), crate::error::RegistryError> {
        self.registry.set_enum_in_progress(self.dict_mode.is_sending());
        let result = self.registry.add_dict(handle, kind);
        match &result {
            Ok(()) => self.status.insert(StatusFlags::NEW_DICT),
            Err(crate::error::RegistryError::Null) => self.status.insert(StatusFlags::NULL_DICT),
            Err(crate::error::RegistryError::UnexpectedDuringEnum) => {
                self.status.insert(StatusFlags::UNEXPECTED_DICT)
            }
            _ => {}
        }
        result
    }

    /// Attaches a child enumerator (struct/enum members, function-group
    /// members, state-machine states) to an already-registered handle, for
    /// dictionary sub-entry emission (spec §4.4, §4.9 "StateMachine.Sub").
    pub fn register_children(&mut self, handle: crate::FobjectId, enumerator: &'static dyn MemberEnumerator) {
        self.registry.set_children(handle, enumerator);
    }

    /// Feeds one received byte (spec §4.9 RX path). Dispatches
    /// synchronously if the decoded frame demands high-priority handling;
    /// otherwise the frame waits in the link handler for the next
    /// [`Faraabin::run`].
    pub fn on_byte(&mut self, byte: u8) {
        match self.link.on_byte(&mut self.mcu, byte) {
            OnByteOutcome::HighPriority => {
                if let Some(frame) = self.link.take_pending() {
                    self.dispatch(frame);
                }
            }
            OnByteOutcome::Queued | OnByteOutcome::Nothing => {}
        }
    }

    /// One cooperative scheduling tick (spec §4.9, §3 global lifecycle):
    /// checks the host live timeout, dispatches at most one deferred
    /// low-priority frame, paces any in-flight non-blocking dictionary
    /// enumeration, and flushes the TX ring.
    pub fn run(&mut self) {
        self.mcu.check_live_timeout(&self.port);
        if let Some(frame) = self.link.take_pending() {
            self.dispatch(frame);
        }
        if self.dict_mode.is_sending() && !self.dict_mode.is_blocking() {
            self.step_dict_send();
        }
        let _ = self.flush(false);
    }

    /// Drains the TX ring into the port (spec §4.9 TX path).
    pub fn flush(&mut self, blocking: bool) -> Result<(), crate::error::TxError> {
        self.link.flush(&mut self.port, &mut self.ring, blocking, &mut self.mcu)
    }

    /// Borrows the function engine for the application to drive handler
    /// dispatch (spec §4.8).
    pub fn functions_mut(&mut self) -> &mut FunctionEngine<FUNC_SLOTS> {
        &mut self.functions
    }

    /// Borrows the owned default DataBus (enabled via
    /// [`FeatureFlags::DEFAULT_DATABUS`]) for the application to feed
    /// sampled channel values into (spec §4.7, §4.9).
    pub fn databus_mut(&mut self) -> &mut DataBus<DB_CHQTY, DB_CAP, CS> {
        &mut self.databus
    }

    /// Borrows the event serializer plus TX ring, for emitting
    /// application-defined events against a registered fobject.
    pub fn serializer_and_ring(&mut self) -> (&mut EventSerializer<REENTRANCE, SCRATCH, CS>, &mut RingBuffer<TXLEN>) {
        (&mut self.serializer, &mut self.ring)
    }

    /// Read-only access to the port, e.g. for a caller wiring an
    /// integrator-owned `DataBus::run` alongside this runtime.
    pub fn port(&self) -> &P {
        &self.port
    }

    // --- dispatch --------------------------------------------------------

    fn dispatch(&mut self, frame: PendingFrame<PAYLOAD>) {
        let Some(group) = frame.fobject_prop.group() else {
            self.reject_unsupported_property(frame);
            return;
        };
        if frame.fobject_handle == MCU_HANDLE {
            self.dispatch_mcu(frame, group);
            return;
        }
        match self.registry.kind_of(crate::FobjectId(frame.fobject_handle)) {
            Some(FobjectKind::Function) => self.dispatch_function(frame, group),
            Some(FobjectKind::DataBus) if frame.fobject_handle == DEFAULT_DATABUS_HANDLE => {
                self.dispatch_databus(frame, group)
            }
            Some(_) => {
                log::trace!(
                    "faraabin runtime: dispatch to application fobject {:?} has no kind-specific handler",
                    frame.fobject_handle
                );
            }
            None => self.reject_unsupported_property(frame),
        }
    }

    fn reject_unsupported_property(&mut self, frame: PendingFrame<PAYLOAD>) {
        self.mcu.note_rx_error(McuEventId::UnsupportedFobjectProperty);
        self.serializer.send_event(
            &mut self.ring,
            FrameType::Event,
            frame.control.req_seq(),
            self.mcu.header_mut(),
            MCU_HANDLE,
            PropertyByte::from_parts(PropertyGroup::Event, McuEventId::UnsupportedFobjectProperty as u8),
            self.port.tick(),
            0,
            McuEventId::UnsupportedFobjectProperty as u16,
            frame.fobject_prop.raw as u32,
            |_| {},
        );
    }

    fn dispatch_mcu(&mut self, frame: PendingFrame<PAYLOAD>, group: PropertyGroup) {
        match (group, frame.fobject_prop.id()) {
            (PropertyGroup::Monitoring, id) if id == mcu_prop::PING => self.handle_ping(&frame),
            (PropertyGroup::Monitoring, id) if id == mcu_prop::SEND_LIVE => self.handle_send_live(&frame),
            (PropertyGroup::Monitoring, id) if id == mcu_prop::SEND_WHOAMI => self.handle_whoami(&frame),
            (PropertyGroup::Command, id) if id == mcu_prop::SEND_ALL_DICT => self.handle_send_all_dict(&frame),
            (PropertyGroup::Command, id) if id == mcu_prop::RESET_CPU => self.handle_reset_cpu(),
            (PropertyGroup::Command, id) if id == mcu_prop::CLEAR_BUFFER_OVF => {
                self.ring.clear_overflow();
                self.status.remove(StatusFlags::BUFFER_OVERFLOW);
            }
            _ => self.reject_unsupported_property(frame),
        }
    }

    /// Run/Stop/Pause/Resume against the function engine, keyed by the
    /// function's own handle with the bound object carried as payload
    /// (spec §4.9 Dispatch table, "Function | Command").
    fn dispatch_function(&mut self, frame: PendingFrame<PAYLOAD>, group: PropertyGroup) {
        if group != PropertyGroup::Command {
            self.reject_unsupported_property(frame);
            return;
        }
        let payload = frame.payload();
        if payload.len() < 4 {
            self.reject_unsupported_property(frame);
            return;
        }
        let object = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let function = crate::FobjectId(frame.fobject_handle);
        let object_id = crate::FobjectId(object);
        let req_seq = frame.control.req_seq();
        let id = frame.fobject_prop.id();
        match id {
            function_prop::RUN => {
                let args = &payload[4..];
                match self.functions.start(function, object_id, args) {
                    Ok(()) => self.emit_function_event(req_seq, function.0, object, FunctionEventId::Run),
                    Err(_) => self.emit_function_event(req_seq, function.0, object, FunctionEventId::ParamError),
                }
            }
            function_prop::STOP => {
                if self.functions.stop(function, object_id).is_ok() {
                    self.emit_function_event(req_seq, function.0, object, FunctionEventId::Stop);
                }
            }
            function_prop::PAUSE => {
                if self.functions.pause(function, object_id).is_ok() {
                    self.emit_function_event(req_seq, function.0, object, FunctionEventId::Pause);
                }
            }
            function_prop::RESUME => {
                if self.functions.resume(function, object_id).is_ok() {
                    self.emit_function_event(req_seq, function.0, object, FunctionEventId::Resume);
                }
            }
            _ => self.reject_unsupported_property(frame),
        }
    }

    /// Emits a function-lifecycle event against the function's handle, with
    /// the bound object as the outbound extended handle (scenario: "Run(F,
    /// O)" response carries `O` as the extended handle).
    fn emit_function_event(&mut self, req_seq: u8, function: u32, object: u32, event_id: FunctionEventId) {
        let tick = self.port.tick();
        self.serializer.emit_frame(
            &mut self.ring,
            FrameType::Event,
            true,
            req_seq,
            &mut self.function_header,
            function,
            Some(object),
            PropertyByte::from_parts(PropertyGroup::Event, 0),
            tick,
            |w| {
                w.write_u8(0); // severity
                w.write_u16(event_id as u16);
                w.write_u32(0); // user_param
            },
        );
    }

    /// Command-group mode transitions against the owned default DataBus
    /// (spec §4.9 Dispatch table, "DataBus | Command").
    fn dispatch_databus(&mut self, frame: PendingFrame<PAYLOAD>, group: PropertyGroup) {
        if group != PropertyGroup::Command {
            self.reject_unsupported_property(frame);
            return;
        }
        let payload = frame.payload();
        let req_seq = frame.control.req_seq();
        let id = frame.fobject_prop.id();
        let u16_at = |i: usize| u16::from_le_bytes([*payload.get(i).unwrap_or(&0), *payload.get(i + 1).unwrap_or(&0)]);
        let u32_at = |i: usize| {
            u32::from_le_bytes([
                *payload.get(i).unwrap_or(&0),
                *payload.get(i + 1).unwrap_or(&0),
                *payload.get(i + 2).unwrap_or(&0),
                *payload.get(i + 3).unwrap_or(&0),
            ])
        };
        match id {
            databus_prop::START_STREAM => self.databus.start_stream(u16_at(0)),
            databus_prop::START_TIMER => {
                let divide_by = u16_at(0);
                let window_ms = u32_at(2);
                self.databus.start_timer(&self.port, divide_by, window_ms);
            }
            databus_prop::START_TRIGGER => {
                let divide_by = u16_at(0);
                let time_after_trig_ms = u32_at(2);
                self.databus.start_trigger(divide_by, time_after_trig_ms);
            }
            databus_prop::STOP => self.databus.stop(),
            databus_prop::FORCE_TRIGGER => self.databus.force_trigger(&self.port),
            _ => {
                self.reject_unsupported_property(frame);
                return;
            }
        }
        let tick = self.port.tick();
        self.serializer.emit_frame(
            &mut self.ring,
            FrameType::Response,
            true,
            req_seq,
            self.databus.header_mut(),
            DEFAULT_DATABUS_HANDLE,
            None,
            PropertyByte::from_parts(PropertyGroup::Command, id),
            tick,
            |_| {},
        );
    }

    fn handle_ping(&mut self, frame: &PendingFrame<PAYLOAD>) {
        let payload = frame.payload();
        let mut buf = [0u8; PAYLOAD];
        buf[..payload.len()].copy_from_slice(payload);
        let n = payload.len();
        self.serializer.emit_frame(
            &mut self.ring,
            FrameType::Response,
            true,
            frame.control.req_seq(),
            self.mcu.header_mut(),
            MCU_HANDLE,
            None,
            PropertyByte::from_parts(PropertyGroup::Monitoring, mcu_prop::PING),
            self.port.tick(),
            |w| w.write_bytes(&buf[..n]),
        );
    }

    fn handle_send_live(&mut self, frame: &PendingFrame<PAYLOAD>) {
        let session_id = u16::from_le_bytes([
            *frame.payload().first().unwrap_or(&0),
            *frame.payload().get(1).unwrap_or(&0),
        ]);
        self.mcu.note_live(&self.port, session_id);
        if self.status.contains(StatusFlags::MCU_RESET) {
            self.status.remove(StatusFlags::MCU_RESET);
        }
        let status = self.status;
        let session = self.mcu.session_id();
        self.serializer.emit_frame(
            &mut self.ring,
            FrameType::Response,
            true,
            frame.control.req_seq(),
            self.mcu.header_mut(),
            MCU_HANDLE,
            None,
            PropertyByte::from_parts(PropertyGroup::Monitoring, mcu_prop::SEND_LIVE),
            self.port.tick(),
            |w| {
                w.write_u32(status.bits());
                w.write_u16(session);
            },
        );
    }

    fn handle_whoami(&mut self, frame: &PendingFrame<PAYLOAD>) {
        let fw_name = self.port.fw_name();
        let fw_info = self.port.fw_info();
        let is_le = self.port.is_little_endian();
        let feature_bits = self.features.bits();
        let total_fobjects = self.registry.count() as u32;
        let rx_buffer_size = RXLEN as u32;
        let tick_to_ns = self.port.tick_to_ns();
        let tick_top = self.port.tick_top();
        let boot_ms = self.mcu.boot_time_ms();
        let tick = self.port.tick();
        self.serializer.emit_frame(
            &mut self.ring,
            FrameType::Response,
            true,
            frame.control.req_seq(),
            self.mcu.header_mut(),
            MCU_HANDLE,
            None,
            PropertyByte::from_parts(PropertyGroup::Monitoring, mcu_prop::SEND_WHOAMI),
            tick,
            |w| {
                w.write_u8(is_le as u8);
                w.write_u8(PROTOCOL_MAJOR);
                w.write_u8(PROTOCOL_MINOR);
                w.write_u32(feature_bits);
                w.write_u32(total_fobjects);
                w.write_u32(total_fobjects + 1); // +1 for the MCU's own dict frame
                w.write_u32(rx_buffer_size);
                w.write_u32(tick_to_ns);
                w.write_u32(tick_top);
                w.write_u32(boot_ms);
                w.write_str_with_len(fw_name);
                w.write_str_with_len(fw_info);
            },
        );
    }

    fn handle_reset_cpu(&mut self) {
        self.port.reset_mcu();
    }

    /// `blocking:u8, session_id:u16, password:rest` (spec §4.9 MCU commands
    /// "SendAllDict"). When [`FeatureFlags::PASSWORD`] is set, a mismatched
    /// password emits [`McuEventId::Password`] and the enumeration never
    /// starts.
    fn handle_send_all_dict(&mut self, frame: &PendingFrame<PAYLOAD>) {
        let payload = frame.payload();
        let blocking = payload.first().copied().unwrap_or(0) != 0;
        if self.features.contains(FeatureFlags::PASSWORD) {
            let supplied = payload.get(3..).unwrap_or(&[]);
            let configured = self.password.unwrap_or(&[]);
            if supplied != configured {
                self.mcu.note_rx_error(McuEventId::Password);
                let req_seq = frame.control.req_seq();
                let tick = self.port.tick();
                self.serializer.send_event(
                    &mut self.ring,
                    FrameType::Event,
                    req_seq,
                    self.mcu.header_mut(),
                    MCU_HANDLE,
                    PropertyByte::from_parts(PropertyGroup::Event, McuEventId::Password as u8),
                    tick,
                    0,
                    McuEventId::Password as u16,
                    0,
                    |_| {},
                );
                return;
            }
        }
        self.ring.clear();
        self.dict_mode.start(frame.control.req_seq(), blocking);
        self.registry.set_enum_in_progress(true);
        if blocking {
            while self.dict_mode.is_sending() {
                self.step_dict_send();
                let _ = self.flush(true);
            }
        }
    }

    /// Emits one registry entry's dict frame plus, when the entry carries a
    /// child enumerator (struct/enum members, function-group members,
    /// state-machine states), one sub-dict frame per child using the same
    /// two-pass counting/sending cursor `vartype` members use (spec §4.6,
    /// §4.4). Children of one top-level handle are emitted inline in the
    /// same step rather than paced across further `Run()` calls.
    fn step_dict_send(&mut self) {
        let idx = self.dict_mode.next_index();
        let Some(handle) = self.registry.at(idx) else {
            self.finish_dict_send();
            return;
        };
        let kind = self.registry.kind_at(idx).unwrap_or(FobjectKind::Container);
        let enumerator = self.registry.children_at(idx);
        let req_seq = self.dict_mode.req_seq();
        let tick = self.port.tick();

        let total_sub = match enumerator {
            Some(e) => {
                let mut counter = DictCursor::new();
                e.for_each_member(&mut |_| counter.emit_one(DictPass::Counting, |_, _| {}));
                counter.total_sub()
            }
            None => 0,
        };

        self.serializer.send_dict(
            &mut self.ring,
            false,
            req_seq,
            self.mcu.header_mut(),
            handle.0,
            PropertyByte::from_parts(PropertyGroup::Dict, 0),
            tick,
            idx as u16,
            total_sub,
            0,
            |w| w.write_u8(kind as u8),
        );

        if let Some(e) = enumerator {
            let mut sender = DictCursor::for_sending(total_sub);
            e.for_each_member(&mut |member| {
                let (sub_kind, member_id, name) = match member {
                    Member::Struct(s) => (FobjectKind::VarTypeStructMember, s.type_handle.0, s.name),
                    Member::Enum(en) => (FobjectKind::VarTypeEnumMember, en.id as u32, en.name),
                };
                sender.emit_one(DictPass::Sending, |total, sub_idx| {
                    self.serializer.send_dict(
                        &mut self.ring,
                        false,
                        req_seq,
                        self.mcu.header_mut(),
                        handle.0,
                        PropertyByte::from_parts(PropertyGroup::Dict, 0),
                        tick,
                        idx as u16,
                        total,
                        sub_idx,
                        |w| {
                            w.write_u8(sub_kind as u8);
                            w.write_u32(member_id);
                            w.write_str_with_len(name);
                        },
                    );
                });
            });
        }
        self.dict_mode.advance();
    }

    fn finish_dict_send(&mut self) {
        let req_seq = self.dict_mode.req_seq();
        let tick = self.port.tick();
        self.serializer.send_event(
            &mut self.ring,
            FrameType::Response,
            req_seq,
            self.mcu.header_mut(),
            MCU_HANDLE,
            PropertyByte::from_parts(PropertyGroup::Event, McuEventId::DictEnd as u8),
            tick,
            0,
            McuEventId::DictEnd as u16,
            0,
            |_| {},
        );
        self.dict_mode.finish();
        self.registry.set_enum_in_progress(false);
        self.status.remove(StatusFlags::NEW_DICT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FobjectId;

    struct FakePort {
        tick: core::cell::Cell<u32>,
        sent: std::cell::RefCell<Vec<u8>>,
    }
    impl Port for FakePort {
        fn fw_name(&self) -> &str {
            "testfw"
        }
        fn fw_info(&self) -> &str {
            "{}"
        }
        fn send(&mut self, b: &[u8]) -> Result<(), ()> {
            self.sent.borrow_mut().extend_from_slice(b);
            Ok(())
        }
        fn is_sending(&self) -> bool {
            false
        }
        fn reset_mcu(&mut self) -> ! {
            panic!("reset requested")
        }
        fn tick(&self) -> u32 {
            self.tick.get()
        }
        fn tick_to_ns(&self) -> u32 {
            1_000_000
        }
        fn boot_time_ms(&self) -> u32 {
            3
        }
    }

    fn new_runtime() -> Faraabin<FakePort, 8, 256, 64, 32, 2, 64, 2, 4, 16> {
        let port = FakePort {
            tick: core::cell::Cell::new(0),
            sent: std::cell::RefCell::new(Vec::new()),
        };
        Faraabin::new(port, FeatureFlags::empty())
    }

    #[test]
    fn init_enqueues_boot_event_and_flush_sends_it() {
        let mut rt = new_runtime();
        rt.init();
        rt.flush(false).unwrap();
        assert!(!rt.port().sent.borrow().is_empty());
    }

    #[test]
    fn register_fobject_sets_new_dict_status() {
        let mut rt = new_runtime();
        rt.init();
        rt.register_fobject(FobjectId(42), FobjectKind::Container).unwrap();
        assert!(rt.status.contains(StatusFlags::NEW_DICT));
    }

    #[test]
    fn send_all_dict_blocking_drains_every_registered_handle() {
        let mut rt = new_runtime();
        rt.init();
        rt.register_fobject(FobjectId(1), FobjectKind::Container).unwrap();
        rt.register_fobject(FobjectId(2), FobjectKind::Container).unwrap();
        // SendAllDict(blocking=true), req_seq encoded via control byte bits 0..3
        let frame: PendingFrame<32> = PendingFrame::new(
            crate::wire::control::InboundControl::new(0b0000_0011),
            PropertyByte::from_parts(PropertyGroup::Command, mcu_prop::SEND_ALL_DICT),
            MCU_HANDLE,
            &[1u8],
        );
        rt.dispatch(frame);
        assert!(!rt.dict_mode.is_sending());
        assert!(!rt.status.contains(StatusFlags::NEW_DICT));
    }

    #[test]
    fn send_all_dict_rejected_on_password_mismatch() {
        let mut features = FeatureFlags::empty();
        features.insert(FeatureFlags::PASSWORD);
        let mut rt: Faraabin<FakePort, 8, 256, 64, 32, 2, 64, 2, 4, 16> =
            Faraabin::new(FakePort { tick: core::cell::Cell::new(0), sent: std::cell::RefCell::new(Vec::new()) }, features);
        rt.init();
        rt.set_password(b"secret");
        rt.register_fobject(FobjectId(1), FobjectKind::Container).unwrap();

        let mut payload = Vec::new();
        payload.push(1u8); // blocking
        payload.extend_from_slice(&7u16.to_le_bytes()); // session id
        payload.extend_from_slice(b"wrong");
        let frame: PendingFrame<32> = PendingFrame::new(
            crate::wire::control::InboundControl::new(0b0000_0011),
            PropertyByte::from_parts(PropertyGroup::Command, mcu_prop::SEND_ALL_DICT),
            MCU_HANDLE,
            &payload,
        );
        rt.dispatch(frame);
        assert!(!rt.dict_mode.is_sending(), "mismatched password must not start enumeration");
    }

    #[test]
    fn function_run_dispatch_emits_run_event_with_object_as_extended_handle() {
        let mut rt = new_runtime();
        rt.init();
        rt.register_fobject(FobjectId(10), FobjectKind::Function).unwrap();

        let mut payload = Vec::new();
        payload.extend_from_slice(&20u32.to_le_bytes()); // object handle
        payload.extend_from_slice(b"42 7"); // args

        let frame: PendingFrame<32> = PendingFrame::new(
            crate::wire::control::InboundControl::new(0b0000_0001),
            PropertyByte::from_parts(PropertyGroup::Command, function_prop::RUN),
            10,
            &payload,
        );
        rt.dispatch(frame);
        assert_eq!(rt.functions.running_count(), 1);
        rt.flush(false).unwrap();
        assert!(!rt.port().sent.borrow().is_empty());
    }

    #[test]
    fn databus_start_stream_dispatch_transitions_state() {
        let mut features = FeatureFlags::empty();
        features.insert(FeatureFlags::DEFAULT_DATABUS);
        let port = FakePort { tick: core::cell::Cell::new(0), sent: std::cell::RefCell::new(Vec::new()) };
        let mut rt: Faraabin<FakePort, 8, 256, 64, 32, 2, 64, 2, 4, 16> = Faraabin::new(port, features);
        rt.init();

        let payload = 3u16.to_le_bytes();
        let frame: PendingFrame<32> = PendingFrame::new(
            crate::wire::control::InboundControl::new(0b0000_0001),
            PropertyByte::from_parts(PropertyGroup::Command, databus_prop::START_STREAM),
            DEFAULT_DATABUS_HANDLE,
            &payload,
        );
        rt.dispatch(frame);
        assert_eq!(rt.databus.state(), crate::databus::DataBusState::Stream);
    }
}
