//! Feature and status bitmaps exposed in Live/WhoAmI frames (spec §6.3).
//!
//! Grounded on `examples/jungamer-64-OS`'s use of the `bitflags` crate for
//! register/status bitmaps; the bit positions below are this crate's own
//! choice (the source's bit layout for these two words is not part of the
//! wire contract the spec pins down, unlike the control/property bytes).

use bitflags::bitflags;

bitflags! {
    /// Optional pieces of the runtime advertised to the host so its UI can
    /// hide affordances for features the firmware didn't build in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureFlags: u32 {
        /// A default DataBus fobject is registered at init.
        const DEFAULT_DATABUS      = 1 << 0;
        /// A default EventGroup fobject is registered at init.
        const DEFAULT_EVENT_GROUP  = 1 << 1;
        /// The firmware's MCU CLI add-on is present.
        const MCU_CLI              = 1 << 2;
        /// Ring buffer overflow is reported to the host as a status bit
        /// rather than silently dropped.
        const BUFFER_OVERFLOW_NOTIFY = 1 << 3;
        /// `SendAllDict` requires a shared-secret password.
        const PASSWORD              = 1 << 4;
        /// The CPU profiler add-on feeds DataBus channels.
        const CPU_PROFILER          = 1 << 5;
        /// The state-machine add-on is present.
        const STATE_MACHINE         = 1 << 6;
        /// Unity test add-on hooks are present.
        const UNITY                 = 1 << 7;
        /// `SendAllDict(blocking=true)` is permitted.
        const ALLOW_BLOCKING_DICT   = 1 << 8;
    }
}

bitflags! {
    /// Runtime signals latched by the core and cleared by explicit host
    /// commands or natural completion (spec §6.3, §11 supplement for the
    /// profiler/dict-duplicate bits).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u32 {
        /// Set once after boot, cleared on first `SendLive`.
        const MCU_RESET          = 1 << 0;
        /// At least one fobject was registered since the last
        /// `SendAllDict` completed (spec §4.3).
        const NEW_DICT           = 1 << 1;
        /// [`crate::ring_buffer::RingBuffer::overflowed`] latched; cleared
        /// by `ClearFlagBufferOvf`.
        const BUFFER_OVERFLOW    = 1 << 2;
        /// Dictionary emission overflowed some bookkeeping counter.
        const DICT_OVERFLOW      = 1 << 3;
        /// `add_dict` was called with the null handle.
        const NULL_DICT          = 1 << 4;
        /// `add_dict` was called while enumeration was in flight.
        const UNEXPECTED_DICT    = 1 << 5;
        /// CPU profiler sample send failed.
        const PROFILER_SEND_OVF  = 1 << 6;
        /// CPU profiler's internal list overflowed.
        const PROFILER_LIST_OVF  = 1 << 7;
        /// CPU profiler's call-depth tracking overflowed.
        const PROFILER_DEPTH_OVF = 1 << 8;
        /// CPU profiler detected a duplicate sample.
        const PROFILER_DUPLICATE = 1 << 9;
        /// Dictionary enumeration encountered a duplicate fobject.
        const DICT_DUPLICATE     = 1 << 10;
        /// A handler ran against a fobject whose `init` never completed.
        const UNINITIALIZED_FARAABIN = 1 << 11;
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags::empty()
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        StatusFlags::MCU_RESET
    }
}
