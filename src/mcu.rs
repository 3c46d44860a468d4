//! The MCU singleton fobject (spec §4.10).
//!
//! Grounded on
//! `examples/original_source/faraabin/faraabin_fobject_mcu.h`:
//! statistics counters, the host-connected live-timeout chrono, session id
//! and boot time are preserved field-for-field; the user-terminal callback
//! becomes a boxed-free trait object slot the same way
//! [`crate::vartype::MemberEnumerator`] replaces a raw function pointer.

use crate::chrono::Chrono;
use crate::fobject::{FobjectHeader, FobjectKind};
use crate::port::Port;

/// System event ids the MCU fobject can emit, grounded in
/// `eFaraabinFobjectMcu_SystemEventId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum McuEventId {
    /// User-terminal data forwarded from the host.
    UserDataReceived = 0,
    /// Final frame of a `SendAllDict` enumeration.
    DictEnd,
    /// `ClearFlagBufferOvf` handled.
    ClearFlagBufferOvf,
    /// Emitted once at `init()` completion (spec §3 global lifecycle).
    Boot,
    /// RX scratch exceeded the configured buffer length.
    RxFrameBigSize,
    /// A new frame arrived before the previous decoded frame was consumed.
    RxFrameBeforeEndOfPrevious,
    /// De-stuffing failed (spec §4.1 `EscapeError`).
    RxFrameDescape,
    /// Checksum mismatch (spec §4.1 `ChecksumError`).
    RxFrameChecksum,
    /// Frame shorter than the minimum (spec §4.1 `MinimumSize`).
    RxFrameSmallSize,
    /// `flush(blocking=true)` timed out.
    TxFrameTimeout,
    /// [`Port::send`] returned an error.
    TxFrameSend,
    /// `send_printf` re-entrancy cap exceeded.
    MaxPrintfReentrant,
    /// Unclassified internal error.
    Undefined,
    /// Dictionary emission hit an unsupported fobject kind.
    UnsupportedFobjectTypeDict,
    /// Dictionary index bookkeeping overflowed.
    DictIndexOverflow,
    /// `(kind, group, id)` not in the dispatch table (spec §4.9 Dispatch).
    UnsupportedFobjectProperty,
    /// Dispatch saw an unrecognized fobject kind.
    UnsupportedFobjectType,
    /// `SendAllDict` password mismatch.
    Password,
    /// `ResetCpu` invoked but the port's reset hook is a no-op stub.
    ResetFuncNotImplemented,
}

/// RX/TX counters (spec §4.10 "statistics counters").
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    /// Frames successfully decoded.
    pub rx_frames: u32,
    /// Raw bytes observed by `on_byte`.
    pub rx_bytes: u32,
    /// De-stuff failures.
    pub rx_escape_errors: u32,
    /// Checksum failures.
    pub rx_checksum_errors: u32,
    /// New frame arrived before the previous one was consumed.
    pub rx_override_errors: u32,
    /// Frames rejected for being under the minimum size.
    pub rx_min_size_errors: u32,
    /// Frames handed to [`Port::send`].
    pub tx_frames: u32,
    /// Bytes handed to [`Port::send`].
    pub tx_bytes: u32,
}

/// The MCU singleton (spec §3 "Global lifecycle" step 2, §4.10).
pub struct Mcu {
    header: FobjectHeader,
    stats: Statistics,
    live_timeout: Chrono,
    is_host_connected: bool,
    session_id: u16,
    is_sending_cpu_profiler: bool,
    boot_time_ms: u32,
}

/// Default live-timeout window: the host is considered disconnected if
/// `SendLive` hasn't refreshed the chrono within this many milliseconds.
pub const LIVE_TIMEOUT_MS: u32 = 5_000;

impl Mcu {
    /// A not-yet-initialized MCU singleton.
    pub const fn new() -> Self {
        Self {
            header: FobjectHeader::new(FobjectKind::Mcu),
            stats: Statistics {
                rx_frames: 0,
                rx_bytes: 0,
                rx_escape_errors: 0,
                rx_checksum_errors: 0,
                rx_override_errors: 0,
                rx_min_size_errors: 0,
                tx_frames: 0,
                tx_bytes: 0,
            },
            live_timeout: Chrono::new(),
            is_host_connected: false,
            session_id: 0,
            is_sending_cpu_profiler: false,
            boot_time_ms: 0,
        }
    }

    /// Records `boot_time_ms` and marks the fobject initialized (spec §3
    /// global lifecycle step 2).
    pub fn init<P: Port>(&mut self, port: &P) {
        self.boot_time_ms = port.boot_time_ms();
        self.header.is_init = true;
    }

    /// Read-only access to the RX/TX counters.
    pub const fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// `true` if `SendLive` has refreshed the chrono within
    /// [`LIVE_TIMEOUT_MS`].
    pub const fn is_host_connected(&self) -> bool {
        self.is_host_connected
    }

    /// The current session id.
    pub const fn session_id(&self) -> u16 {
        self.session_id
    }

    pub(crate) fn header_mut(&mut self) -> &mut FobjectHeader {
        &mut self.header
    }

    // --- RX statistics hooks, called from the link handler ---------------

    /// One raw byte observed.
    pub fn note_rx_byte(&mut self) {
        self.stats.rx_bytes += 1;
    }

    /// A frame decoded successfully.
    pub fn note_rx_frame(&mut self) {
        self.stats.rx_frames += 1;
    }

    /// A decode error of the given kind.
    pub fn note_rx_error(&mut self, event: McuEventId) {
        match event {
            McuEventId::RxFrameDescape => self.stats.rx_escape_errors += 1,
            McuEventId::RxFrameChecksum => self.stats.rx_checksum_errors += 1,
            McuEventId::RxFrameBeforeEndOfPrevious => self.stats.rx_override_errors += 1,
            McuEventId::RxFrameSmallSize | McuEventId::RxFrameBigSize => {
                self.stats.rx_min_size_errors += 1
            }
            _ => {}
        }
    }

    /// A frame handed to the transport.
    pub fn note_tx_frame(&mut self, bytes: u32) {
        self.stats.tx_frames += 1;
        self.stats.tx_bytes += bytes;
    }

    // --- MCU commands ------------------------------------------------------

    /// `SendLive`: refreshes the host-connected chrono and marks the host
    /// connected (spec §4.9 MCU commands).
    pub fn note_live<P: Port>(&mut self, port: &P, session_id: u16) {
        self.live_timeout.start(port);
        self.is_host_connected = true;
        self.session_id = session_id;
    }

    /// Checked once per `Run()`: flips `is_host_connected` false once the
    /// live timeout expires (spec §4.9 "Live timeout").
    pub fn check_live_timeout<P: Port>(&mut self, port: &P) {
        if self.is_host_connected && self.live_timeout.is_expired_ms(port, LIVE_TIMEOUT_MS) {
            self.is_host_connected = false;
        }
    }

    /// Sets whether CPU-profiler samples should be forwarded (an external
    /// collaborator toggles this through the MCU singleton, spec §1
    /// Non-goals: the profiler's internals are out of scope, but the toggle
    /// lives here).
    pub fn set_cpu_profiler_sending(&mut self, enabled: bool) {
        self.is_sending_cpu_profiler = enabled;
    }

    /// `true` if CPU-profiler samples should be forwarded.
    pub const fn is_sending_cpu_profiler(&self) -> bool {
        self.is_sending_cpu_profiler
    }

    /// Boot time recorded at `init()`.
    pub const fn boot_time_ms(&self) -> u32 {
        self.boot_time_ms
    }
}

impl Default for Mcu {
    fn default() -> Self {
        Self::new()
    }
}
