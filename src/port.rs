//! The port contract: everything the core calls into but does not
//! implement (spec §6.1).
//!
//! A firmware integrator implements this trait once, over whatever
//! transport (UART, USB-CDC, ...) it has, and hands the implementation to
//! [`crate::runtime::Faraabin::new`].

/// Firmware-supplied collaborator: identification strings, the transport,
/// and the free-running tick used for timing.
pub trait Port {
    /// Firmware name, exposed via WhoAmI.
    fn fw_name(&self) -> &str;

    /// Arbitrary firmware info string, optionally JSON. Exposed via
    /// WhoAmI.
    fn fw_info(&self) -> &str;

    /// Hands a contiguous run of bytes to the transport. Returns `Err` on
    /// transport failure; the link handler counts this as a TX error and
    /// keeps attempting subsequent frames (spec §7).
    fn send(&mut self, bytes: &[u8]) -> Result<(), ()>;

    /// Whether the transport is still draining a previous `send` call.
    /// Used by `flush` to decide whether it may start another region.
    fn is_sending(&self) -> bool;

    /// Resets the MCU. May not return.
    fn reset_mcu(&mut self) -> !;

    /// A free-running tick counter used to derive elapsed time. Wraps at
    /// [`Port::tick_top`].
    fn tick(&self) -> u32;

    /// The value `tick()` wraps at (e.g. `u32::MAX` for a full-width
    /// counter, or a smaller timer reload value).
    fn tick_top(&self) -> u32 {
        u32::MAX
    }

    /// Coefficient to convert one tick into nanoseconds, exposed via
    /// WhoAmI so the host can render real time deltas.
    fn tick_to_ns(&self) -> u32;

    /// Milliseconds since boot at the point `init()` ran, exposed via
    /// WhoAmI.
    fn boot_time_ms(&self) -> u32;

    /// `true` if this target is little-endian. Exposed via WhoAmI; spec
    /// §9 requires the wire format to advertise rather than normalize
    /// endianness, since captured sample bytes are stored as received.
    fn is_little_endian(&self) -> bool {
        cfg!(target_endian = "little")
    }
}
