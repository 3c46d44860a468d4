//! Unified error types for the Faraabin runtime.
//!
//! Every component returns one of these small enums from its public
//! operations; [`link_handler`](crate::link_handler) is the single place
//! that folds a component error into a wire-level system-exception event,
//! per spec §7's propagation policy.

use core::fmt;

/// Top-level error, used where a caller cares about which subsystem failed
/// but not the fine-grained reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaraabinError {
    /// Frame decode failed.
    Decode(DecodeError),
    /// Registry operation failed.
    Registry(RegistryError),
    /// DataBus operation failed.
    DataBus(DataBusError),
    /// Function engine operation failed.
    Function(FunctionError),
    /// Transmit path failed.
    Tx(TxError),
    /// A bounded internal resource was exhausted.
    Resource(ResourceError),
}

impl fmt::Display for FaraabinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaraabinError::Decode(e) => write!(f, "decode error: {e}"),
            FaraabinError::Registry(e) => write!(f, "registry error: {e}"),
            FaraabinError::DataBus(e) => write!(f, "databus error: {e}"),
            FaraabinError::Function(e) => write!(f, "function engine error: {e}"),
            FaraabinError::Tx(e) => write!(f, "tx error: {e}"),
            FaraabinError::Resource(e) => write!(f, "resource error: {e}"),
        }
    }
}

/// Frame codec errors (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// An `ESC` byte was followed by something other than a stuffed
    /// `EOF`/`ESC`.
    EscapeError,
    /// Checksum over the de-stuffed bytes did not fold to `0xFF`.
    ChecksumError,
    /// Post-stuff, post-checksum frame was shorter than the 7-byte minimum.
    MinimumSize,
    /// RX scratch buffer would have overflowed before a terminating `EOF`.
    OverrunBeforeEOF,
    /// Destination buffer passed to a write helper was too small.
    MemoryError,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecodeError::EscapeError => "invalid escape sequence",
            DecodeError::ChecksumError => "checksum mismatch",
            DecodeError::MinimumSize => "frame shorter than minimum size",
            DecodeError::OverrunBeforeEOF => "rx buffer overrun before EOF",
            DecodeError::MemoryError => "destination buffer too small",
        };
        f.write_str(s)
    }
}

/// Registry errors (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Handle already present; the insert is rejected but treated as
    /// idempotent by the caller.
    Duplicate,
    /// Handle was the null handle.
    Null,
    /// Registry was already at `MAX_FOBJECTS` capacity.
    Full,
    /// A mutating call arrived while `SendAllDict` enumeration was in
    /// flight.
    UnexpectedDuringEnum,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistryError::Duplicate => "duplicate handle",
            RegistryError::Null => "null handle",
            RegistryError::Full => "registry full",
            RegistryError::UnexpectedDuringEnum => "add rejected during dict enumeration",
        };
        f.write_str(s)
    }
}

/// DataBus errors (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBusError {
    /// Channel index `>= ChannelQty`.
    ChannelOutOfRange,
    /// A null/zero address or handle was passed where one is required.
    ActionWithNullReference,
    /// The CodeBlock is already bound to a DataBus channel (exclusive
    /// ownership, spec §4.7 Attach).
    CodeBlockAlreadyAttached,
    /// `GetCaptureData`/`CaptureSend` called with an empty capture ring.
    CaptureQueueEmpty,
    /// The referenced fobject could not be found in the registry.
    NoFindFobject,
    /// Caller passed a parameter outside its valid domain.
    Param,
    /// Detach requested on a channel that was not attached.
    Detach,
    /// Attach requested with no free channel slot (or the full databus
    /// itself is not initialized).
    Attach,
    /// DataBus fobject has not been initialized.
    NotInit,
}

impl fmt::Display for DataBusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataBusError::ChannelOutOfRange => "channel index out of range",
            DataBusError::ActionWithNullReference => "action with null reference",
            DataBusError::CodeBlockAlreadyAttached => "code block already attached",
            DataBusError::CaptureQueueEmpty => "capture queue empty",
            DataBusError::NoFindFobject => "fobject not found",
            DataBusError::Param => "invalid parameter",
            DataBusError::Detach => "detach failed",
            DataBusError::Attach => "attach failed, no free channel",
            DataBusError::NotInit => "databus not initialized",
        };
        f.write_str(s)
    }
}

/// Function engine errors (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionError {
    /// The `(function, object)` pair is already bound to a running slot.
    AlreadyRunning,
    /// All `MAX_CONCURRENT_FUNCTION` slots are busy.
    MaxConcurrentReached,
    /// No slot currently holds the `(function, object)` pair.
    NotFound,
    /// The function handler rejected its argument text.
    ParamQty,
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionError::AlreadyRunning => "function already running for this object",
            FunctionError::MaxConcurrentReached => "max concurrent functions reached",
            FunctionError::NotFound => "function/object pair not running",
            FunctionError::ParamQty => "argument parse failure",
        };
        f.write_str(s)
    }
}

/// TX path errors (spec §4.9 flush).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// `flush(blocking = true)` exceeded its `bytes * BYTE_TIME_MS * 2`
    /// timeout waiting for the transport to drain.
    SendTimeout,
    /// [`port::Port::send`](crate::port::Port::send) returned an error.
    SendFail,
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxError::SendTimeout => "tx flush timed out",
            TxError::SendFail => "transport send failed",
        };
        f.write_str(s)
    }
}

/// Resource exhaustion errors not tied to one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    /// `send_printf` re-entered beyond `TEXT_EVENT_MAX_REENTRANCE`.
    MaxPrintfReentrant,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::MaxPrintfReentrant => f.write_str("max printf reentrancy exceeded"),
        }
    }
}

impl From<DecodeError> for FaraabinError {
    fn from(e: DecodeError) -> Self {
        FaraabinError::Decode(e)
    }
}

impl From<RegistryError> for FaraabinError {
    fn from(e: RegistryError) -> Self {
        FaraabinError::Registry(e)
    }
}

impl From<DataBusError> for FaraabinError {
    fn from(e: DataBusError) -> Self {
        FaraabinError::DataBus(e)
    }
}

impl From<FunctionError> for FaraabinError {
    fn from(e: FunctionError) -> Self {
        FaraabinError::Function(e)
    }
}

impl From<TxError> for FaraabinError {
    fn from(e: TxError) -> Self {
        FaraabinError::Tx(e)
    }
}

impl From<ResourceError> for FaraabinError {
    fn from(e: ResourceError) -> Self {
        FaraabinError::Resource(e)
    }
}
