//! DataBus channel slots and the captured-sample record (spec §3
//! "DataBus", §4.7 "Channel sampling").
//!
//! Grounded on
//! `examples/original_source/faraabin/faraabin_fobject_databus.h`'s
//! `sFaraabinFobjectDataBus_Channel`/`sFaraabinFobjectDataBus_CaptureValue`:
//! the capture value keeps its exact wire shape (type tag, pointer/handle,
//! timestamp, 8-byte value) per spec §9 "capture ring as value-union", with
//! the handle now a [`FobjectId`] instead of a raw pointer.

use crate::fobject::{FobjectId, FobjectKind};
use crate::vartype::PrimitiveId;

/// What a channel is sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// A registered variable (dictionary entry), sampled by address.
    Var,
    /// A bare numerical sample entity (no dictionary entry) fed by an
    /// external collaborator such as the CPU profiler.
    EntityNumerical,
    /// A profiler CodeBlock; samples arrive through
    /// [`crate::databus::DataBus::run_codeblock_sample`] rather than being
    /// polled here.
    CodeBlock,
}

/// One channel slot (spec §3 "channels\[ChannelQty\]").
#[derive(Debug, Clone, Copy)]
pub struct Channel {
    /// What this channel samples; `None` if the slot is free.
    pub kind: Option<ChannelKind>,
    /// Handle of the attached fobject (variable, CodeBlock, ...).
    pub item_handle: FobjectId,
    /// Kind of the attached fobject, recorded so capture samples carry the
    /// correct wire type tag without a registry lookup.
    pub item_fobject_kind: FobjectKind,
    /// Byte width of the source value, `<= 8`.
    pub item_param_size: u8,
    /// Primitive id used to interpret the raw bytes for trigger/threshold
    /// comparisons.
    pub primitive_id: PrimitiveId,
    /// Channel-level enable; a disabled channel stays attached but is
    /// excluded from `available_count` and from sampling (spec §3
    /// invariant "available_count <= attached_count").
    pub enabled: bool,
}

impl Channel {
    /// An empty (unattached) channel slot.
    pub const fn empty() -> Self {
        Self {
            kind: None,
            item_handle: FobjectId::NULL,
            item_fobject_kind: FobjectKind::EntityNumerical,
            item_param_size: 0,
            primitive_id: PrimitiveId::U8,
            enabled: true,
        }
    }

    /// `true` if a fobject occupies this slot.
    pub const fn is_attached(&self) -> bool {
        self.kind.is_some()
    }

    /// `true` if attached and enabled (eligible for sampling).
    pub const fn is_available(&self) -> bool {
        self.enabled && self.is_attached()
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::empty()
    }
}

/// Fixed-size wire record for one captured sample (spec §3 "CaptureSample";
/// §9 "keep this exact wire layout"): `{ fobject_kind, fobject_handle, ts,
/// value:[u8;8] }`. Bytes are stored exactly as sampled, with no endian
/// normalization (spec §9 open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSample {
    /// Kind tag of the sampled fobject.
    pub fobject_kind: FobjectKind,
    /// Handle of the sampled fobject.
    pub fobject_handle: FobjectId,
    /// Tick-derived timestamp at sample time.
    pub timestamp: u32,
    /// Raw sampled bytes, left-aligned, zero-padded past `item_param_size`.
    pub value: [u8; 8],
}

impl CaptureSample {
    /// A zeroed sample, used to pre-fill the capture ring's backing array.
    pub const fn zeroed() -> Self {
        Self {
            fobject_kind: FobjectKind::EntityNumerical,
            fobject_handle: FobjectId::NULL,
            timestamp: 0,
            value: [0u8; 8],
        }
    }

    /// Interprets the stored bytes as a little-endian `u32` (used for
    /// trigger comparisons on unsigned/signed 32-bit channels and
    /// narrower).
    pub fn as_u32(&self) -> u32 {
        u32::from_le_bytes([self.value[0], self.value[1], self.value[2], self.value[3]])
    }

    /// Interprets the stored bytes as a little-endian `i32`.
    pub fn as_i32(&self) -> i32 {
        self.as_u32() as i32
    }

    /// Interprets the stored bytes as an IEEE-754 `f32`.
    pub fn as_f32(&self) -> f32 {
        f32::from_bits(self.as_u32())
    }
}
