//! Opaque fobject handles and the tagged-sum kind enum (spec §3, §9 Design
//! Notes).
//!
//! Grounded on `examples/original_source/faraabin/faraabin_fobject.h`'s
//! `eFaraabin_FobjectType`: that source uses a leading type-tag byte and a
//! switch over raw addresses. Here the tag becomes [`FobjectKind`] and the
//! address becomes an opaque [`FobjectId`] resolved through
//! [`crate::registry::Registry`] — nothing dereferences a host-supplied
//! integer as a pointer.

use core::fmt;

/// Opaque identity of a registered fobject, stable for the process
/// lifetime. The host sees this as an unstructured 32-bit token (spec §3);
/// [`crate::MCU_HANDLE`] is the one handle value that does not resolve
/// through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FobjectId(pub u32);

impl FobjectId {
    /// The null handle: never a valid registry entry.
    pub const NULL: FobjectId = FobjectId(0);

    /// `true` for the null handle.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FobjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Every fobject's kind tag. Sub-kinds for struct/enum members and
/// state/transition children are first-class variants, not a nested
/// discriminant, per §9's "sub-kinds are first-class sum variants too".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FobjectKind {
    /// The MCU singleton (addressed by [`crate::MCU_HANDLE`], but also
    /// occupies a registry slot for dictionary enumeration purposes).
    Mcu,
    /// User-defined grouping fobject whose body is a user callback.
    Container,
    /// Destination label for event frames with a user-terminal callback.
    EventGroup,
    /// Streaming/capture engine.
    DataBus,
    /// A variable schema (primitive or user-defined).
    VarType,
    /// A group that owns a set of [`FobjectKind::Function`] children.
    FunctionGroupType,
    /// A host-invokable command bound to a function group.
    Function,
    /// A profiler sample point (external collaborator owns the samples).
    CodeBlock,
    /// A state machine with child states/transitions.
    StateMachine,
    /// A struct member of a [`FobjectKind::VarType`].
    VarTypeStructMember,
    /// An enum member of a [`FobjectKind::VarType`].
    VarTypeEnumMember,
    /// A state belonging to a [`FobjectKind::StateMachine`].
    StateMachineState,
    /// A transition belonging to a [`FobjectKind::StateMachine`].
    StateMachineTransition,
    /// A single numerical sample entity (non-addressable variable, used by
    /// DataBus channels sourced from a profiler rather than a registered
    /// variable).
    EntityNumerical,
}

impl FobjectKind {
    /// `true` if this kind ever appears as a top-level registry entry
    /// (as opposed to a child enumerated through its parent).
    pub const fn is_top_level(self) -> bool {
        matches!(
            self,
            FobjectKind::Mcu
                | FobjectKind::Container
                | FobjectKind::EventGroup
                | FobjectKind::DataBus
                | FobjectKind::VarType
                | FobjectKind::FunctionGroupType
                | FobjectKind::Function
                | FobjectKind::CodeBlock
                | FobjectKind::StateMachine
        )
    }
}

/// Common header every fobject carries (spec §3 "Fobject").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FobjectHeader {
    /// This fobject's kind tag.
    pub kind: FobjectKind,
    /// Per-fobject emission sequence, 0..=15, wraps.
    pub seq: u8,
    /// Set once the fobject's `init` completed; operations on an
    /// uninitialized fobject are no-ops (spec §7 propagation policy).
    pub is_init: bool,
    /// Host-settable; a disabled fobject's serializer calls short-circuit.
    pub is_enabled: bool,
}

impl FobjectHeader {
    /// A freshly-constructed, not-yet-initialized header.
    pub const fn new(kind: FobjectKind) -> Self {
        Self {
            kind,
            seq: 0,
            is_init: false,
            is_enabled: true,
        }
    }

    /// Advances the per-fobject sequence mod 16 (spec §4.5, invariant 7).
    pub fn bump_seq(&mut self) -> u8 {
        let s = self.seq;
        self.seq = (self.seq + 1) & 0x0F;
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_wraps_mod_16() {
        let mut h = FobjectHeader::new(FobjectKind::Container);
        for expected in 0..32u8 {
            assert_eq!(h.bump_seq(), expected % 16);
        }
    }

    #[test]
    fn null_id_is_null() {
        assert!(FobjectId::NULL.is_null());
        assert!(!FobjectId(1).is_null());
    }
}
