//! Variable type schemas (spec §3 "VarType", §4.4, §9 "user-supplied member
//! enumerators").
//!
//! Grounded on `examples/original_source/faraabin/faraabin_fobject_vartype.h`:
//! the source stores a function pointer per user-defined `VarType` pointing
//! at the user's member-listing routine. Per §9, this becomes a trait
//! implemented once per user-defined type rather than a raw pointer.

use crate::fobject::FobjectId;

/// Primitive scalar kinds, each with an intrinsic wire size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveId {
    /// 1-byte boolean.
    Bool,
    /// Unsigned 8-bit.
    U8,
    /// Signed 8-bit.
    I8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 16-bit.
    I16,
    /// Unsigned 32-bit.
    U32,
    /// Signed 32-bit.
    I32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 64-bit.
    I64,
    /// IEEE-754 single precision.
    F32,
    /// IEEE-754 double precision.
    F64,
}

impl PrimitiveId {
    /// Wire size in bytes.
    pub const fn size(self) -> usize {
        match self {
            PrimitiveId::Bool | PrimitiveId::U8 | PrimitiveId::I8 => 1,
            PrimitiveId::U16 | PrimitiveId::I16 => 2,
            PrimitiveId::U32 | PrimitiveId::I32 | PrimitiveId::F32 => 4,
            PrimitiveId::U64 | PrimitiveId::I64 | PrimitiveId::F64 => 8,
        }
    }

    /// `true` for the two floating-point ids, which trigger only on
    /// Rising/Falling, never Change (spec §4.7 trigger detection).
    pub const fn is_float(self) -> bool {
        matches!(self, PrimitiveId::F32 | PrimitiveId::F64)
    }

    /// `true` if this primitive's wire representation is signed.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveId::I8 | PrimitiveId::I16 | PrimitiveId::I32 | PrimitiveId::I64
        )
    }
}

/// One member of a `UserStruct` vartype.
#[derive(Debug, Clone, Copy)]
pub struct StructMember<'a> {
    /// Member name.
    pub name: &'a str,
    /// Handle of the member's own vartype.
    pub type_handle: FobjectId,
    /// Array length, 1 for a scalar member.
    pub array_len: u32,
    /// `true` if the member itself is a pointer to the described type.
    pub is_ptr: bool,
}

/// One member of a `UserEnum` vartype.
#[derive(Debug, Clone, Copy)]
pub struct EnumMember<'a> {
    /// Member name.
    pub name: &'a str,
    /// Enumerator numeric id.
    pub id: u16,
}

/// A single member emitted during dictionary enumeration — either a struct
/// field or an enum constant, unified so callers can iterate member lists
/// without matching on vartype kind.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    /// See [`StructMember`].
    Struct(StructMember<'a>),
    /// See [`EnumMember`].
    Enum(EnumMember<'a>),
}

/// Implemented once per user-defined (struct/enum) type; the dictionary
/// iterator calls `for_each_member` during dict emission (spec §4.4: "the
/// member callback emits one sub-dict frame per member").
///
/// This is the trait-object replacement for the source's function pointer
/// per §9's "user-supplied member enumerators" note.
pub trait MemberEnumerator {
    /// Invokes `visit` once per member, in declaration order.
    fn for_each_member(&self, visit: &mut dyn FnMut(Member<'_>));
}

/// Schema for a variable's value layout (spec §3 "VarType").
#[derive(Debug, Clone, Copy)]
pub enum VarTypeKind {
    /// A primitive scalar.
    Primitive(PrimitiveId),
    /// A user-defined struct; members are enumerated via
    /// [`MemberEnumerator`] at dictionary-emission time.
    UserStruct {
        /// Declared size in bytes.
        size: u32,
    },
    /// A user-defined enum; members are enumerated via
    /// [`MemberEnumerator`].
    UserEnum {
        /// Declared size in bytes (the enum's underlying integer width).
        size: u32,
    },
    /// Reserved; treated as a struct for enumeration purposes (spec §3).
    UserUnion {
        /// Declared size in bytes.
        size: u32,
    },
}

impl VarTypeKind {
    /// Declared size in bytes.
    pub const fn size(&self) -> u32 {
        match self {
            VarTypeKind::Primitive(p) => p.size() as u32,
            VarTypeKind::UserStruct { size }
            | VarTypeKind::UserEnum { size }
            | VarTypeKind::UserUnion { size } => *size,
        }
    }
}

/// A registered vartype fobject: its kind plus the name/path pair every
/// fobject carries (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct VarType<'a> {
    /// Schema.
    pub kind: VarTypeKind,
    /// Type name, as shown to the host.
    pub name: &'a str,
    /// Enumeration path; "root" unless the application supplies one (spec
    /// §4.4).
    pub path: &'a str,
}

impl<'a> VarType<'a> {
    /// A primitive vartype (the ten built-ins registered at `init`, spec
    /// §3's global lifecycle step 2).
    pub const fn primitive(id: PrimitiveId, name: &'a str) -> Self {
        Self {
            kind: VarTypeKind::Primitive(id),
            name,
            path: "root",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Point3;
    impl MemberEnumerator for Point3 {
        fn for_each_member(&self, visit: &mut dyn FnMut(Member<'_>)) {
            visit(Member::Struct(StructMember {
                name: "x",
                type_handle: FobjectId(100),
                array_len: 1,
                is_ptr: false,
            }));
            visit(Member::Struct(StructMember {
                name: "y",
                type_handle: FobjectId(100),
                array_len: 1,
                is_ptr: false,
            }));
            visit(Member::Struct(StructMember {
                name: "z",
                type_handle: FobjectId(100),
                array_len: 1,
                is_ptr: false,
            }));
        }
    }

    #[test]
    fn member_enumerator_visits_in_order() {
        let p = Point3;
        let mut names = Vec::new();
        p.for_each_member(&mut |m| {
            if let Member::Struct(s) = m {
                names.push(s.name);
            }
        });
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn primitive_sizes_match_wire_widths() {
        assert_eq!(PrimitiveId::Bool.size(), 1);
        assert_eq!(PrimitiveId::I64.size(), 8);
        assert_eq!(PrimitiveId::F32.size(), 4);
        assert!(PrimitiveId::F64.is_float());
        assert!(!PrimitiveId::U32.is_float());
    }
}
