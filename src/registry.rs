//! Dense slab table of fobject handles (spec §4.3).
//!
//! Grounded on `examples/original_source/faraabin/faraabin_database.c`'s
//! `fFaraabinDatabase_AddDict` (duplicate/null/full/unexpected rejection,
//! status-flag latching) translated into a const-generic array instead of
//! the source's fixed static table plus running count. Each slot also
//! carries the fobject's [`FobjectKind`] and an optional child enumerator,
//! so dispatch and dictionary emission can key off a handle without the
//! opaque handle itself encoding a type tag (spec §4.9 Dispatch table).

use crate::error::RegistryError;
use crate::fobject::{FobjectId, FobjectKind};
use crate::vartype::MemberEnumerator;

/// Ordered table of up to `N` fobject handles. Insertion order is
/// enumeration order (spec §3 "Registry").
pub struct Registry<const N: usize> {
    handles: [FobjectId; N],
    kinds: [FobjectKind; N],
    children: [Option<&'static dyn MemberEnumerator>; N],
    count: usize,
    enum_in_progress: bool,
}

impl<const N: usize> Registry<N> {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            handles: [FobjectId::NULL; N],
            kinds: [FobjectKind::Container; N],
            children: [None; N],
            count: 0,
            enum_in_progress: false,
        }
    }

    /// Number of handles currently registered.
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Handle at `index`, or `None` if out of range.
    pub fn at(&self, index: usize) -> Option<FobjectId> {
        if index < self.count {
            Some(self.handles[index])
        } else {
            None
        }
    }

    /// `true` if `handle` is already registered.
    pub fn exists(&self, handle: FobjectId) -> bool {
        self.handles[..self.count].contains(&handle)
    }

    fn index_of(&self, handle: FobjectId) -> Option<usize> {
        self.handles[..self.count].iter().position(|h| *h == handle)
    }

    /// The kind registered for `handle`.
    pub fn kind_of(&self, handle: FobjectId) -> Option<FobjectKind> {
        self.index_of(handle).map(|i| self.kinds[i])
    }

    /// The kind registered at `index`.
    pub fn kind_at(&self, index: usize) -> Option<FobjectKind> {
        if index < self.count {
            Some(self.kinds[index])
        } else {
            None
        }
    }

    /// The child enumerator registered at `index`, if any (spec §4.4, §4.9
    /// "StateMachine.Sub").
    pub fn children_at(&self, index: usize) -> Option<&'static dyn MemberEnumerator> {
        if index < self.count {
            self.children[index]
        } else {
            None
        }
    }

    /// Attaches a child enumerator to an already-registered handle, for
    /// fobjects whose dictionary entry has sub-entries (struct/enum vartype
    /// members, function-group members, state-machine states).
    pub fn set_children(&mut self, handle: FobjectId, enumerator: &'static dyn MemberEnumerator) {
        if let Some(i) = self.index_of(handle) {
            self.children[i] = Some(enumerator);
        }
    }

    /// Marks dictionary enumeration as in flight; `add_dict` is rejected
    /// with [`RegistryError::UnexpectedDuringEnum`] while this is set.
    pub fn set_enum_in_progress(&mut self, in_progress: bool) {
        self.enum_in_progress = in_progress;
    }

    /// Inserts `handle` with its `kind`, appending to the end of the table.
    ///
    /// Duplicates are idempotent (not re-inserted) and reported as
    /// [`RegistryError::Duplicate`]. The null handle is rejected with
    /// [`RegistryError::Null`]. A full table returns
    /// [`RegistryError::Full`].
    pub fn add_dict(&mut self, handle: FobjectId, kind: FobjectKind) -> Result<(), RegistryError> {
        if handle.is_null() {
            log::warn!("faraabin registry: rejecting null handle");
            return Err(RegistryError::Null);
        }
        if self.enum_in_progress {
            log::warn!("faraabin registry: add rejected, dict enumeration in flight");
            return Err(RegistryError::UnexpectedDuringEnum);
        }
        if self.exists(handle) {
            return Err(RegistryError::Duplicate);
        }
        if self.count >= N {
            log::error!("faraabin registry: full at {} entries", N);
            return Err(RegistryError::Full);
        }
        self.handles[self.count] = handle;
        self.kinds[self.count] = kind;
        self.children[self.count] = None;
        self.count += 1;
        Ok(())
    }

    /// Iterates registered handles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = FobjectId> + '_ {
        self.handles[..self.count].iter().copied()
    }

    /// RAM footprint of this table in bytes (spec §11 supplement).
    pub const fn ram_usage(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

impl<const N: usize> Default for Registry<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_and_order_match_insertions() {
        let mut r: Registry<4> = Registry::new();
        r.add_dict(FobjectId(1), FobjectKind::Container).unwrap();
        r.add_dict(FobjectId(2), FobjectKind::DataBus).unwrap();
        r.add_dict(FobjectId(3), FobjectKind::Function).unwrap();
        assert_eq!(r.count(), 3);
        assert_eq!(r.at(0), Some(FobjectId(1)));
        assert_eq!(r.at(1), Some(FobjectId(2)));
        assert_eq!(r.at(2), Some(FobjectId(3)));
        assert_eq!(r.kind_of(FobjectId(2)), Some(FobjectKind::DataBus));
        assert_eq!(r.kind_at(2), Some(FobjectKind::Function));
    }

    #[test]
    fn duplicate_is_idempotent() {
        let mut r: Registry<4> = Registry::new();
        r.add_dict(FobjectId(1), FobjectKind::Container).unwrap();
        assert_eq!(
            r.add_dict(FobjectId(1), FobjectKind::Container),
            Err(RegistryError::Duplicate)
        );
        assert_eq!(r.count(), 1);
    }

    #[test]
    fn null_handle_rejected() {
        let mut r: Registry<4> = Registry::new();
        assert_eq!(
            r.add_dict(FobjectId::NULL, FobjectKind::Container),
            Err(RegistryError::Null)
        );
    }

    #[test]
    fn full_table_rejected() {
        let mut r: Registry<2> = Registry::new();
        r.add_dict(FobjectId(1), FobjectKind::Container).unwrap();
        r.add_dict(FobjectId(2), FobjectKind::Container).unwrap();
        assert_eq!(
            r.add_dict(FobjectId(3), FobjectKind::Container),
            Err(RegistryError::Full)
        );
    }

    #[test]
    fn add_rejected_during_enumeration() {
        let mut r: Registry<4> = Registry::new();
        r.set_enum_in_progress(true);
        assert_eq!(
            r.add_dict(FobjectId(1), FobjectKind::Container),
            Err(RegistryError::UnexpectedDuringEnum)
        );
        r.set_enum_in_progress(false);
        assert!(r.add_dict(FobjectId(1), FobjectKind::Container).is_ok());
    }

    struct Point3;
    impl MemberEnumerator for Point3 {
        fn for_each_member(&self, visit: &mut dyn FnMut(crate::vartype::Member<'_>)) {
            visit(crate::vartype::Member::Struct(crate::vartype::StructMember {
                name: "x",
                type_handle: FobjectId(100),
                array_len: 1,
                is_ptr: false,
            }));
        }
    }

    #[test]
    fn children_enumerator_is_retrievable_by_index() {
        static POINT3: Point3 = Point3;
        let mut r: Registry<4> = Registry::new();
        r.add_dict(FobjectId(1), FobjectKind::VarTypeStructMember)
            .unwrap();
        assert!(r.children_at(0).is_none());
        r.set_children(FobjectId(1), &POINT3);
        assert!(r.children_at(0).is_some());
    }
}
