//! Classification of raw instantiation table entries.
//!
//! Instantiation tables are filled while code is being loaded and compiled, so at any
//! point they legitimately contain entries that must not be handed out: reserved slots,
//! unresolved ahead-of-time fixups, non-class types, descriptors still awaiting
//! restoration, and instantiations of unrelated definitions. [`EntryFilter`] decides, for
//! a single entry and a single target method, whether the entry is usable.
//!
//! Checks run in a fixed order and the tag of an entry is always inspected before any
//! handle it carries:
//!
//! | Order | Rejection | Applies to |
//! |-------|-----------|------------|
//! | 1 | [`RejectReason::Placeholder`] | types, methods |
//! | 2 | [`RejectReason::UnresolvedFixup`] | types |
//! | 3 | [`RejectReason::NonClassDescriptor`] | types |
//! | 4 | [`RejectReason::Unrestored`] | types, methods |
//! | 5 | [`RejectReason::IdentityMismatch`] | types, methods |

use strum::{Display, EnumIter};

use crate::runtime::{
    MethodDesc, MethodDescRc, MethodInstEntry, MethodTableRc, TypeHandle, TypeInstEntry,
};

/// Why an instantiation table entry was skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum RejectReason {
    /// The slot is reserved but nothing has been published
    Placeholder,
    /// The entry is an encoded fixup that has not been resolved
    UnresolvedFixup,
    /// The entry is a type descriptor without a method table
    NonClassDescriptor,
    /// The handle has not been restored yet
    Unrestored,
    /// The handle instantiates a different definition
    IdentityMismatch,
}

/// Result of classifying one entry
#[derive(Clone, Debug)]
pub enum FilterOutcome<T> {
    /// The entry is usable and yields this handle
    Accept(T),
    /// The entry must be skipped
    Reject(RejectReason),
}

impl<T> FilterOutcome<T> {
    /// Returns the accepted handle, if any
    #[must_use]
    pub fn accepted(self) -> Option<T> {
        match self {
            FilterOutcome::Accept(handle) => Some(handle),
            FilterOutcome::Reject(_) => None,
        }
    }

    /// Returns the rejection reason, if any
    #[must_use]
    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            FilterOutcome::Accept(_) => None,
            FilterOutcome::Reject(reason) => Some(*reason),
        }
    }
}

/// Stateless predicates over instantiation table entries.
pub struct EntryFilter;

impl EntryFilter {
    /// Classifies a type instantiation entry against the owning type of `target`.
    ///
    /// An entry is accepted if it is a restored method table carrying the `TypeDef` token
    /// and defining module of `target`'s declaring type. Unless `target` declares generic
    /// parameters of its own, the instantiation must also have `target` laid out in its
    /// slot, since that copy is what a traversal reports.
    #[must_use]
    pub fn type_entry(entry: &TypeInstEntry, target: &MethodDesc) -> FilterOutcome<MethodTableRc> {
        let handle = match entry {
            TypeInstEntry::Pending => return FilterOutcome::Reject(RejectReason::Placeholder),
            TypeInstEntry::Fixup(_) => {
                return FilterOutcome::Reject(RejectReason::UnresolvedFixup)
            }
            TypeInstEntry::Loaded(handle) => handle,
        };

        let mt = match handle {
            TypeHandle::Desc(_) => {
                return FilterOutcome::Reject(RejectReason::NonClassDescriptor)
            }
            TypeHandle::Class(mt) => mt,
        };

        if !mt.is_restored() {
            return FilterOutcome::Reject(RejectReason::Unrestored);
        }
        if mt.token != target.owner_token || mt.module != target.module {
            return FilterOutcome::Reject(RejectReason::IdentityMismatch);
        }
        if !target.has_method_instantiation()
            && !mt
                .method_for_slot(target.slot)
                .is_some_and(|method| method.token == target.token)
        {
            return FilterOutcome::Reject(RejectReason::IdentityMismatch);
        }

        FilterOutcome::Accept(mt.clone())
    }

    /// Classifies a method instantiation entry against `target`.
    ///
    /// An entry is accepted if it is a restored method carrying the `MethodDef` token and
    /// defining module of `target`. When `owner` is given (the target is generic over both
    /// its type and its own parameters), the method must also belong to exactly that type
    /// instantiation.
    #[must_use]
    pub fn method_entry(
        entry: &MethodInstEntry,
        target: &MethodDesc,
        owner: Option<&MethodTableRc>,
    ) -> FilterOutcome<MethodDescRc> {
        let method = match entry {
            MethodInstEntry::Pending => return FilterOutcome::Reject(RejectReason::Placeholder),
            MethodInstEntry::Loaded(method) => method,
        };

        if !method.is_restored() {
            return FilterOutcome::Reject(RejectReason::Unrestored);
        }
        if method.module != target.module || method.token != target.token {
            return FilterOutcome::Reject(RejectReason::IdentityMismatch);
        }
        if owner.is_some_and(|owner| !method.is_owned_by(owner)) {
            return FilterOutcome::Reject(RejectReason::IdentityMismatch);
        }

        FilterOutcome::Accept(method.clone())
    }
}
