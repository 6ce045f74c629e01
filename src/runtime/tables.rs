//! Per-module generic instantiation tables.
//!
//! Every module owns two append-only tables: one listing the generic *type*
//! instantiations it has loaded (`List<int>`, `Dictionary<string, Foo>`) and one listing
//! generic *method* instantiations (`Enumerable.Select<int, string>`). An instantiation is
//! stored in the table of the module that loaded it, which is frequently not the module
//! that defines the generic type or method.
//!
//! # Entry Lifecycle
//!
//! Loaders insert entries incrementally while other threads may already be iterating the
//! table. A slot is therefore a tagged value rather than a bare handle:
//!
//! ```text
//! Pending --> Fixup(rva) --> Loaded(handle, unrestored) --> Loaded(handle, restored)
//!    \___________________________/^
//! ```
//!
//! - [`TypeInstEntry::Pending`] / [`MethodInstEntry::Pending`] - slot reserved, nothing
//!   published yet
//! - [`TypeInstEntry::Fixup`] - an ahead-of-time image references the type through an
//!   encoded fixup that has not been resolved
//! - `Loaded` - a handle is published; restoration state lives on the handle itself
//!
//! Slots only ever move forward through these states via [`InstantiationTable::publish`].
//!
//! # Uniqueness
//!
//! A table is keyed by instantiation. Two `Loaded` entries share a key when they
//! instantiate the same definition with identical argument handles (and, for methods, the
//! same owning type). The table holds at most one slot per key: inserting a known
//! instantiation returns the existing slot, and publishing it into a second slot fails.
//! Reserved slots and fixups carry no key.

use std::{
    hash::{Hash, Hasher},
    sync::{Arc, RwLock},
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    metadata::token::Token,
    runtime::{
        method::{MethodDescRc, TypeHandle},
        module::ModuleId,
    },
    Error, Result,
};

/// A slot in a module's generic type instantiation table
#[derive(Clone, Debug)]
pub enum TypeInstEntry {
    /// Slot reserved by a loader, no type published yet
    Pending,
    /// Encoded fixup (image RVA) awaiting resolution
    Fixup(u32),
    /// A published type handle
    Loaded(TypeHandle),
}

/// A slot in a module's generic method instantiation table
#[derive(Clone, Debug)]
pub enum MethodInstEntry {
    /// Slot reserved by a loader, no method published yet
    Pending,
    /// A published method
    Loaded(MethodDescRc),
}

/// A type handle compared by the descriptor it points to
#[derive(Clone, Debug)]
struct HandleKey(TypeHandle);

impl HandleKey {
    fn addr(&self) -> *const () {
        match &self.0 {
            TypeHandle::Class(mt) => Arc::as_ptr(mt).cast(),
            TypeHandle::Desc(desc) => Arc::as_ptr(desc).cast(),
        }
    }
}

impl PartialEq for HandleKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for HandleKey {}

impl Hash for HandleKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum KeyKind {
    Type {
        module: ModuleId,
        token: Token,
        args: Vec<HandleKey>,
    },
    Desc(HandleKey),
    Method {
        module: ModuleId,
        token: Token,
        owner: HandleKey,
        args: Vec<HandleKey>,
    },
}

/// Identity of a published instantiation within one table.
///
/// Keys hold the handles they were built from, so a key never outlives the descriptors
/// it compares.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstantiationKey(KeyKind);

fn arg_keys(args: &[TypeHandle]) -> Vec<HandleKey> {
    args.iter().cloned().map(HandleKey).collect()
}

/// An entry that can be stored in an [`InstantiationTable`]
pub trait TableEntry: Clone {
    /// The instantiation this entry publishes, or `None` for slots that publish nothing
    fn key(&self) -> Option<InstantiationKey>;
}

impl TableEntry for TypeInstEntry {
    fn key(&self) -> Option<InstantiationKey> {
        let TypeInstEntry::Loaded(handle) = self else {
            return None;
        };
        let kind = match handle {
            TypeHandle::Class(mt) => KeyKind::Type {
                module: mt.module,
                token: mt.token,
                args: arg_keys(&mt.type_args),
            },
            TypeHandle::Desc(_) => KeyKind::Desc(HandleKey(handle.clone())),
        };
        Some(InstantiationKey(kind))
    }
}

impl TableEntry for MethodInstEntry {
    fn key(&self) -> Option<InstantiationKey> {
        let MethodInstEntry::Loaded(method) = self else {
            return None;
        };
        // An instantiation whose owner is gone can no longer be matched by anyone
        let owner = method.owner()?;
        Some(InstantiationKey(KeyKind::Method {
            module: method.module,
            token: method.token,
            owner: HandleKey(owner.into()),
            args: arg_keys(&method.method_args),
        }))
    }
}

/// An append-only table of instantiation entries.
///
/// Indices are stable: the entry inserted first is always at index 0, which gives every
/// cursor over the table a deterministic order for a fixed set of entries.
pub struct InstantiationTable<E> {
    entries: boxcar::Vec<RwLock<E>>,
    index: DashMap<InstantiationKey, usize>,
}

/// Type instantiation table of a module
pub type ParamTypeTable = InstantiationTable<TypeInstEntry>;
/// Method instantiation table of a module
pub type InstMethodTable = InstantiationTable<MethodInstEntry>;

impl<E: TableEntry> InstantiationTable<E> {
    /// Creates an empty table
    #[must_use]
    pub fn new() -> Self {
        InstantiationTable {
            entries: boxcar::Vec::new(),
            index: DashMap::new(),
        }
    }

    /// Appends an entry and returns its index.
    ///
    /// If the entry publishes an instantiation the table already holds, nothing is
    /// appended and the index of the existing slot is returned.
    pub fn insert(&self, entry: E) -> usize {
        let Some(key) = entry.key() else {
            return self.entries.push(RwLock::new(entry));
        };

        match self.index.entry(key) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(vacant) => {
                let index = self.entries.push(RwLock::new(entry));
                vacant.insert(index);
                index
            }
        }
    }

    /// Replaces the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if no entry exists at `index`, or
    /// [`Error::DuplicateInstantiation`] if the instantiation is already published in a
    /// different slot.
    pub fn publish(&self, index: usize, entry: E) -> Result<()> {
        let slot = self.entries.get(index).ok_or(Error::OutOfBounds)?;
        let key = entry.key();

        if let Some(key) = &key {
            match self.index.entry(key.clone()) {
                Entry::Occupied(existing) if *existing.get() != index => {
                    return Err(Error::DuplicateInstantiation(*existing.get()));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(vacant) => {
                    vacant.insert(index);
                }
            }
        }

        let previous = std::mem::replace(&mut *write_lock!(slot), entry).key();
        if let Some(previous) = previous.filter(|previous| key.as_ref() != Some(previous)) {
            self.index.remove_if(&previous, |_, &owner| owner == index);
        }
        Ok(())
    }

    /// Returns a copy of the entry at `index`.
    ///
    /// A slot that has been reserved by a concurrent `insert` but not yet written reads
    /// as `None`, exactly like an index past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<E> {
        self.entries.get(index).map(|slot| read_lock!(slot).clone())
    }

    /// Returns the index of the slot publishing the same instantiation as `entry`
    #[must_use]
    pub fn position(&self, entry: &E) -> Option<usize> {
        let key = entry.key()?;
        self.index.get(&key).map(|index| *index)
    }

    /// Number of entries in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if the table holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InstantiationTable<TypeInstEntry> {
    /// Reserves a slot that is filled in later through [`InstantiationTable::publish`]
    pub fn reserve(&self) -> usize {
        self.insert(TypeInstEntry::Pending)
    }
}

impl InstantiationTable<MethodInstEntry> {
    /// Reserves a slot that is filled in later through [`InstantiationTable::publish`]
    pub fn reserve(&self) -> usize {
        self.insert(MethodInstEntry::Pending)
    }
}

impl<E: TableEntry> Default for InstantiationTable<E> {
    fn default() -> Self {
        Self::new()
    }
}
