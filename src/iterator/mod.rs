//! Enumeration of every loaded form of a method definition.
//!
//! The entry point is [`LoadedMethodIterator`]: given a method definition, it visits the
//! canonical definition or, for generic methods, every restored instantiation recorded in
//! the modules of a configurable set of assemblies.
//!
//! # Components
//!
//! - [`LoadedMethodIterator`] - the cascading assembly → module → type → method traversal
//! - [`IterationOptions`] - which assemblies and modules are in scope
//! - [`EntryFilter`] - decides whether a raw instantiation table entry is usable
//! - [`AssemblyCursor`], [`ModuleCursor`], [`TypeInstantiationCursor`],
//!   [`MethodInstantiationCursor`] - the restartable levels of the traversal
//!
//! # Thread Safety
//!
//! An iterator is driven by one thread at a time. The runtime structures it reads may be
//! modified concurrently; each call observes whatever entries are published at that point.

mod config;
mod cursor;
mod filter;
mod loaded;

pub use config::{IterationMode, IterationOptions};
pub use cursor::{
    AssemblyCursor, MethodInstantiationCursor, ModuleCursor, TypeInstantiationCursor,
};
pub use filter::{EntryFilter, FilterOutcome, RejectReason};
pub use loaded::{IteratorState, Level, LoadedMethod, LoadedMethodIterator, LoadedMethods};
