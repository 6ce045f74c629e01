//! # jitscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! jitscope library: the runtime model needed to describe loaded code, and the iterator
//! that enumerates it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all jitscope operations
pub use crate::Error;

/// The result type used throughout jitscope
pub use crate::Result;

/// Metadata token type for referencing definitions
pub use crate::metadata::token::Token;

// ================================================================================================
// Runtime Model
// ================================================================================================

/// Domains and assembly enumeration
pub use crate::runtime::{
    AppDomain, AppDomainRc, AssemblyIterationFlags, AssemblyLoadState, LoadContext, Runtime,
    SharedDomain,
};

/// Assemblies and the keep-alive guard
pub use crate::runtime::{Assembly, AssemblyRc, KeepAliveGuard};

/// Modules
pub use crate::runtime::{Module, ModuleIterationOption, ModuleLoadLevel, ModuleRc};

/// Types and methods
pub use crate::runtime::{
    MethodDesc, MethodDescRc, MethodTable, MethodTableRc, TypeDesc, TypeDescKind, TypeHandle,
};

/// Instantiation table entries
pub use crate::runtime::{MethodInstEntry, TypeInstEntry};

// ================================================================================================
// Iteration
// ================================================================================================

/// The loaded method traversal and its configuration
pub use crate::iterator::{
    IterationMode, IterationOptions, LoadedMethod, LoadedMethodIterator, RejectReason,
};
