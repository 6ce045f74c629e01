//! In-memory model of the loader state a traversal queries.
//!
//! This module provides the collaborators the
//! [`LoadedMethodIterator`](crate::iterator::LoadedMethodIterator) reads from: domains,
//! assemblies, modules, type and method descriptors, and the per-module generic
//! instantiation tables. Populating these structures is the job of whatever hosts the
//! runtime (a loader, a profiler attaching to a process snapshot, a test); the iterator
//! only ever reads them.
//!
//! # Architecture
//!
//! ```text
//! Runtime
//!  ├── SharedDomain ──> [Assembly (domain-neutral)]
//!  └── AppDomain    ──> [DomainAssembly] ──> Assembly
//!                                              └── [Module]
//!                                                    ├── TypeDefs / MethodDefs
//!                                                    ├── ParamTypeTable  (type instantiations)
//!                                                    └── InstMethodTable (method instantiations)
//! ```
//!
//! # Thread Safety
//!
//! All types here are `Send + Sync`. Tables are append-only and hold each instantiation
//! at most once. Slots are updated in place, so loader threads can keep publishing entries
//! while iterators are reading.
//!
//! # Example
//!
//! ```rust
//! use jitscope::metadata::token::Token;
//! use jitscope::runtime::{Assembly, LoadContext, Module, Runtime, TypeInstEntry};
//!
//! let runtime = Runtime::new();
//! let domain = runtime.create_domain("Default");
//!
//! let assembly = Assembly::new("App");
//! let module = Module::new("App.dll");
//! assembly.add_module(module.clone())?;
//! domain.load(assembly, LoadContext::Execution);
//!
//! let boxed = module.define_type(Token::type_def(2), "Box", 1)?;
//! let int = module.define_type(Token::type_def(3), "Int32", 0)?;
//! module
//!     .param_types()
//!     .insert(TypeInstEntry::Loaded(boxed.instantiate(vec![int.into()]).into()));
//! # Ok::<(), jitscope::Error>(())
//! ```

mod assembly;
mod domain;
mod method;
mod module;
mod tables;

pub use assembly::{Assembly, AssemblyId, AssemblyRc, KeepAliveGuard};
pub use domain::{
    AppDomain, AppDomainRc, AssemblyIterationFlags, AssemblyLoadState, DomainAssembly,
    DomainAssemblyIter, DomainId, LoadContext, Runtime, SharedAssemblyIter, SharedDomain,
    SharedDomainRc,
};
pub use method::{
    MethodDesc, MethodDescRc, MethodTable, MethodTableRc, TypeDesc, TypeDescKind, TypeDescRc,
    TypeHandle,
};
pub use module::{
    MethodDefMap, Module, ModuleId, ModuleIterationOption, ModuleLoadLevel, ModuleRc, TypeDefMap,
};
pub use tables::{
    InstMethodTable, InstantiationKey, InstantiationTable, MethodInstEntry, ParamTypeTable,
    TableEntry, TypeInstEntry,
};
