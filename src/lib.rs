// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # jitscope
//!
//! Enumerates every loaded shape of a .NET method inside a managed runtime: the canonical
//! definition of a non-generic method, or each restored instantiation of a generic one,
//! over its declaring type's type arguments, its own type arguments, or both.
//!
//! Profilers, debuggers and other diagnostics use this to answer "which compiled forms of
//! method M exist right now" without knowing how generic instantiations are stored, how
//! assemblies are shared between domains, or which entries are still being restored.
//!
//! ## Features
//!
//! - **Cascading traversal** - assemblies, modules, type instantiations and method
//!   instantiations, resumable call by call
//! - **Entry filtering** - placeholders, unresolved fixups, non-class types, unrestored
//!   handles and foreign instantiations are never reported
//! - **Keep-alive discipline** - collectible assemblies stay loaded while one of their
//!   methods is current
//! - **Concurrent model** - instantiation tables can be appended to while iterating
//!
//! ## Quick Start
//!
//! ```rust
//! use jitscope::prelude::*;
//!
//! let runtime = Runtime::new();
//! let domain = runtime.create_domain("Default");
//!
//! let assembly = Assembly::new("App");
//! let module = Module::new("App.dll");
//! assembly.add_module(module.clone())?;
//! domain.load(assembly, LoadContext::Execution);
//!
//! let program = module.define_type(Token::type_def(2), "Program", 0)?;
//! let main = module.define_method(&program, Token::new(0x0600_0010), "Main", 0)?;
//!
//! let options = IterationOptions::unshared();
//! let mut iter = LoadedMethodIterator::start(&domain, &module, main.token, options)?;
//! let mut holder = KeepAliveGuard::default();
//! assert!(iter.advance(&mut holder));
//! assert_eq!(iter.current().name, "Main");
//! assert!(!iter.advance(&mut holder));
//! # Ok::<(), jitscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`runtime`] - domains, assemblies, modules, types, methods and instantiation tables
//! - [`iterator`] - the traversal, its cursors, configuration and entry filter
//! - [`metadata`] - metadata tokens
//! - [`prelude`] - convenient re-exports
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events: `debug` when a traversal
//! starts, `trace` for every assembly and module entered and every rejected table entry.
//! No subscriber is installed.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use jitscope::prelude::*;
///
/// let runtime = Runtime::new();
/// let domain = runtime.create_domain("Default");
/// assert_eq!(domain.assembly_count(), 0);
/// ```
pub mod prelude;

/// Metadata tokens identifying type and method definitions
pub mod metadata;

/// The loader state a traversal reads: domains, assemblies, modules and instantiations
pub mod runtime;

/// Enumeration of loaded methods
pub mod iterator;

/// `jitscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `jitscope` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use jitscope::{Error, runtime::Assembly, runtime::Runtime};
///
/// let runtime = Runtime::new();
/// match runtime.load_domain_neutral(Assembly::new("App")) {
///     Err(Error::NotDomainNeutral(name)) => println!("{} is per-domain", name),
///     Err(e) => println!("Error: {}", e),
///     Ok(()) => {}
/// }
/// ```
pub use error::Error;
