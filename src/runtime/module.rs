//! Loaded modules.
//!
//! A [`Module`] is a single loaded image belonging to an
//! [`Assembly`](crate::runtime::Assembly). It owns the definitions declared in it
//! (indexed by metadata token) and the two generic instantiation tables the loader fills
//! while code runs.
//!
//! # Load Levels
//!
//! Modules move through [`ModuleLoadLevel::Loading`],
//! [`ModuleLoadLevel::ProfilerNotified`] and [`ModuleLoadLevel::Loaded`]. Which levels are
//! visible to an iteration is decided by [`ModuleIterationOption`].
//!
//! # Example
//!
//! ```rust
//! use jitscope::metadata::token::Token;
//! use jitscope::runtime::{Module, ModuleIterationOption, ModuleLoadLevel};
//!
//! let module = Module::new("App.dll");
//! let program = module.define_type(Token::type_def(2), "Program", 0)?;
//! let main = module.define_method(&program, Token::method_def(1), "Main", 0)?;
//! assert!(module.lookup_method_def(main.token).is_some());
//!
//! module.set_load_level(ModuleLoadLevel::ProfilerNotified);
//! assert!(!module.matches(ModuleIterationOption::IncludeLoaded));
//! assert!(module.matches(ModuleIterationOption::IncludeAvailableToProfilers));
//! # Ok::<(), jitscope::Error>(())
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc, OnceLock, Weak,
    },
};

use crossbeam_skiplist::SkipMap;
use strum::Display;

use crate::{
    metadata::token::Token,
    runtime::{
        assembly::{Assembly, AssemblyRc},
        method::{MethodDescRc, MethodTable, MethodTableRc},
        tables::{InstMethodTable, ParamTypeTable},
    },
    Error, Result,
};

/// A reference-counted pointer to a [`Module`]
pub type ModuleRc = Arc<Module>;
/// Map of `TypeDef` tokens to their canonical method tables
pub type TypeDefMap = SkipMap<Token, MethodTableRc>;
/// Map of `MethodDef` tokens to their canonical method descriptors
pub type MethodDefMap = SkipMap<Token, MethodDescRc>;

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a loaded module
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl ModuleId {
    /// Allocates a fresh identity
    #[must_use]
    pub fn next() -> Self {
        ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// How far the loader has progressed with a module
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display)]
#[repr(u8)]
pub enum ModuleLoadLevel {
    /// The loader is still working on the module
    Loading = 0,
    /// Instrumentation clients (profilers) have been told about the module
    ProfilerNotified = 1,
    /// Fully loaded
    Loaded = 2,
}

impl ModuleLoadLevel {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ModuleLoadLevel::Loading,
            1 => ModuleLoadLevel::ProfilerNotified,
            _ => ModuleLoadLevel::Loaded,
        }
    }
}

/// Which modules of an assembly a module enumeration yields
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum ModuleIterationOption {
    /// Only fully loaded modules
    #[default]
    IncludeLoaded,
    /// Every module, including ones still loading
    IncludeLoading,
    /// Loaded modules plus loading ones that profilers already know about
    IncludeAvailableToProfilers,
}

/// A loaded module.
pub struct Module {
    /// Unique identity of this module
    pub id: ModuleId,
    /// File name of the module
    pub name: String,
    resource: bool,
    level: AtomicU8,
    assembly: OnceLock<Weak<Assembly>>,
    type_defs: TypeDefMap,
    method_defs: MethodDefMap,
    param_types: ParamTypeTable,
    inst_methods: InstMethodTable,
}

impl Module {
    /// Creates a fully loaded, code-bearing module
    #[must_use]
    pub fn new(name: &str) -> ModuleRc {
        Self::build(name, false)
    }

    /// Creates a resource-only module, which carries no executable code
    #[must_use]
    pub fn new_resource(name: &str) -> ModuleRc {
        Self::build(name, true)
    }

    fn build(name: &str, resource: bool) -> ModuleRc {
        Arc::new(Module {
            id: ModuleId::next(),
            name: name.to_string(),
            resource,
            level: AtomicU8::new(ModuleLoadLevel::Loaded as u8),
            assembly: OnceLock::new(),
            type_defs: SkipMap::new(),
            method_defs: SkipMap::new(),
            param_types: ParamTypeTable::new(),
            inst_methods: InstMethodTable::new(),
        })
    }

    /// Returns true for resource-only modules
    #[must_use]
    pub fn is_resource(&self) -> bool {
        self.resource
    }

    /// Current load level
    #[must_use]
    pub fn load_level(&self) -> ModuleLoadLevel {
        ModuleLoadLevel::from_raw(self.level.load(Ordering::Acquire))
    }

    /// Updates the load level
    pub fn set_load_level(&self, level: ModuleLoadLevel) {
        self.level.store(level as u8, Ordering::Release);
    }

    /// Returns true once instrumentation clients have been notified about this module
    #[must_use]
    pub fn is_profiler_notified(&self) -> bool {
        self.load_level() >= ModuleLoadLevel::ProfilerNotified
    }

    /// Returns true if a module enumeration with `option` yields this module
    #[must_use]
    pub fn matches(&self, option: ModuleIterationOption) -> bool {
        match option {
            ModuleIterationOption::IncludeLoaded => self.load_level() == ModuleLoadLevel::Loaded,
            ModuleIterationOption::IncludeLoading => true,
            ModuleIterationOption::IncludeAvailableToProfilers => self.is_profiler_notified(),
        }
    }

    /// The assembly owning this module, while it is alive
    #[must_use]
    pub fn assembly(&self) -> Option<AssemblyRc> {
        self.assembly.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach(&self, assembly: &AssemblyRc) -> Result<()> {
        self.assembly
            .set(Arc::downgrade(assembly))
            .map_err(|_| Error::ModuleAlreadyAttached(self.name.clone()))
    }

    /// Defines a type in this module and returns its canonical method table.
    ///
    /// # Arguments
    ///
    /// * `token` - The `TypeDef` token of the type
    /// * `name` - Simple name of the type
    /// * `generic_arity` - Number of generic type parameters
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDefinition`] if `token` is already defined, or
    /// [`Error::Malformed`] if `token` is not a `TypeDef` token.
    pub fn define_type(
        &self,
        token: Token,
        name: &str,
        generic_arity: u32,
    ) -> Result<MethodTableRc> {
        if !token.is_type_def() {
            return Err(malformed_error!("{} is not a TypeDef token", token));
        }
        if self.type_defs.contains_key(&token) {
            return Err(Error::DuplicateDefinition(token));
        }

        let mt = MethodTable::new(token, self.id, name, generic_arity);
        self.type_defs.insert(token, mt.clone());
        Ok(mt)
    }

    /// Defines a method on `owner` and returns its canonical descriptor.
    ///
    /// Instantiations copy the slot layout present at the time they are created, so an
    /// instantiation of `owner` made before this call does not carry the new method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDefinition`] if `token` is already defined, or
    /// [`Error::Malformed`] if `token` is not a `MethodDef` token or `owner` belongs to a
    /// different module.
    pub fn define_method(
        &self,
        owner: &MethodTableRc,
        token: Token,
        name: &str,
        method_arity: u32,
    ) -> Result<MethodDescRc> {
        if !token.is_method_def() {
            return Err(malformed_error!("{} is not a MethodDef token", token));
        }
        if owner.module != self.id {
            return Err(malformed_error!(
                "{} is defined in {}, not in {}",
                owner,
                owner.module,
                self.name
            ));
        }
        if self.method_defs.contains_key(&token) {
            return Err(Error::DuplicateDefinition(token));
        }

        let method = owner.add_method(token, name, method_arity);
        self.method_defs.insert(token, method.clone());
        Ok(method)
    }

    /// Resolves a `MethodDef` token to its canonical descriptor
    #[must_use]
    pub fn lookup_method_def(&self, token: Token) -> Option<MethodDescRc> {
        self.method_defs.get(&token).map(|entry| entry.value().clone())
    }

    /// Resolves a `TypeDef` token to its canonical method table
    #[must_use]
    pub fn lookup_type_def(&self, token: Token) -> Option<MethodTableRc> {
        self.type_defs.get(&token).map(|entry| entry.value().clone())
    }

    /// Generic type instantiations loaded by this module
    #[must_use]
    pub fn param_types(&self) -> &ParamTypeTable {
        &self.param_types
    }

    /// Generic method instantiations loaded by this module
    #[must_use]
    pub fn inst_methods(&self) -> &InstMethodTable {
        &self.inst_methods
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("resource", &self.resource)
            .field("level", &self.load_level())
            .finish()
    }
}
