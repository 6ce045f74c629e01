//! Execution domains and assembly enumeration.
//!
//! A [`Runtime`] owns exactly one [`SharedDomain`] holding every domain-neutral assembly,
//! plus any number of isolated [`AppDomain`]s. Each app domain records the assemblies
//! loaded into it together with their load state and binding context; domain-neutral
//! assemblies show up both in the shared domain and in every app domain that uses them.
//!
//! # Enumeration
//!
//! [`AppDomain::iterate_assemblies`] yields the assemblies whose state matches a set of
//! [`AssemblyIterationFlags`], in load order. [`SharedDomain::iterate_assemblies`] yields
//! every shared assembly and takes no flags.
//!
//! # Example
//!
//! ```rust
//! use jitscope::runtime::{
//!     Assembly, AssemblyIterationFlags, AssemblyLoadState, LoadContext, Runtime,
//! };
//!
//! let runtime = Runtime::new();
//! let domain = runtime.create_domain("Default");
//!
//! let app = Assembly::new("App");
//! let helper = Assembly::new("Helper");
//! domain.load(app.clone(), LoadContext::Execution);
//! domain.load_with_state(helper, LoadContext::Execution, AssemblyLoadState::Loading);
//!
//! let names: Vec<_> = domain
//!     .iterate_assemblies(AssemblyIterationFlags::default())
//!     .map(|assembly| assembly.name.clone())
//!     .collect();
//! assert_eq!(names, ["App"]);
//!
//! let loading = AssemblyIterationFlags::default() | AssemblyIterationFlags::INCLUDE_LOADING;
//! let all = domain.iterate_assemblies(loading).count();
//! assert_eq!(all, 2);
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, AtomicU8, Ordering},
        Arc, Weak,
    },
};

use bitflags::bitflags;
use dashmap::{mapref::entry::Entry, DashMap};
use strum::Display;

use crate::{
    runtime::assembly::{Assembly, AssemblyId, AssemblyRc},
    Error, Result,
};

/// A reference-counted pointer to an [`AppDomain`]
pub type AppDomainRc = Arc<AppDomain>;
/// A reference-counted pointer to the [`SharedDomain`]
pub type SharedDomainRc = Arc<SharedDomain>;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// Filter applied by [`AppDomain::iterate_assemblies`]
    pub struct AssemblyIterationFlags: u32 {
        /// Fully loaded assemblies
        const INCLUDE_LOADED = 0x01;
        /// Assemblies still being loaded
        const INCLUDE_LOADING = 0x02;
        /// Loading assemblies that profilers have already been told about
        const INCLUDE_AVAILABLE_TO_PROFILERS = 0x04;
        /// Assemblies whose load failed
        const INCLUDE_FAILED_TO_LOAD = 0x08;
        /// Assemblies loaded for inspection only
        const INCLUDE_INTROSPECTION = 0x10;
        /// Assemblies loaded for execution
        const INCLUDE_EXECUTION = 0x20;
        /// Skip collectible assemblies
        const EXCLUDE_COLLECTIBLE = 0x40;
    }
}

impl Default for AssemblyIterationFlags {
    fn default() -> Self {
        AssemblyIterationFlags::INCLUDE_LOADED | AssemblyIterationFlags::INCLUDE_EXECUTION
    }
}

/// Load state of an assembly within one domain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum AssemblyLoadState {
    /// The loader is still working on the assembly
    Loading = 0,
    /// Still loading, but already announced to profilers
    ProfilerNotified = 1,
    /// Fully loaded
    Loaded = 2,
    /// The load failed
    Failed = 3,
}

impl AssemblyLoadState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => AssemblyLoadState::Loading,
            1 => AssemblyLoadState::ProfilerNotified,
            2 => AssemblyLoadState::Loaded,
            _ => AssemblyLoadState::Failed,
        }
    }
}

/// Binding context an assembly was loaded into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum LoadContext {
    /// Loaded to run code
    Execution,
    /// Loaded for reflection-only inspection
    Introspection,
}

enum AssemblyLink {
    Strong(AssemblyRc),
    Weak(Weak<Assembly>),
}

/// An assembly as loaded into one [`AppDomain`]
pub struct DomainAssembly {
    link: AssemblyLink,
    context: LoadContext,
    state: AtomicU8,
}

impl DomainAssembly {
    fn new(assembly: AssemblyRc, context: LoadContext, state: AssemblyLoadState) -> Self {
        let link = if assembly.is_collectible() {
            AssemblyLink::Weak(Arc::downgrade(&assembly))
        } else {
            AssemblyLink::Strong(assembly)
        };

        DomainAssembly {
            link,
            context,
            state: AtomicU8::new(state as u8),
        }
    }

    /// The assembly, unless it was collectible and has been collected
    #[must_use]
    pub fn assembly(&self) -> Option<AssemblyRc> {
        match &self.link {
            AssemblyLink::Strong(assembly) => Some(assembly.clone()),
            AssemblyLink::Weak(assembly) => assembly.upgrade(),
        }
    }

    /// Current load state
    #[must_use]
    pub fn state(&self) -> AssemblyLoadState {
        AssemblyLoadState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Binding context
    #[must_use]
    pub fn context(&self) -> LoadContext {
        self.context
    }

    /// Returns true if state and context pass `flags`. Collectibility is checked by the
    /// enumerator, which needs the assembly alive anyway.
    #[must_use]
    pub fn matches(&self, flags: AssemblyIterationFlags) -> bool {
        let state_ok = match self.state() {
            AssemblyLoadState::Loaded => flags.contains(AssemblyIterationFlags::INCLUDE_LOADED),
            AssemblyLoadState::Loading => flags.contains(AssemblyIterationFlags::INCLUDE_LOADING),
            AssemblyLoadState::ProfilerNotified => flags.intersects(
                AssemblyIterationFlags::INCLUDE_LOADING
                    | AssemblyIterationFlags::INCLUDE_AVAILABLE_TO_PROFILERS,
            ),
            AssemblyLoadState::Failed => {
                flags.contains(AssemblyIterationFlags::INCLUDE_FAILED_TO_LOAD)
            }
        };

        let context_ok = match self.context {
            LoadContext::Execution => flags.contains(AssemblyIterationFlags::INCLUDE_EXECUTION),
            LoadContext::Introspection => {
                flags.contains(AssemblyIterationFlags::INCLUDE_INTROSPECTION)
            }
        };

        state_ok && context_ok
    }
}

static NEXT_DOMAIN_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of an [`AppDomain`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainId(pub u32);

/// An isolated execution domain.
pub struct AppDomain {
    /// Identity of the domain
    pub id: DomainId,
    /// Friendly name of the domain
    pub name: String,
    shared: SharedDomainRc,
    assemblies: boxcar::Vec<DomainAssembly>,
    loaded: DashMap<AssemblyId, usize>,
}

impl AppDomain {
    /// Creates a domain attached to `shared`. Prefer [`Runtime::create_domain`].
    #[must_use]
    pub fn new(name: &str, shared: SharedDomainRc) -> AppDomainRc {
        Arc::new(AppDomain {
            id: DomainId(NEXT_DOMAIN_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            shared,
            assemblies: boxcar::Vec::new(),
            loaded: DashMap::new(),
        })
    }

    /// The shared domain visible from this domain
    #[must_use]
    pub fn shared_domain(&self) -> &SharedDomain {
        &self.shared
    }

    /// Records `assembly` as fully loaded into this domain.
    ///
    /// Collectible assemblies are referenced weakly; keep the passed `AssemblyRc` (or a
    /// clone) alive for as long as the assembly should stay loaded.
    ///
    /// Returns `false` and leaves the existing record untouched if the assembly is
    /// already loaded into this domain.
    pub fn load(&self, assembly: AssemblyRc, context: LoadContext) -> bool {
        self.load_with_state(assembly, context, AssemblyLoadState::Loaded)
    }

    /// Records `assembly` with an explicit initial load state, see [`AppDomain::load`]
    pub fn load_with_state(
        &self,
        assembly: AssemblyRc,
        context: LoadContext,
        state: AssemblyLoadState,
    ) -> bool {
        match self.loaded.entry(assembly.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                let index = self
                    .assemblies
                    .push(DomainAssembly::new(assembly, context, state));
                vacant.insert(index);
                true
            }
        }
    }

    /// Moves `assembly` to a new load state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssemblyNotLoaded`] if the assembly was never loaded into this
    /// domain.
    pub fn set_load_state(&self, assembly: &AssemblyRc, state: AssemblyLoadState) -> Result<()> {
        let entry = self
            .loaded
            .get(&assembly.id)
            .and_then(|index| self.assemblies.get(*index))
            .ok_or_else(|| Error::AssemblyNotLoaded(assembly.name.clone()))?;

        entry.state.store(state as u8, Ordering::Release);
        Ok(())
    }

    /// Number of assemblies ever loaded into this domain, collected ones included
    #[must_use]
    pub fn assembly_count(&self) -> usize {
        self.assemblies.count()
    }

    /// Enumerates assemblies matching `flags`, in load order.
    ///
    /// Collected assemblies are skipped, as are collectible ones when `flags` contains
    /// [`AssemblyIterationFlags::EXCLUDE_COLLECTIBLE`].
    #[must_use]
    pub fn iterate_assemblies(&self, flags: AssemblyIterationFlags) -> DomainAssemblyIter<'_> {
        DomainAssemblyIter {
            domain: self,
            flags,
            position: 0,
        }
    }
}

impl fmt::Debug for AppDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDomain")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("assemblies", &self.assemblies.count())
            .finish()
    }
}

/// Enumerator over the assemblies of an [`AppDomain`]
pub struct DomainAssemblyIter<'a> {
    domain: &'a AppDomain,
    flags: AssemblyIterationFlags,
    position: usize,
}

impl DomainAssemblyIter<'_> {
    /// Restarts the enumeration at the first assembly
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl Iterator for DomainAssemblyIter<'_> {
    type Item = AssemblyRc;

    fn next(&mut self) -> Option<AssemblyRc> {
        while self.position < self.domain.assemblies.count() {
            let index = self.position;
            self.position += 1;

            let Some(entry) = self.domain.assemblies.get(index) else {
                continue;
            };
            if !entry.matches(self.flags) {
                continue;
            }
            let Some(assembly) = entry.assembly() else {
                continue;
            };
            if assembly.is_collectible()
                && self
                    .flags
                    .contains(AssemblyIterationFlags::EXCLUDE_COLLECTIBLE)
            {
                continue;
            }
            return Some(assembly);
        }
        None
    }
}

/// The domain holding every domain-neutral assembly.
pub struct SharedDomain {
    assemblies: boxcar::Vec<AssemblyRc>,
    registered: DashMap<AssemblyId, usize>,
}

impl SharedDomain {
    /// Creates an empty shared domain
    #[must_use]
    pub fn new() -> SharedDomainRc {
        Arc::new(SharedDomain {
            assemblies: boxcar::Vec::new(),
            registered: DashMap::new(),
        })
    }

    /// Registers a domain-neutral assembly. Registering it again has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotDomainNeutral`] for per-domain and collectible assemblies.
    pub fn add(&self, assembly: AssemblyRc) -> Result<()> {
        if !assembly.is_domain_neutral() {
            return Err(Error::NotDomainNeutral(assembly.name.clone()));
        }
        if let Entry::Vacant(vacant) = self.registered.entry(assembly.id) {
            vacant.insert(self.assemblies.push(assembly));
        }
        Ok(())
    }

    /// Enumerates every shared assembly, in registration order
    #[must_use]
    pub fn iterate_assemblies(&self) -> SharedAssemblyIter<'_> {
        SharedAssemblyIter {
            domain: self,
            position: 0,
        }
    }
}

impl fmt::Debug for SharedDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDomain")
            .field("assemblies", &self.assemblies.count())
            .finish()
    }
}

/// Enumerator over the assemblies of the [`SharedDomain`]
pub struct SharedAssemblyIter<'a> {
    domain: &'a SharedDomain,
    position: usize,
}

impl SharedAssemblyIter<'_> {
    /// Restarts the enumeration at the first assembly
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl Iterator for SharedAssemblyIter<'_> {
    type Item = AssemblyRc;

    fn next(&mut self) -> Option<AssemblyRc> {
        while self.position < self.domain.assemblies.count() {
            let index = self.position;
            self.position += 1;
            if let Some(assembly) = self.domain.assemblies.get(index) {
                return Some(assembly.clone());
            }
        }
        None
    }
}

/// Root of the runtime model: the shared domain plus every app domain.
#[derive(Debug)]
pub struct Runtime {
    shared: SharedDomainRc,
    domains: DashMap<DomainId, AppDomainRc>,
}

impl Runtime {
    /// Creates a runtime with an empty shared domain and no app domains
    #[must_use]
    pub fn new() -> Self {
        Runtime {
            shared: SharedDomain::new(),
            domains: DashMap::new(),
        }
    }

    /// The shared domain
    #[must_use]
    pub fn shared_domain(&self) -> &SharedDomainRc {
        &self.shared
    }

    /// Registers a domain-neutral assembly with the shared domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotDomainNeutral`] for per-domain and collectible assemblies.
    pub fn load_domain_neutral(&self, assembly: AssemblyRc) -> Result<()> {
        self.shared.add(assembly)
    }

    /// Creates and registers a new app domain
    pub fn create_domain(&self, name: &str) -> AppDomainRc {
        let domain = AppDomain::new(name, self.shared.clone());
        self.domains.insert(domain.id, domain.clone());
        domain
    }

    /// Looks up an app domain
    #[must_use]
    pub fn domain(&self, id: DomainId) -> Option<AppDomainRc> {
        self.domains.get(&id).map(|entry| entry.value().clone())
    }

    /// Unregisters an app domain. Existing references stay valid.
    pub fn unload_domain(&self, id: DomainId) -> Option<AppDomainRc> {
        self.domains.remove(&id).map(|(_, domain)| domain)
    }

    /// All registered app domains, ordered by id
    #[must_use]
    pub fn domains(&self) -> Vec<AppDomainRc> {
        let mut domains: Vec<AppDomainRc> = self
            .domains
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        domains.sort_by_key(|domain| domain.id);
        domains
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
