//! Loaded assemblies and the keep-alive guard protecting collectible ones.
//!
//! An [`Assembly`] owns its modules. It is either domain-neutral (loaded once into the
//! [`SharedDomain`](crate::runtime::SharedDomain) and visible from every domain),
//! per-domain, or collectible.
//!
//! # Collectible Assemblies
//!
//! A collectible assembly is only referenced *weakly* by the domains it is loaded into.
//! The [`AssemblyRc`] the host created it with acts as its collection root: once every
//! strong reference is gone, the assembly is deallocated and disappears from domain
//! enumerations. Code that needs a collectible assembly to stay alive across calls holds
//! a [`KeepAliveGuard`].
//!
//! ```rust
//! use jitscope::runtime::Assembly;
//!
//! let plugin = Assembly::new_collectible("Plugin");
//! let guard = plugin.acquire_keep_alive();
//! let weak = std::sync::Arc::downgrade(&plugin);
//!
//! drop(plugin);
//! assert!(weak.upgrade().is_some());
//!
//! drop(guard);
//! assert!(weak.upgrade().is_none());
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use crate::{runtime::module::ModuleRc, Result};

/// A reference-counted pointer to an [`Assembly`]
pub type AssemblyRc = Arc<Assembly>;

static NEXT_ASSEMBLY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of an [`Assembly`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssemblyId(u64);

/// A loaded assembly.
pub struct Assembly {
    /// Identity of the assembly
    pub id: AssemblyId,
    /// Simple name of the assembly
    pub name: String,
    domain_neutral: bool,
    collectible: bool,
    modules: boxcar::Vec<ModuleRc>,
    keep_alive_acquisitions: AtomicUsize,
}

impl Assembly {
    /// Creates a per-domain assembly
    #[must_use]
    pub fn new(name: &str) -> AssemblyRc {
        Self::build(name, false, false)
    }

    /// Creates a domain-neutral assembly, shared by every domain
    #[must_use]
    pub fn new_domain_neutral(name: &str) -> AssemblyRc {
        Self::build(name, true, false)
    }

    /// Creates a collectible assembly. The returned reference is its collection root.
    #[must_use]
    pub fn new_collectible(name: &str) -> AssemblyRc {
        Self::build(name, false, true)
    }

    fn build(name: &str, domain_neutral: bool, collectible: bool) -> AssemblyRc {
        Arc::new(Assembly {
            id: AssemblyId(NEXT_ASSEMBLY_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            domain_neutral,
            collectible,
            modules: boxcar::Vec::new(),
            keep_alive_acquisitions: AtomicUsize::new(0),
        })
    }

    /// Returns true if the assembly is shared across domains
    #[must_use]
    pub fn is_domain_neutral(&self) -> bool {
        self.domain_neutral
    }

    /// Returns true if the assembly can be unloaded once unreferenced
    #[must_use]
    pub fn is_collectible(&self) -> bool {
        self.collectible
    }

    /// Adds a module to this assembly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ModuleAlreadyAttached`] if the module already belongs to an
    /// assembly.
    pub fn add_module(self: &Arc<Self>, module: ModuleRc) -> Result<()> {
        module.attach(self)?;
        self.modules.push(module);
        Ok(())
    }

    /// Modules of this assembly, in load order
    pub fn modules(&self) -> impl Iterator<Item = &ModuleRc> {
        self.modules.iter().map(|(_, module)| module)
    }

    /// Number of modules
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.count()
    }

    /// Creates a guard that keeps this assembly alive.
    ///
    /// For collectible assemblies the guard holds a strong reference and every call is
    /// counted (see [`Assembly::keep_alive_acquisitions`]). For other assemblies the guard
    /// only identifies the assembly; they are never collected.
    #[must_use]
    pub fn acquire_keep_alive(self: &Arc<Self>) -> KeepAliveGuard {
        if self.collectible {
            self.keep_alive_acquisitions.fetch_add(1, Ordering::Relaxed);
            KeepAliveGuard {
                target: Some(Arc::downgrade(self)),
                strong: Some(self.clone()),
            }
        } else {
            KeepAliveGuard {
                target: Some(Arc::downgrade(self)),
                strong: None,
            }
        }
    }

    /// How many keep-alive guards have been acquired for this (collectible) assembly
    #[must_use]
    pub fn keep_alive_acquisitions(&self) -> usize {
        self.keep_alive_acquisitions.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("name", &self.name)
            .field("domain_neutral", &self.domain_neutral)
            .field("collectible", &self.collectible)
            .field("modules", &self.modules.count())
            .finish()
    }
}

/// Scoped reference keeping an assembly alive.
///
/// The default guard is empty. Guards handed out by
/// [`LoadedMethodIterator::advance`](crate::iterator::LoadedMethodIterator::advance)
/// belong to the caller only until the next call: the iterator replaces the guard when it
/// moves to a different assembly and releases it once the traversal ends.
#[derive(Clone, Default)]
pub struct KeepAliveGuard {
    target: Option<Weak<Assembly>>,
    strong: Option<AssemblyRc>,
}

impl KeepAliveGuard {
    /// Returns true if the guard refers to no assembly
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target.is_none()
    }

    /// Returns true if the guard holds a strong reference (collectible assemblies only)
    #[must_use]
    pub fn is_strong(&self) -> bool {
        self.strong.is_some()
    }

    /// The guarded assembly, while it is alive
    #[must_use]
    pub fn assembly(&self) -> Option<AssemblyRc> {
        match &self.strong {
            Some(strong) => Some(strong.clone()),
            None => self.target.as_ref().and_then(Weak::upgrade),
        }
    }

    /// Returns true if the guard refers to `assembly`
    #[must_use]
    pub fn holds(&self, assembly: &AssemblyRc) -> bool {
        self.target
            .as_ref()
            .is_some_and(|target| std::ptr::eq(target.as_ptr(), Arc::as_ptr(assembly)))
    }

    /// Releases the guarded assembly, leaving an empty guard
    pub fn release(&mut self) {
        self.target = None;
        self.strong = None;
    }

    pub(crate) fn refers_to(&self, assembly: &Weak<Assembly>) -> bool {
        self.target
            .as_ref()
            .is_some_and(|target| Weak::ptr_eq(target, assembly))
    }
}

impl fmt::Debug for KeepAliveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.assembly().map(|assembly| assembly.name.clone());
        f.debug_struct("KeepAliveGuard")
            .field("assembly", &name)
            .field("strong", &self.is_strong())
            .finish()
    }
}
