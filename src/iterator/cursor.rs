//! Restartable cursors over assemblies, modules and instantiation tables.
//!
//! Each cursor wraps one enumeration of the runtime model and adds the skip rules of a
//! traversal:
//!
//! - [`AssemblyCursor`] - shared-domain or per-domain assemblies; the unshared mode
//!   skips domain-neutral assemblies
//! - [`ModuleCursor`] - modules of one assembly; resource-only modules are skipped, the
//!   rest filtered by load level
//! - [`TypeInstantiationCursor`] / [`MethodInstantiationCursor`] - entries of one module's
//!   instantiation tables, passed through the [`EntryFilter`]
//!
//! For a fixed state of the runtime model every cursor yields the same sequence in the
//! same order, and `reset()` restarts it from the beginning.

use tracing::trace;

use crate::{
    iterator::{
        config::{IterationMode, IterationOptions},
        filter::{EntryFilter, FilterOutcome},
    },
    runtime::{
        AppDomain, Assembly, AssemblyRc, DomainAssemblyIter, MethodDesc, MethodDescRc,
        MethodInstEntry, MethodTableRc, ModuleIterationOption, ModuleRc, SharedAssemblyIter,
        TypeInstEntry,
    },
};

/// Cursor over the assemblies in scope of a traversal
pub enum AssemblyCursor<'a> {
    /// Every assembly of the shared domain
    Shared(SharedAssemblyIter<'a>),
    /// Assemblies of one app domain
    Domain {
        /// Underlying domain enumeration
        assemblies: DomainAssemblyIter<'a>,
        /// Skip domain-neutral assemblies
        skip_domain_neutral: bool,
    },
}

impl<'a> AssemblyCursor<'a> {
    /// Creates the cursor matching `options.mode`
    #[must_use]
    pub fn new(domain: &'a AppDomain, options: &IterationOptions) -> Self {
        match options.mode {
            IterationMode::SharedDomainAssemblies => {
                AssemblyCursor::Shared(domain.shared_domain().iterate_assemblies())
            }
            IterationMode::UnsharedDomainAssemblies => AssemblyCursor::Domain {
                assemblies: domain.iterate_assemblies(options.assembly_flags),
                skip_domain_neutral: true,
            },
            IterationMode::AllDomainAssemblies => AssemblyCursor::Domain {
                assemblies: domain.iterate_assemblies(options.assembly_flags),
                skip_domain_neutral: false,
            },
        }
    }

    /// Restarts the cursor at the first assembly
    pub fn reset(&mut self) {
        match self {
            AssemblyCursor::Shared(assemblies) => assemblies.reset(),
            AssemblyCursor::Domain { assemblies, .. } => assemblies.reset(),
        }
    }
}

impl Iterator for AssemblyCursor<'_> {
    type Item = AssemblyRc;

    fn next(&mut self) -> Option<AssemblyRc> {
        match self {
            AssemblyCursor::Shared(assemblies) => assemblies.next(),
            AssemblyCursor::Domain {
                assemblies,
                skip_domain_neutral,
            } => loop {
                let assembly = assemblies.next()?;
                if *skip_domain_neutral && assembly.is_domain_neutral() {
                    trace!(assembly = %assembly.name, "skipping domain-neutral assembly");
                    continue;
                }
                return Some(assembly);
            },
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum ModuleFilter {
    ProfilerNotified,
    Option(ModuleIterationOption),
}

/// Cursor over the code-bearing modules of one assembly
pub struct ModuleCursor {
    modules: Vec<ModuleRc>,
    position: usize,
    filter: ModuleFilter,
}

impl ModuleCursor {
    /// Snapshots the modules of `assembly`.
    ///
    /// In the shared mode only modules already announced to profilers are visited; the
    /// per-domain modes apply `options.module_option`.
    #[must_use]
    pub fn new(assembly: &Assembly, options: &IterationOptions) -> Self {
        let filter = if options.mode.is_per_domain() {
            ModuleFilter::Option(options.module_option)
        } else {
            ModuleFilter::ProfilerNotified
        };

        ModuleCursor {
            modules: assembly.modules().cloned().collect(),
            position: 0,
            filter,
        }
    }

    /// Restarts the cursor at the first module
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl Iterator for ModuleCursor {
    type Item = ModuleRc;

    fn next(&mut self) -> Option<ModuleRc> {
        while let Some(module) = self.modules.get(self.position) {
            self.position += 1;

            if module.is_resource() {
                continue;
            }
            let visible = match self.filter {
                ModuleFilter::ProfilerNotified => module.is_profiler_notified(),
                ModuleFilter::Option(option) => module.matches(option),
            };
            if visible {
                return Some(module.clone());
            }
        }
        None
    }
}

/// Cursor over the accepted type instantiations of one module
pub struct TypeInstantiationCursor {
    module: ModuleRc,
    position: usize,
}

impl TypeInstantiationCursor {
    /// Creates a cursor at the first entry of `module`'s type instantiation table
    #[must_use]
    pub fn new(module: ModuleRc) -> Self {
        TypeInstantiationCursor {
            module,
            position: 0,
        }
    }

    /// Restarts the cursor at the first entry
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Advances to the next instantiation of `target`'s declaring type
    pub fn next_accepted(&mut self, target: &MethodDesc) -> Option<MethodTableRc> {
        let table = self.module.param_types();
        while self.position < table.len() {
            let index = self.position;
            self.position += 1;

            let entry = table.get(index).unwrap_or(TypeInstEntry::Pending);
            match EntryFilter::type_entry(&entry, target) {
                FilterOutcome::Accept(mt) => return Some(mt),
                FilterOutcome::Reject(reason) => {
                    trace!(
                        module = %self.module.name,
                        index,
                        %reason,
                        "rejected type instantiation"
                    );
                }
            }
        }
        None
    }
}

/// Cursor over the accepted method instantiations of one module
pub struct MethodInstantiationCursor {
    module: ModuleRc,
    owner: Option<MethodTableRc>,
    position: usize,
}

impl MethodInstantiationCursor {
    /// Creates a cursor at the first entry of `module`'s method instantiation table.
    ///
    /// With an `owner`, only instantiations belonging to that exact type instantiation are
    /// accepted.
    #[must_use]
    pub fn new(module: ModuleRc, owner: Option<MethodTableRc>) -> Self {
        MethodInstantiationCursor {
            module,
            owner,
            position: 0,
        }
    }

    /// Restarts the cursor at the first entry
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Advances to the next instantiation of `target`
    pub fn next_accepted(&mut self, target: &MethodDesc) -> Option<MethodDescRc> {
        let table = self.module.inst_methods();
        while self.position < table.len() {
            let index = self.position;
            self.position += 1;

            let entry = table.get(index).unwrap_or(MethodInstEntry::Pending);
            match EntryFilter::method_entry(&entry, target, self.owner.as_ref()) {
                FilterOutcome::Accept(method) => return Some(method),
                FilterOutcome::Reject(reason) => {
                    trace!(
                        module = %self.module.name,
                        index,
                        %reason,
                        "rejected method instantiation"
                    );
                }
            }
        }
        None
    }
}
