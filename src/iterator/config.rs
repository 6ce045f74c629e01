//! Iteration configuration.
//!
//! [`IterationOptions`] selects which assemblies and modules a
//! [`LoadedMethodIterator`](super::LoadedMethodIterator) visits.
//!
//! # Presets
//!
//! - [`IterationOptions::shared()`] - every domain-neutral assembly (the default)
//! - [`IterationOptions::unshared()`] - assemblies loaded into one domain, skipping
//!   domain-neutral ones; the only mode that honours custom filters
//! - [`IterationOptions::all_domains()`] - every assembly of one domain, shared or not
//!
//! # Example
//!
//! ```rust
//! use jitscope::iterator::{IterationMode, IterationOptions};
//! use jitscope::runtime::{AssemblyIterationFlags, ModuleIterationOption};
//!
//! let loading = AssemblyIterationFlags::default() | AssemblyIterationFlags::INCLUDE_LOADING;
//! let options = IterationOptions::unshared()
//!     .with_assembly_flags(loading)
//!     .with_module_option(ModuleIterationOption::IncludeAvailableToProfilers);
//! assert!(options.validate().is_ok());
//!
//! // Custom filters are not supported outside the unshared mode
//! let options = IterationOptions {
//!     mode: IterationMode::AllDomainAssemblies,
//!     ..options
//! };
//! assert!(options.validate().is_err());
//! ```

use strum::Display;

use crate::{
    runtime::{AssemblyIterationFlags, ModuleIterationOption},
    Error, Result,
};

/// Which assemblies a traversal visits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum IterationMode {
    /// Every assembly of the shared domain; modules must have been announced to profilers
    #[default]
    SharedDomainAssemblies,
    /// Assemblies loaded into one app domain, excluding domain-neutral ones
    UnsharedDomainAssemblies,
    /// Every assembly loaded into one app domain
    AllDomainAssemblies,
}

impl IterationMode {
    /// Returns true for the modes that enumerate an app domain
    #[must_use]
    pub fn is_per_domain(&self) -> bool {
        !matches!(self, IterationMode::SharedDomainAssemblies)
    }
}

/// Scope configuration of a traversal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IterationOptions {
    /// Which assemblies to visit
    pub mode: IterationMode,
    /// Assembly filter, honoured by the per-domain modes
    pub assembly_flags: AssemblyIterationFlags,
    /// Module filter, honoured by the per-domain modes
    pub module_option: ModuleIterationOption,
}

impl IterationOptions {
    /// Every domain-neutral assembly
    #[must_use]
    pub fn shared() -> Self {
        Self::default()
    }

    /// Assemblies of one domain, domain-neutral ones excluded
    #[must_use]
    pub fn unshared() -> Self {
        IterationOptions {
            mode: IterationMode::UnsharedDomainAssemblies,
            ..Self::default()
        }
    }

    /// Every assembly of one domain
    #[must_use]
    pub fn all_domains() -> Self {
        IterationOptions {
            mode: IterationMode::AllDomainAssemblies,
            ..Self::default()
        }
    }

    /// Replaces the assembly filter
    #[must_use]
    pub fn with_assembly_flags(mut self, flags: AssemblyIterationFlags) -> Self {
        self.assembly_flags = flags;
        self
    }

    /// Replaces the module filter
    #[must_use]
    pub fn with_module_option(mut self, option: ModuleIterationOption) -> Self {
        self.module_option = option;
        self
    }

    /// Checks that custom filters are only combined with
    /// [`IterationMode::UnsharedDomainAssemblies`].
    ///
    /// The shared mode ignores filters entirely and the all-domains mode has never been
    /// validated with anything but the defaults, so such combinations are rejected rather
    /// than given made-up semantics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedConfiguration`] for non-default filters outside the
    /// unshared mode.
    pub fn validate(&self) -> Result<()> {
        if self.mode == IterationMode::UnsharedDomainAssemblies {
            return Ok(());
        }

        if self.assembly_flags != AssemblyIterationFlags::default() {
            return Err(Error::UnsupportedConfiguration(format!(
                "assembly flags {:?} require {} mode, got {}",
                self.assembly_flags,
                IterationMode::UnsharedDomainAssemblies,
                self.mode
            )));
        }
        if self.module_option != ModuleIterationOption::default() {
            return Err(Error::UnsupportedConfiguration(format!(
                "module option {} requires {} mode, got {}",
                self.module_option,
                IterationMode::UnsharedDomainAssemblies,
                self.mode
            )));
        }
        Ok(())
    }
}
