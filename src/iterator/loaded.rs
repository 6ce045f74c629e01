//! The cascading iterator over every loaded form of a method definition.
//!
//! A method definition can be loaded many times over: once as its canonical definition,
//! and once per instantiation of its declaring type and/or of its own generic parameters,
//! each instantiation recorded in the tables of whichever module loaded it.
//! [`LoadedMethodIterator`] walks all of them with four nested cursors:
//!
//! ```text
//! Assembly ──> Module ──> Type instantiation ──> Method instantiation
//! ```
//!
//! Each call to [`LoadedMethodIterator::advance`] resumes at the innermost level, moves
//! outwards when a level is exhausted and rebuilds every inner level after an outer one
//! moved. A level whose dimension is not generic is visited exactly once per outer
//! position. A method generic in neither dimension short-circuits the whole cascade and
//! produces the canonical definition exactly once, whatever the scope.
//!
//! # Keep-Alive
//!
//! In the per-domain modes, every move to a new assembly stores a fresh
//! [`KeepAliveGuard`] in the caller's holder. The caller owns the guard until the next
//! call and must neither release nor replace it in the meantime; in return, a collectible
//! assembly stays loaded for as long as one of its methods is current.
//!
//! # Examples
//!
//! ```rust
//! use jitscope::prelude::*;
//!
//! let runtime = Runtime::new();
//! let domain = runtime.create_domain("Default");
//! let assembly = Assembly::new("App");
//! let module = Module::new("App.dll");
//! assembly.add_module(module.clone())?;
//! domain.load(assembly, LoadContext::Execution);
//!
//! let list = module.define_type(Token::type_def(2), "List", 1)?;
//! let add = module.define_method(&list, Token::method_def(1), "Add", 0)?;
//! let int = module.define_type(Token::type_def(3), "Int32", 0)?;
//! module
//!     .param_types()
//!     .insert(TypeInstEntry::Loaded(list.instantiate(vec![int.into()]).into()));
//!
//! let options = IterationOptions::all_domains();
//! let mut iter = LoadedMethodIterator::start(&domain, &module, add.token, options)?;
//! let mut holder = KeepAliveGuard::default();
//! while iter.advance(&mut holder) {
//!     println!("{}", iter.current());
//! }
//! # Ok::<(), jitscope::Error>(())
//! ```

use std::sync::{Arc, Weak};

use strum::Display;
use tracing::{debug, trace};

use crate::{
    iterator::{
        config::{IterationMode, IterationOptions},
        cursor::{AssemblyCursor, MethodInstantiationCursor, ModuleCursor, TypeInstantiationCursor},
    },
    metadata::token::Token,
    runtime::{AppDomain, Assembly, KeepAliveGuard, MethodDescRc, MethodTableRc, ModuleRc},
    Error, Result,
};

/// A level of the cascade, outermost first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Level {
    /// Assemblies of the scope
    Assembly,
    /// Modules of the current assembly
    Module,
    /// Type instantiations in the current module
    Type,
    /// Method instantiations in the current module
    Method,
}

/// Observable progress of a [`LoadedMethodIterator`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IteratorState {
    /// `advance` has not been called yet
    Unstarted,
    /// The traversal is positioned at the given level
    Active(Level),
    /// Every result has been produced
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Unstarted,
    Canonical,
    Active(Level),
    Done,
}

/// Enumerates the canonical definition and every loaded instantiation of one method.
///
/// The iterator is single-pass: once [`advance`](Self::advance) returned `false` it keeps
/// returning `false`, and there is no way back to the first result.
pub struct LoadedMethodIterator<'a> {
    token: Token,
    options: IterationOptions,
    main: Option<MethodDescRc>,
    has_type_inst: bool,
    has_method_inst: bool,
    phase: Phase,
    located: bool,

    assemblies: AssemblyCursor<'a>,
    modules: Option<ModuleCursor>,
    types: Option<TypeInstantiationCursor>,
    methods: Option<MethodInstantiationCursor>,

    current_assembly: Weak<Assembly>,
    current_module: Option<ModuleRc>,
    current_type: Option<MethodTableRc>,
    current_method: Option<MethodDescRc>,
    visited_type: bool,
    visited_method: bool,
}

impl<'a> LoadedMethodIterator<'a> {
    /// Starts a traversal for the method `token` defined in `module`.
    ///
    /// An unknown token is not an error: the traversal is simply empty.
    ///
    /// # Arguments
    ///
    /// * `domain` - The domain to enumerate; the shared mode only uses its shared domain
    /// * `module` - The module defining the method
    /// * `token` - The `MethodDef` token of the method
    /// * `options` - The scope of the traversal
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] if `token` is not a `MethodDef` token, and
    /// [`Error::UnsupportedConfiguration`] if `options` fails [`IterationOptions::validate`].
    pub fn start(
        domain: &'a AppDomain,
        module: &ModuleRc,
        token: Token,
        options: IterationOptions,
    ) -> Result<Self> {
        if !token.is_method_def() {
            return Err(Error::InvalidToken(token));
        }
        options.validate()?;

        let main = module.lookup_method_def(token);
        match &main {
            Some(method) => debug!(
                %token,
                method = %method,
                module = %module.name,
                mode = %options.mode,
                "starting loaded method traversal"
            ),
            None => debug!(%token, module = %module.name, "method definition not found"),
        }

        Ok(Self::build(domain, token, options, main))
    }

    /// Starts a traversal over every assembly of `domain` for an already resolved method.
    ///
    /// Used by tools that inspect a runtime from the outside and have located the
    /// descriptor by other means.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToken`] if `token` is not a `MethodDef` token, and a
    /// malformed error if `method` does not carry `token`.
    pub fn start_resolved(
        domain: &'a AppDomain,
        module: &ModuleRc,
        token: Token,
        method: MethodDescRc,
    ) -> Result<Self> {
        if !token.is_method_def() {
            return Err(Error::InvalidToken(token));
        }
        if method.token != token || method.module != module.id {
            return Err(malformed_error!(
                "{} is not method {} of module {}",
                method,
                token,
                module.name
            ));
        }

        debug!(%token, method = %method, module = %module.name, "starting resolved traversal");
        Ok(Self::build(
            domain,
            token,
            IterationOptions::all_domains(),
            Some(method),
        ))
    }

    fn build(
        domain: &'a AppDomain,
        token: Token,
        options: IterationOptions,
        main: Option<MethodDescRc>,
    ) -> Self {
        let has_type_inst = main
            .as_ref()
            .is_some_and(|method| method.has_type_instantiation());
        let has_method_inst = main
            .as_ref()
            .is_some_and(|method| method.has_method_instantiation());

        LoadedMethodIterator {
            token,
            options,
            main,
            has_type_inst,
            has_method_inst,
            phase: Phase::Unstarted,
            located: false,
            assemblies: AssemblyCursor::new(domain, &options),
            modules: None,
            types: None,
            methods: None,
            current_assembly: Weak::new(),
            current_module: None,
            current_type: None,
            current_method: None,
            visited_type: false,
            visited_method: false,
        }
    }

    /// The `MethodDef` token this traversal enumerates
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// The resolved definition, if resolution succeeded
    #[must_use]
    pub fn definition(&self) -> Option<&MethodDescRc> {
        self.main.as_ref()
    }

    /// The scope of this traversal
    #[must_use]
    pub fn options(&self) -> &IterationOptions {
        &self.options
    }

    /// Current progress of the traversal
    #[must_use]
    pub fn state(&self) -> IteratorState {
        match self.phase {
            Phase::Unstarted => IteratorState::Unstarted,
            Phase::Canonical => IteratorState::Active(Level::Method),
            Phase::Active(level) => IteratorState::Active(level),
            Phase::Done => IteratorState::Done,
        }
    }

    /// Moves to the next loaded form of the method.
    ///
    /// Returns `false` once the traversal is exhausted; [`current`](Self::current) is only
    /// valid after a call that returned `true`.
    ///
    /// # Arguments
    ///
    /// * `holder` - Receives the keep-alive guard of the current assembly. It belongs to
    ///   the caller until the next call and is released once the traversal ends.
    pub fn advance(&mut self, holder: &mut KeepAliveGuard) -> bool {
        self.located = false;

        let mut level = match self.phase {
            Phase::Done => return false,
            Phase::Canonical => {
                self.finish(holder);
                return false;
            }
            Phase::Unstarted => match &self.main {
                None => {
                    self.finish(holder);
                    return false;
                }
                Some(main) if !main.has_class_or_method_instantiation() => {
                    holder.release();
                    self.phase = Phase::Canonical;
                    self.located = true;
                    return true;
                }
                Some(_) => Level::Assembly,
            },
            Phase::Active(_) => Level::Method,
        };

        loop {
            self.phase = Phase::Active(level);
            level = match level {
                Level::Method => {
                    if self.next_method() {
                        break;
                    }
                    Level::Type
                }
                Level::Type => {
                    if self.next_type() {
                        Level::Method
                    } else {
                        Level::Module
                    }
                }
                Level::Module => {
                    if self.next_module() {
                        Level::Type
                    } else {
                        Level::Assembly
                    }
                }
                Level::Assembly => {
                    if !self.next_assembly(holder) {
                        self.finish(holder);
                        return false;
                    }
                    Level::Module
                }
            };
        }

        debug_assert!(
            !self.options.mode.is_per_domain() || holder.refers_to(&self.current_assembly),
            "keep-alive holder was replaced between calls"
        );

        self.located = true;
        true
    }

    /// The method located by the last successful [`advance`](Self::advance).
    ///
    /// # Panics
    ///
    /// Panics if called before the first `advance` or after `advance` returned `false`.
    #[must_use]
    pub fn current(&self) -> MethodDescRc {
        match self.try_current() {
            Some(method) => method,
            None => panic!(
                "no loaded method located for {} (state {:?})",
                self.token,
                self.state()
            ),
        }
    }

    /// The method located by the last successful [`advance`](Self::advance), if any
    #[must_use]
    pub fn try_current(&self) -> Option<MethodDescRc> {
        if !self.located {
            return None;
        }
        let main = self.main.as_ref()?;

        if self.has_method_inst {
            return self.current_method.clone();
        }
        if !self.has_type_inst {
            return Some(main.clone());
        }
        self.current_type.as_ref()?.method_for_slot(main.slot)
    }

    /// Turns the traversal into an [`Iterator`] that owns its keep-alive holder
    #[must_use]
    pub fn into_methods(self) -> LoadedMethods<'a> {
        LoadedMethods {
            iter: self,
            holder: KeepAliveGuard::default(),
        }
    }

    fn finish(&mut self, holder: &mut KeepAliveGuard) {
        trace!(token = %self.token, "loaded method traversal exhausted");
        holder.release();
        self.phase = Phase::Done;
        self.current_assembly = Weak::new();
        self.current_module = None;
        self.modules = None;
        self.types = None;
        self.methods = None;
        self.current_type = None;
        self.current_method = None;
    }

    fn next_method(&mut self) -> bool {
        if !self.has_method_inst {
            if self.visited_method {
                return false;
            }
            self.visited_method = true;
            return true;
        }

        let (Some(main), Some(cursor)) = (&self.main, self.methods.as_mut()) else {
            return false;
        };
        match cursor.next_accepted(main) {
            Some(method) => {
                self.current_method = Some(method);
                true
            }
            None => false,
        }
    }

    fn next_type(&mut self) -> bool {
        if self.has_type_inst {
            let (Some(main), Some(cursor)) = (&self.main, self.types.as_mut()) else {
                return false;
            };
            match cursor.next_accepted(main) {
                Some(mt) => self.current_type = Some(mt),
                None => return false,
            }
        } else if self.visited_type {
            return false;
        } else {
            self.visited_type = true;
        }

        if self.has_method_inst {
            let owner = if self.has_type_inst {
                self.current_type.clone()
            } else {
                None
            };
            self.methods = self
                .current_module
                .clone()
                .map(|module| MethodInstantiationCursor::new(module, owner));
        } else {
            self.visited_method = false;
        }
        true
    }

    fn next_module(&mut self) -> bool {
        let Some(module) = self.modules.as_mut().and_then(Iterator::next) else {
            return false;
        };
        trace!(module = %module.name, "entering module");

        if self.has_type_inst {
            self.types = Some(TypeInstantiationCursor::new(module.clone()));
        } else {
            self.visited_type = false;
        }
        self.current_module = Some(module);
        true
    }

    fn next_assembly(&mut self, holder: &mut KeepAliveGuard) -> bool {
        let Some(assembly) = self.assemblies.next() else {
            return false;
        };
        trace!(assembly = %assembly.name, "entering assembly");

        if self.options.mode == IterationMode::SharedDomainAssemblies {
            holder.release();
        } else if !holder.holds(&assembly) {
            *holder = assembly.acquire_keep_alive();
        }

        self.current_assembly = Arc::downgrade(&assembly);
        self.modules = Some(ModuleCursor::new(&assembly, &self.options));
        self.current_module = None;
        true
    }
}

/// One loaded form of a method, together with the guard keeping its assembly alive
#[derive(Debug, Clone)]
pub struct LoadedMethod {
    /// The located method
    pub method: MethodDescRc,
    /// Keep-alive guard of the assembly the method was found in; empty in the shared mode
    /// and for the canonical definition of a non-generic method
    pub keep_alive: KeepAliveGuard,
}

/// [`Iterator`] adapter over a [`LoadedMethodIterator`], see
/// [`LoadedMethodIterator::into_methods`]
pub struct LoadedMethods<'a> {
    iter: LoadedMethodIterator<'a>,
    holder: KeepAliveGuard,
}

impl Iterator for LoadedMethods<'_> {
    type Item = LoadedMethod;

    fn next(&mut self) -> Option<LoadedMethod> {
        if !self.iter.advance(&mut self.holder) {
            return None;
        }
        self.iter.try_current().map(|method| LoadedMethod {
            method,
            keep_alive: self.holder.clone(),
        })
    }
}
