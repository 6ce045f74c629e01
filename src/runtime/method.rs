//! Runtime type and method descriptors.
//!
//! A [`MethodTable`] describes one loaded type: either the canonical definition of a type
//! or one concrete instantiation of a generic type. A [`MethodDesc`] describes one loaded
//! method: the canonical definition, the copy living in an instantiated type's slot table,
//! or a generic method instantiation.
//!
//! # Identity
//!
//! Instantiations keep the metadata identity of their definition. A `List<int>` method
//! table carries the `TypeDef` token and [`ModuleId`] of `List<T>`, and `List<int>.Add`
//! carries the `MethodDef` token of `List<T>.Add`. That identity is what the
//! [`EntryFilter`](crate::iterator::EntryFilter) compares when it scans instantiation
//! tables of unrelated modules.
//!
//! # Restoration
//!
//! Descriptors created for ahead-of-time images start out unrestored and flip to restored
//! exactly once via `restore()`. Unrestored descriptors are never handed to callers.
//!
//! # Example
//!
//! ```rust
//! use jitscope::metadata::token::Token;
//! use jitscope::runtime::{Module, TypeDesc, TypeDescKind, TypeHandle};
//!
//! let module = Module::new("Collections.dll");
//! let list = module.define_type(Token::type_def(2), "List", 1)?;
//! let add = module.define_method(&list, Token::method_def(5), "Add", 0)?;
//!
//! let int = TypeHandle::from(TypeDesc::new(TypeDescKind::GenericVariable, "int"));
//! let list_int = list.instantiate(vec![int]);
//! let add_int = list_int.method_for_slot(add.slot).unwrap();
//! assert_eq!(add_int.token, add.token);
//! assert!(add_int.is_owned_by(&list_int));
//! # Ok::<(), jitscope::Error>(())
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock, Weak,
    },
};

use strum::Display;

use crate::{metadata::token::Token, runtime::module::ModuleId, Result};

/// A reference-counted pointer to a [`MethodTable`]
pub type MethodTableRc = Arc<MethodTable>;
/// A reference-counted pointer to a [`MethodDesc`]
pub type MethodDescRc = Arc<MethodDesc>;
/// A reference-counted pointer to a [`TypeDesc`]
pub type TypeDescRc = Arc<TypeDesc>;

/// Shape of a type that has no method table of its own
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum TypeDescKind {
    /// Single or multi-dimensional array
    Array,
    /// Unmanaged pointer
    Pointer,
    /// Managed reference
    ByRef,
    /// Unbound `!0` / `!!0` generic variable
    GenericVariable,
    /// Function pointer
    FunctionPointer,
}

/// A type descriptor for types that are not classes: arrays, pointers, by-refs,
/// generic variables and function pointers.
#[derive(Debug)]
pub struct TypeDesc {
    /// Kind of the descriptor
    pub kind: TypeDescKind,
    /// Display name, e.g. `int[]`
    pub name: String,
}

impl TypeDesc {
    /// Creates a new type descriptor
    #[must_use]
    pub fn new(kind: TypeDescKind, name: &str) -> TypeDescRc {
        Arc::new(TypeDesc {
            kind,
            name: name.to_string(),
        })
    }
}

/// A loaded type: either a class-like type with a [`MethodTable`], or a [`TypeDesc`].
#[derive(Clone, Debug)]
pub enum TypeHandle {
    /// Class, interface or value type backed by a method table
    Class(MethodTableRc),
    /// Any other type shape
    Desc(TypeDescRc),
}

impl TypeHandle {
    /// Returns the method table if this handle describes a class-like type
    #[must_use]
    pub fn as_method_table(&self) -> Option<&MethodTableRc> {
        match self {
            TypeHandle::Class(mt) => Some(mt),
            TypeHandle::Desc(_) => None,
        }
    }

    /// Returns true if this handle is a [`TypeDesc`]
    #[must_use]
    pub fn is_type_desc(&self) -> bool {
        matches!(self, TypeHandle::Desc(_))
    }
}

impl From<MethodTableRc> for TypeHandle {
    fn from(mt: MethodTableRc) -> Self {
        TypeHandle::Class(mt)
    }
}

impl From<TypeDescRc> for TypeHandle {
    fn from(desc: TypeDescRc) -> Self {
        TypeHandle::Desc(desc)
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHandle::Class(mt) => write!(f, "{}", mt),
            TypeHandle::Desc(desc) => f.write_str(&desc.name),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[TypeHandle]) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    f.write_str("<")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", arg)?;
    }
    f.write_str(">")
}

/// A loaded type: the canonical definition or one instantiation of a generic type.
pub struct MethodTable {
    /// `TypeDef` token of the definition
    pub token: Token,
    /// Module that defines the type
    pub module: ModuleId,
    /// Simple name of the type
    pub name: String,
    /// Type arguments, empty for the canonical definition
    pub type_args: Vec<TypeHandle>,
    /// Number of generic parameters declared by the definition
    pub generic_arity: u32,
    restored: AtomicBool,
    slots: RwLock<Vec<MethodDescRc>>,
}

impl MethodTable {
    /// Creates the canonical method table of a type definition.
    ///
    /// Usually called through [`Module::define_type`](crate::runtime::Module::define_type),
    /// which also registers the definition with its module.
    #[must_use]
    pub fn new(token: Token, module: ModuleId, name: &str, generic_arity: u32) -> MethodTableRc {
        Arc::new(MethodTable {
            token,
            module,
            name: name.to_string(),
            type_args: Vec::new(),
            generic_arity,
            restored: AtomicBool::new(true),
            slots: RwLock::new(Vec::new()),
        })
    }

    /// Creates a restored instantiation of this type.
    ///
    /// The new table receives a copy of every method slot laid out on `self` at the time
    /// of the call, each owned by the instantiation.
    #[must_use]
    pub fn instantiate(self: &Arc<Self>, type_args: Vec<TypeHandle>) -> MethodTableRc {
        self.instantiate_with(type_args, true)
    }

    /// Creates an instantiation that still awaits restoration, as produced by an
    /// ahead-of-time image before its fixups ran.
    #[must_use]
    pub fn instantiate_unrestored(
        self: &Arc<Self>,
        type_args: Vec<TypeHandle>,
    ) -> MethodTableRc {
        self.instantiate_with(type_args, false)
    }

    fn instantiate_with(
        self: &Arc<Self>,
        type_args: Vec<TypeHandle>,
        restored: bool,
    ) -> MethodTableRc {
        let instantiation = Arc::new(MethodTable {
            token: self.token,
            module: self.module,
            name: self.name.clone(),
            type_args,
            generic_arity: self.generic_arity,
            restored: AtomicBool::new(restored),
            slots: RwLock::new(Vec::new()),
        });

        let canonical_slots = read_lock!(self.slots).clone();
        {
            let mut slots = write_lock!(instantiation.slots);
            for method in canonical_slots {
                slots.push(Arc::new(MethodDesc {
                    token: method.token,
                    name: method.name.clone(),
                    module: method.module,
                    slot: method.slot,
                    owner_token: instantiation.token,
                    owner_arity: instantiation.generic_arity,
                    method_arity: method.method_arity,
                    method_args: Vec::new(),
                    owner: Arc::downgrade(&instantiation),
                    restored: AtomicBool::new(restored),
                }));
            }
        }

        instantiation
    }

    /// Lays out a new method in the next free slot of this table
    pub(crate) fn add_method(
        self: &Arc<Self>,
        token: Token,
        name: &str,
        method_arity: u32,
    ) -> MethodDescRc {
        let mut slots = write_lock!(self.slots);
        let method = Arc::new(MethodDesc {
            token,
            name: name.to_string(),
            module: self.module,
            slot: slots.len() as u32,
            owner_token: self.token,
            owner_arity: self.generic_arity,
            method_arity,
            method_args: Vec::new(),
            owner: Arc::downgrade(self),
            restored: AtomicBool::new(self.is_restored()),
        });
        slots.push(method.clone());
        method
    }

    /// Returns the method occupying the given dispatch slot
    #[must_use]
    pub fn method_for_slot(&self, slot: u32) -> Option<MethodDescRc> {
        read_lock!(self.slots).get(slot as usize).cloned()
    }

    /// Number of laid out method slots
    #[must_use]
    pub fn slot_count(&self) -> usize {
        read_lock!(self.slots).len()
    }

    /// Returns true if the type declares generic parameters
    #[must_use]
    pub fn has_generic_parameters(&self) -> bool {
        self.generic_arity > 0
    }

    /// Returns true once the table has been restored
    #[must_use]
    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }

    /// Marks the table and every method in its slots as restored
    pub fn restore(&self) {
        for method in read_lock!(self.slots).iter() {
            method.restore();
        }
        self.restored.store(true, Ordering::Release);
    }
}

impl fmt::Display for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        write_args(f, &self.type_args)
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("name", &self.to_string())
            .field("token", &self.token)
            .field("module", &self.module)
            .field("restored", &self.is_restored())
            .finish()
    }
}

/// A loaded method: a definition, a method in an instantiated type, or a generic method
/// instantiation.
pub struct MethodDesc {
    /// `MethodDef` token of the definition
    pub token: Token,
    /// Simple name of the method
    pub name: String,
    /// Module that defines the method
    pub module: ModuleId,
    /// Dispatch slot in the owning type
    pub slot: u32,
    /// `TypeDef` token of the owning type
    pub owner_token: Token,
    /// Generic arity of the owning type
    pub owner_arity: u32,
    /// Number of generic parameters declared by the method itself
    pub method_arity: u32,
    /// Method type arguments, empty unless this is a generic method instantiation
    pub method_args: Vec<TypeHandle>,
    owner: Weak<MethodTable>,
    restored: AtomicBool,
}

impl MethodDesc {
    /// Returns true if the owning type declares generic parameters
    #[must_use]
    pub fn has_type_instantiation(&self) -> bool {
        self.owner_arity > 0
    }

    /// Returns true if the method declares generic parameters
    #[must_use]
    pub fn has_method_instantiation(&self) -> bool {
        self.method_arity > 0
    }

    /// Returns true if the method is generic in either dimension
    #[must_use]
    pub fn has_class_or_method_instantiation(&self) -> bool {
        self.has_type_instantiation() || self.has_method_instantiation()
    }

    /// Returns the owning type while it is alive
    #[must_use]
    pub fn owner(&self) -> Option<MethodTableRc> {
        self.owner.upgrade()
    }

    /// Returns true if `owner` is the exact type (instantiation) owning this method.
    ///
    /// A method whose owner has been dropped is owned by nothing.
    #[must_use]
    pub fn is_owned_by(&self, owner: &MethodTableRc) -> bool {
        self.owner().is_some_and(|alive| Arc::ptr_eq(&alive, owner))
    }

    /// Returns true once the method has been restored
    #[must_use]
    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }

    /// Marks the method as restored
    pub fn restore(&self) {
        self.restored.store(true, Ordering::Release);
    }

    /// Creates a restored instantiation of this generic method on `owner`.
    ///
    /// # Arguments
    ///
    /// * `owner` - The type owning the instantiation, either the canonical type or one of its
    ///   instantiations
    /// * `method_args` - The method type arguments
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `owner` is not a form of this method's
    /// declaring type.
    pub fn instantiate(
        &self,
        owner: &MethodTableRc,
        method_args: Vec<TypeHandle>,
    ) -> Result<MethodDescRc> {
        self.instantiate_with(owner, method_args, true)
    }

    /// Creates an instantiation that still awaits restoration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `owner` is not a form of this method's
    /// declaring type.
    pub fn instantiate_unrestored(
        &self,
        owner: &MethodTableRc,
        method_args: Vec<TypeHandle>,
    ) -> Result<MethodDescRc> {
        self.instantiate_with(owner, method_args, false)
    }

    fn instantiate_with(
        &self,
        owner: &MethodTableRc,
        method_args: Vec<TypeHandle>,
        restored: bool,
    ) -> Result<MethodDescRc> {
        if owner.token != self.owner_token || owner.module != self.module {
            return Err(malformed_error!(
                "{} cannot own an instantiation of {}",
                owner,
                self.name
            ));
        }

        Ok(Arc::new(MethodDesc {
            token: self.token,
            name: self.name.clone(),
            module: self.module,
            slot: self.slot,
            owner_token: owner.token,
            owner_arity: owner.generic_arity,
            method_arity: self.method_arity,
            method_args,
            owner: Arc::downgrade(owner),
            restored: AtomicBool::new(restored),
        }))
    }
}

impl fmt::Display for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner() {
            Some(owner) => write!(f, "{}::{}", owner, self.name)?,
            None => write!(f, "{}::{}", self.owner_token, self.name)?,
        }
        write_args(f, &self.method_args)
    }
}

impl fmt::Debug for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDesc")
            .field("name", &self.to_string())
            .field("token", &self.token)
            .field("module", &self.module)
            .field("slot", &self.slot)
            .field("restored", &self.is_restored())
            .finish()
    }
}
