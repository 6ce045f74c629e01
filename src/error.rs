use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which covers every error this library can return.
///
/// Most of the conditions a traversal runs into are deliberately *not* errors: an
/// unresolvable method token, an exhausted scope, and half-constructed table entries all
/// surface as a plain `false` from
/// [`LoadedMethodIterator::advance`](crate::iterator::LoadedMethodIterator::advance).
/// The variants below describe misuse detected while building the runtime model or while
/// configuring an iterator.
///
/// # Error Categories
///
/// ## Iterator Configuration
/// - [`Error::InvalidToken`] - The target token is not a `MethodDef` token
/// - [`Error::UnsupportedConfiguration`] - Filter flags combined with an untested mode
///
/// ## Runtime Model
/// - [`Error::DuplicateDefinition`] - A token was defined twice in one module
/// - [`Error::ModuleAlreadyAttached`] - A module was added to a second assembly
/// - [`Error::NotDomainNeutral`] - A per-domain assembly was added to the shared domain
/// - [`Error::AssemblyNotLoaded`] - An assembly is unknown to the queried domain
/// - [`Error::DuplicateInstantiation`] - An instantiation was published into a second slot
/// - [`Error::OutOfBounds`] - A table slot index does not exist
/// - [`Error::Malformed`] - Inconsistent runtime structures
///
/// # Examples
///
/// ```rust
/// use jitscope::{Error, iterator::{IterationOptions, LoadedMethodIterator}};
/// use jitscope::metadata::token::Token;
/// use jitscope::runtime::{Module, Runtime};
///
/// let runtime = Runtime::new();
/// let domain = runtime.create_domain("Default");
/// let module = Module::new("App.dll");
///
/// let options = IterationOptions::default();
/// match LoadedMethodIterator::start(&domain, &module, Token::new(0x02000001), options) {
///     Err(Error::InvalidToken(token)) => println!("{} is not a method", token),
///     Err(e) => println!("Other error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The token handed to an iterator does not reference the `MethodDef` table.
    #[error("Token {0} does not reference a method definition")]
    InvalidToken(Token),

    /// Assembly or module filter flags were combined with an iteration mode they have not
    /// been validated against.
    ///
    /// Only [`IterationMode::UnsharedDomainAssemblies`](crate::iterator::IterationMode)
    /// honours caller supplied filters; every other mode applies a fixed filter.
    #[error("Unsupported iteration configuration - {0}")]
    UnsupportedConfiguration(String),

    /// A type or method definition token was registered twice in the same module.
    #[error("Definition {0} already exists in this module")]
    DuplicateDefinition(Token),

    /// The module is already owned by another assembly.
    #[error("Module '{0}' is already attached to an assembly")]
    ModuleAlreadyAttached(String),

    /// Only domain-neutral assemblies may be registered with the shared domain.
    #[error("Assembly '{0}' is not domain-neutral")]
    NotDomainNeutral(String),

    /// The assembly has never been loaded into the queried domain.
    #[error("Assembly '{0}' is not loaded in this domain")]
    AssemblyNotLoaded(String),

    /// The instantiation is already published in another slot of the same table.
    #[error("Instantiation is already published at index {0}")]
    DuplicateInstantiation(usize),

    /// An index into an instantiation table was out of range.
    #[error("Out of Bound access would have occurred!")]
    OutOfBounds,

    /// The runtime structures are inconsistent.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the inconsistency
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },
}
