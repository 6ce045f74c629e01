//! Metadata primitives shared by the runtime model and the iterators.
//!
//! The runtime identifies every definition it loads by the metadata [`token::Token`]
//! it was declared with in its defining module. Nothing in this crate parses metadata
//! streams; tokens are handed in by whoever populates the runtime model.

/// Metadata tokens referencing `TypeDef` and `MethodDef` rows
pub mod token;
