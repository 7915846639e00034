//! # FHIR4DS Compiler Support Types
//!
//! Shared building blocks used by every phase of the FHIRPath-to-SQL
//! compiler: the error taxonomy (spec §7), a small enum-keyed metadata map
//! (spec §3), source-position computation, and masked-expression snippet
//! search for diagnostics. Kept dependency-free and engine-agnostic so the
//! dialect, registry, and compiler crates can all depend on it without
//! pulling in anything else.

pub mod errors;
pub mod metadata;
pub mod position;
pub mod suggest;

pub use errors::{
    AssemblyError, BuildError, CompileError, LexError, ParseError, SourcePosition,
    TranslationError, ValidationError,
};
pub use metadata::{Metadata, MetadataKey, MetadataValue};
