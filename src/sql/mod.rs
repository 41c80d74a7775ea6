//! SQL analysis
//!
//! Only table references are extracted; no semantic analysis is done.

pub mod resolver;

pub use resolver::{SqlDialect, TableReferenceResolver, TableReferences};
