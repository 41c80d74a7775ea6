//! Lineage data models
//!
//! Table references and schemas, datasets with their source identity, job
//! facets, and the per-task lineage record.

pub mod dataset;
pub mod facets;
pub mod table;
pub mod task;

// Re-export commonly used types
pub use dataset::*;
pub use facets::*;
pub use table::*;
pub use task::*;
