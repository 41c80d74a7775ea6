//! Extraction Pipeline Module
//!
//! Every extraction moves through the same phases:
//!
//! 1. **Resolving references**: connection parameters and SQL table references
//! 2. **Fetching schemas**: per-table catalog lookups
//! 3. **Assembling**: datasets and job facets
//!
//! and ends in `Done`, or in `Failed` when the connection cannot be resolved.

pub mod run;

pub use run::{ExtractionPhase, ExtractionRun};
