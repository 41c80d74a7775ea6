//! Extraction run tracking

use crate::error::ExtractError;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error};

/// Phase of a single extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPhase {
    #[default]
    Idle,
    /// Resolving connection parameters and table references
    ResolvingReferences,
    /// Looking up table schemas in the catalog
    FetchingSchemas,
    /// Building the lineage record
    Assembling,
    Done,
    /// Connection resolution failed
    Failed,
}

impl ExtractionPhase {
    pub fn can_advance_to(&self, next: ExtractionPhase) -> bool {
        use ExtractionPhase::*;
        matches!(
            (self, next),
            (Idle, ResolvingReferences)
                | (ResolvingReferences, FetchingSchemas)
                | (ResolvingReferences, Failed)
                | (FetchingSchemas, Assembling)
                | (FetchingSchemas, Failed)
                | (Assembling, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtractionPhase::Done | ExtractionPhase::Failed)
    }
}

impl fmt::Display for ExtractionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionPhase::Idle => "idle",
            ExtractionPhase::ResolvingReferences => "resolving_references",
            ExtractionPhase::FetchingSchemas => "fetching_schemas",
            ExtractionPhase::Assembling => "assembling",
            ExtractionPhase::Done => "done",
            ExtractionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Phases one extraction went through
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRun {
    job_name: String,
    phase: ExtractionPhase,
    history: Vec<ExtractionPhase>,
}

impl ExtractionRun {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            phase: ExtractionPhase::Idle,
            history: vec![ExtractionPhase::Idle],
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn phase(&self) -> ExtractionPhase {
        self.phase
    }

    pub fn history(&self) -> &[ExtractionPhase] {
        &self.history
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn advance(&mut self, next: ExtractionPhase) -> Result<(), ExtractError> {
        if !self.phase.can_advance_to(next) {
            return Err(ExtractError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        debug!("{}: {} -> {}", self.job_name, self.phase, next);
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Record a fatal error and move to `Failed`
    pub fn fail(&mut self, err: &ExtractError) {
        error!("Lineage extraction failed for {} during {}: {}", self.job_name, self.phase, err);
        if self.phase.can_advance_to(ExtractionPhase::Failed) {
            self.phase = ExtractionPhase::Failed;
            self.history.push(ExtractionPhase::Failed);
        }
    }
}
