//! Orchestrator for the Knowledge Base ETL Pipeline (C7).
//!
//! Drives a `PipelineRun` through each source's `ingest -> parse -> chunk ->
//! embed -> index` chain: `dag` models the per-source stage chains as one DAG
//! (sources are independent roots), `engine` schedules ready steps with
//! bounded concurrency and owns the `RunState` state machine, `step` and
//! `execution` are the step vocabulary and its executor seam.

pub mod dag;
pub mod engine;
pub mod execution;
pub mod step;

pub use dag::{DagValidationError, WorkflowDag};
pub use engine::{
    PipelineRun, PipelineRunPlan, RunCounters, RunProgress, RunState, SourcePlan, StageEvent,
    StageEventLevel, WorkflowEngine, DEFAULT_CONCURRENCY, DEFAULT_STAGE_LOG_CAP,
};
pub use execution::{DefaultStepExecutor, ExecutionContext, RetryConfig, StageHandler, StepExecutor};
pub use step::{PipelineStage, StepAction, StepResult, StepState, StepType, WorkflowStep};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("run not found: {0}")]
    NotFound(String),

    #[error("invalid run definition: {0}")]
    InvalidDefinition(String),

    #[error("DAG validation error: {0}")]
    DagValidation(#[from] DagValidationError),

    #[error("step execution failed: {step_id}: {reason}")]
    StepExecutionFailed { step_id: String, reason: String },

    #[error("run already active: {0}")]
    AlreadyRunning(String),

    #[error("run not running: {0}")]
    NotRunning(String),

    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    #[error("timeout exceeded: {0}")]
    Timeout(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("core error: {0}")]
    Core(#[from] kb_core::AppError),
}

impl WorkflowError {
    pub fn kind(&self) -> kb_core::ErrorKind {
        match self {
            WorkflowError::NotFound(_) => kb_core::ErrorKind::NotFound,
            WorkflowError::InvalidDefinition(_) => kb_core::ErrorKind::InvalidArgument,
            WorkflowError::DagValidation(_) => kb_core::ErrorKind::InvalidArgument,
            WorkflowError::StepExecutionFailed { .. } => kb_core::ErrorKind::Internal,
            WorkflowError::AlreadyRunning(_) => kb_core::ErrorKind::ConflictState,
            WorkflowError::NotRunning(_) => kb_core::ErrorKind::ConflictState,
            WorkflowError::DependencyFailed(_) => kb_core::ErrorKind::Internal,
            WorkflowError::Timeout(_) => kb_core::ErrorKind::Transient,
            WorkflowError::QuotaExceeded(_) => kb_core::ErrorKind::ResourceExhausted,
            WorkflowError::Serialization(_) => kb_core::ErrorKind::DataError,
            WorkflowError::Core(err) => err.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::NotFound("run-1".to_string());
        assert!(err.to_string().contains("run-1"));
        assert_eq!(err.kind(), kb_core::ErrorKind::NotFound);
    }
}
