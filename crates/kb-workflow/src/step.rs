//! Step vocabulary shared by the DAG and the engine.
//!
//! A step in a pipeline run identifies one (source, stage) pair from SPEC_FULL.md's
//! `ingest -> parse -> chunk -> embed -> index` chain. The generic `Custom`/`Wait`
//! actions are kept alongside the pipeline actions so the scaffolding that still
//! builds ad-hoc approval/template workflows out of this vocabulary keeps compiling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Coarse classification of a step, used by the engine to decide whether a step
/// needs a human in the loop before it can run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Action,
    Approval,
}

/// One stage of the per-source ingestion chain (SPEC_FULL.md SS4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Ingest,
    Parse,
    Chunk,
    Embed,
    Index,
}

impl PipelineStage {
    pub const ORDER: [PipelineStage; 5] = [
        PipelineStage::Ingest,
        PipelineStage::Parse,
        PipelineStage::Chunk,
        PipelineStage::Embed,
        PipelineStage::Index,
    ];

    /// Weight of this stage in `PipelineRun.progress.pct` (SPEC_FULL.md SS4.5).
    pub fn progress_weight(self) -> f64 {
        match self {
            PipelineStage::Ingest => 0.20,
            PipelineStage::Parse => 0.20,
            PipelineStage::Chunk => 0.15,
            PipelineStage::Embed => 0.30,
            PipelineStage::Index => 0.15,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Ingest => "ingest",
            PipelineStage::Parse => "parse",
            PipelineStage::Chunk => "chunk",
            PipelineStage::Embed => "embed",
            PipelineStage::Index => "index",
        }
    }
}

/// What a step does when it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepAction {
    /// Run one pipeline stage against one source within the owning run's KB.
    PipelineStage {
        source_id: String,
        stage: PipelineStage,
    },
    /// Invoke a named handler with free-form parameters. Used by the template
    /// and scheduling scaffolding for workflows outside the ingestion chain.
    Custom {
        handler: String,
        #[serde(default)]
        parameters: HashMap<String, serde_json::Value>,
    },
    /// Wait out a fixed duration. Placeholder action for approval gates, which
    /// complete via `ApprovalGate` rather than real work.
    Wait { duration_secs: u64 },
}

/// One node in a workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub step_type: StepType,
    pub action: StepAction,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// If true, a `Failed` result for this step fails the whole run. Pipeline
    /// stages for a document set this; an optional enrichment step would not.
    pub fail_on_error: bool,
    pub timeout_secs: Option<u64>,
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, step_type: StepType, action: StepAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            step_type,
            action,
            dependencies: Vec::new(),
            fail_on_error: true,
            timeout_secs: None,
        }
    }

    pub fn pipeline_stage(source_id: impl Into<String>, stage: PipelineStage) -> Self {
        let source_id = source_id.into();
        Self::new(
            format!("{}:{}", source_id, stage.as_str()),
            StepType::Action,
            StepAction::PipelineStage { source_id, stage },
        )
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Lifecycle of one step's execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Outcome of running a step once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub state: StepState,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl StepResult {
    pub fn completed(step_id: impl Into<String>, attempts: u32, output: Option<serde_json::Value>) -> Self {
        let now = chrono::Utc::now();
        Self {
            step_id: step_id.into(),
            state: StepState::Completed,
            output,
            error: None,
            attempts,
            started_at: now,
            completed_at: now,
        }
    }

    pub fn failed(step_id: impl Into<String>, attempts: u32, error: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            step_id: step_id.into(),
            state: StepState::Failed,
            output: None,
            error: Some(error.into()),
            attempts,
            started_at: now,
            completed_at: now,
        }
    }

    pub fn skipped(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            step_id: step_id.into(),
            state: StepState::Skipped,
            output: None,
            error: Some(reason.into()),
            attempts: 0,
            started_at: now,
            completed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_stage_weights_sum_to_one() {
        let total: f64 = PipelineStage::ORDER.iter().map(|s| s.progress_weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pipeline_stage_step_has_stable_id_shape() {
        let step = WorkflowStep::pipeline_stage("src-1", PipelineStage::Embed);
        assert_eq!(step.id, "src-1:embed");
        assert!(matches!(step.action, StepAction::PipelineStage { .. }));
    }

    #[test]
    fn test_with_dependency_appends() {
        let step = WorkflowStep::new("a", StepType::Action, StepAction::Wait { duration_secs: 0 })
            .with_dependency("x")
            .with_dependency("y");
        assert_eq!(step.dependencies, vec!["x".to_string(), "y".to_string()]);
    }
}
