//! Executes one `WorkflowStep` and reports back a `StepResult`.
//!
//! `StepExecutor` is the seam between the DAG/engine (which only know about step
//! ids and dependencies) and the actual pipeline work. The default executor holds
//! one `StageHandler` per `PipelineStage`, so wiring a run to real adapters,
//! parsers, chunkers, embedders and the vector index is a matter of registering
//! handlers, not touching the engine's scheduling loop.

use async_trait::async_trait;
pub use kb_infra::RetryConfig;
use kb_infra::RetryPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::step::{PipelineStage, StepAction, StepResult, StepState, WorkflowStep};

/// Shared, per-run store for data handed between stage handlers (e.g. a
/// parsed document passed from `Parse` to `Chunk`). Keyed by source id.
/// `ExecutionContext` is shallow-cloned once per step, so this `Arc` is the
/// one thing every clone within a run actually shares.
pub type ArtifactStore = Arc<RwLock<HashMap<String, serde_json::Value>>>;

/// Values threaded through every step of one execution: which run and which
/// tenant it belongs to, available to handlers without a second lookup.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub execution_id: String,
    pub variables: HashMap<String, serde_json::Value>,
    pub artifacts: ArtifactStore,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            variables: HashMap::new(),
            artifacts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Stores a handoff value for `key` (conventionally a source id),
    /// overwriting whatever the previous stage left there.
    pub async fn set_artifact(&self, key: impl Into<String>, value: serde_json::Value) {
        self.artifacts.write().await.insert(key.into(), value);
    }

    /// Removes and returns the value left by the previous stage, if any.
    pub async fn take_artifact(&self, key: &str) -> Option<serde_json::Value> {
        self.artifacts.write().await.remove(key)
    }
}

/// Executes a single step and returns its outcome. Never called concurrently
/// for the same step id by the engine, but implementations may be called
/// concurrently across distinct steps.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(&self, step: &WorkflowStep, context: &ExecutionContext) -> crate::Result<StepResult>;
}

/// Runs one pipeline stage for one source. Registered per `PipelineStage` in
/// `DefaultStepExecutor`; a concrete handler closes over the adapter registry,
/// parser, chunker, embedder or vector index it needs.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn run(
        &self,
        source_id: &str,
        context: &ExecutionContext,
    ) -> Result<Option<serde_json::Value>, String>;
}

/// Retries a stage handler per SPEC_FULL.md SS4.5's failure policy (transient
/// errors retried with backoff, then the document/source is marked failed
/// without aborting the run), then dispatches `Custom`/`Wait` actions used by
/// the non-pipeline workflow scaffolding.
pub struct DefaultStepExecutor {
    handlers: HashMap<PipelineStage, Arc<dyn StageHandler>>,
    retry: RetryConfig,
}

impl DefaultStepExecutor {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            retry: RetryConfig::new(3),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_handler(mut self, stage: PipelineStage, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.insert(stage, handler);
        self
    }

    async fn run_pipeline_stage(
        &self,
        step: &WorkflowStep,
        source_id: &str,
        stage: PipelineStage,
        context: &ExecutionContext,
    ) -> StepResult {
        let Some(handler) = self.handlers.get(&stage) else {
            return StepResult::skipped(&step.id, format!("no handler registered for stage {}", stage.as_str()));
        };

        let policy = RetryPolicy::new(self.retry.clone());
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match handler.run(source_id, context).await {
                Ok(output) => return StepResult::completed(&step.id, attempt, output),
                Err(reason) => {
                    if policy.should_retry(attempt) {
                        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return StepResult::failed(&step.id, attempt, reason);
                }
            }
        }
    }
}

impl Default for DefaultStepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for DefaultStepExecutor {
    async fn execute_step(&self, step: &WorkflowStep, context: &ExecutionContext) -> crate::Result<StepResult> {
        let result = match &step.action {
            StepAction::PipelineStage { source_id, stage } => {
                self.run_pipeline_stage(step, source_id, *stage, context).await
            }
            StepAction::Wait { duration_secs } => {
                tokio::time::sleep(std::time::Duration::from_secs(*duration_secs)).await;
                StepResult::completed(&step.id, 1, None)
            }
            StepAction::Custom { handler, .. } => {
                StepResult::failed(&step.id, 1, format!("no handler registered for custom action '{handler}'"))
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl StageHandler for AlwaysFails {
        async fn run(&self, _source_id: &str, _context: &ExecutionContext) -> Result<Option<serde_json::Value>, String> {
            Err("boom".to_string())
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl StageHandler for AlwaysSucceeds {
        async fn run(&self, _source_id: &str, _context: &ExecutionContext) -> Result<Option<serde_json::Value>, String> {
            Ok(Some(serde_json::json!({"ok": true})))
        }
    }

    #[tokio::test]
    async fn test_successful_stage_completes_on_first_attempt() {
        let executor = DefaultStepExecutor::new()
            .with_handler(PipelineStage::Parse, Arc::new(AlwaysSucceeds));
        let step = WorkflowStep::pipeline_stage("src-1", PipelineStage::Parse);
        let ctx = ExecutionContext::new("wf", "exec");
        let result = executor.execute_step(&step, &ctx).await.unwrap();
        assert_eq!(result.state, StepState::Completed);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_failing_stage_retries_then_fails() {
        let executor = DefaultStepExecutor::new()
            .with_retry_config(RetryConfig::new(2).with_initial_delay(std::time::Duration::from_millis(1)))
            .with_handler(PipelineStage::Embed, Arc::new(AlwaysFails));
        let step = WorkflowStep::pipeline_stage("src-1", PipelineStage::Embed);
        let ctx = ExecutionContext::new("wf", "exec");
        let result = executor.execute_step(&step, &ctx).await.unwrap();
        assert_eq!(result.state, StepState::Failed);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_missing_handler_is_skipped_not_failed() {
        let executor = DefaultStepExecutor::new();
        let step = WorkflowStep::pipeline_stage("src-1", PipelineStage::Index);
        let ctx = ExecutionContext::new("wf", "exec");
        let result = executor.execute_step(&step, &ctx).await.unwrap();
        assert_eq!(result.state, StepState::Skipped);
    }
}
