//! Drives a `PipelineRun` through its per-source stage DAG with progress,
//! cancellation, retries and partial-failure tolerance (SPEC_FULL.md SS4.5).

use crate::dag::WorkflowDag;
use crate::execution::{DefaultStepExecutor, ExecutionContext, StepExecutor};
use crate::step::{PipelineStage, StepResult, StepState, WorkflowStep};
use crate::{Result, WorkflowError};
use kb_tenant::quota::{QuotaManager, QuotaType};
use kb_tenant::{Tenant, TenantTier};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default cap on `stage_log` entries kept per run (SPEC_FULL.md SS4.5).
pub const DEFAULT_STAGE_LOG_CAP: usize = 10_000;
/// Default bound on sources processed concurrently within one run.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Lifecycle of one `PipelineRun`, generalized from the teacher's `WorkflowStatus`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }

    pub fn is_active(self) -> bool {
        matches!(self, RunState::Queued | RunState::Running | RunState::Paused)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageEventLevel {
    Info,
    Warn,
    Error,
}

/// One observable event appended to a run's `stage_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub stage: PipelineStage,
    pub level: StageEventLevel,
    pub source_id: Option<String>,
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

/// `progress.pct`'s stage/fraction pair.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunProgress {
    pub stage: Option<PipelineStage>,
    pub pct: f64,
}

/// Running totals surfaced alongside a run's progress.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunCounters {
    pub docs_total: u64,
    pub docs_done: u64,
    pub docs_failed: u64,
    pub chunks_created: u64,
    pub vectors_indexed: u64,
}

/// One execution of the finalize pipeline over a KB's sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub kb_id: String,
    pub state: RunState,
    pub progress: RunProgress,
    pub counters: RunCounters,
    pub stage_log: Vec<StageEvent>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
    stage_log_cap: usize,
}

impl PipelineRun {
    pub fn new(run_id: impl Into<String>, kb_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            kb_id: kb_id.into(),
            state: RunState::Queued,
            progress: RunProgress::default(),
            counters: RunCounters::default(),
            stage_log: Vec::new(),
            started_at: None,
            finished_at: None,
            error: None,
            stage_log_cap: DEFAULT_STAGE_LOG_CAP,
        }
    }

    /// Appends an event, dropping the oldest `info` entry first once the log
    /// is at capacity; `warn`/`error` entries are never dropped.
    pub fn push_event(&mut self, event: StageEvent) {
        if self.stage_log.len() >= self.stage_log_cap {
            if let Some(pos) = self.stage_log.iter().position(|e| e.level == StageEventLevel::Info) {
                self.stage_log.remove(pos);
            } else if event.level == StageEventLevel::Info {
                return;
            }
        }
        self.stage_log.push(event);
    }

    /// Recomputes `progress.pct` as the weighted sum of each stage's completed
    /// fraction (SPEC_FULL.md SS4.5).
    pub fn recompute_progress(&mut self, completed_units: &HashMap<PipelineStage, usize>, planned_units: usize) {
        if planned_units == 0 {
            self.progress.pct = 100.0;
            return;
        }
        let mut pct = 0.0;
        for stage in PipelineStage::ORDER {
            let done = completed_units.get(&stage).copied().unwrap_or(0);
            let fraction = done as f64 / planned_units as f64;
            pct += stage.progress_weight() * fraction.min(1.0);
        }
        self.progress.pct = (pct * 100.0).min(100.0);
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// One source to run through the `ingest -> parse -> chunk -> embed -> index`
/// chain. Sources in a run are independent DAG roots (SPEC_FULL.md SS4.5).
///
/// `kind`/`reference`/`config` mirror the catalog's `Source` record so stage
/// handlers can fetch and parse without a second lookup back into the
/// catalog -- the run plan is their only view of the outside world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePlan {
    pub source_id: String,
    pub kind: kb_core::model::SourceKind,
    #[serde(default)]
    pub reference: serde_json::Value,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Catalog document id pre-created for this source; stage handlers persist
    /// parse/chunk/index results against it instead of minting their own.
    #[serde(default)]
    pub document_id: String,
    /// Resolved `kb_ingestion::ChunkingConfig` for this source, serialized so
    /// the plan stays `Serialize`/`Deserialize` without a direct dependency.
    #[serde(default)]
    pub chunking: serde_json::Value,
}

/// The static shape of a run: which sources to process and how much
/// concurrency to allow across them.
#[derive(Debug, Clone)]
pub struct PipelineRunPlan {
    pub run_id: String,
    pub kb_id: String,
    /// Empty when the caller doesn't need per-workspace quota admission (e.g. tests).
    pub workspace_id: String,
    pub sources: Vec<SourcePlan>,
    pub concurrency: usize,
}

impl PipelineRunPlan {
    pub fn new(run_id: impl Into<String>, kb_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            kb_id: kb_id.into(),
            workspace_id: String::new(),
            sources: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Registers a source with no adapter payload. Only useful for plans
    /// driven by test handlers that never touch `kind`/`reference`/`config`;
    /// real callers should use [`with_source_plan`](Self::with_source_plan).
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.sources.push(SourcePlan {
            source_id: source_id.into(),
            kind: kb_core::model::SourceKind::Text,
            reference: serde_json::Value::Null,
            config: serde_json::Value::Null,
            document_id: String::new(),
            chunking: serde_json::Value::Null,
        });
        self
    }

    pub fn with_source_plan(mut self, source: SourcePlan) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = workspace_id.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(WorkflowError::InvalidDefinition("run has no sources".to_string()));
        }
        Ok(())
    }

    /// Builds the linear per-source stage chain, then lets `WorkflowDag`
    /// validate the union as one DAG (sources are independent roots).
    fn build_steps(&self) -> Vec<WorkflowStep> {
        let mut steps = Vec::new();
        for source in &self.sources {
            let mut prev_id: Option<String> = None;
            for stage in PipelineStage::ORDER {
                let mut step = WorkflowStep::pipeline_stage(&source.source_id, stage).with_fail_on_error(false);
                if let Some(prev) = &prev_id {
                    step = step.with_dependency(prev.clone());
                }
                prev_id = Some(step.id.clone());
                steps.push(step);
            }
        }
        steps
    }
}

/// Drives pipeline runs: creates the per-run DAG from a `PipelineRunPlan`,
/// schedules ready steps with bounded concurrency, and applies pause/resume/
/// cancel transitions against `RunState`.
#[derive(Clone)]
pub struct WorkflowEngine {
    runs: Arc<RwLock<HashMap<String, RunExecution>>>,
    executor: Arc<dyn StepExecutor>,
    quotas: Option<Arc<QuotaManager>>,
}

struct RunExecution {
    plan: PipelineRunPlan,
    dag: WorkflowDag,
    run: PipelineRun,
    context: ExecutionContext,
    cancel_flag: Arc<RwLock<bool>>,
    results: HashMap<String, StepResult>,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            executor: Arc::new(DefaultStepExecutor::new()),
            quotas: None,
        }
    }

    pub fn with_executor(executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            executor,
            quotas: None,
        }
    }

    /// Enforces SPEC_FULL.md SS5's `ConcurrentRuns` admission against this workspace's
    /// quota on every `start_run`/terminal transition. A workspace with no registered
    /// quotas is auto-provisioned on first use at `TenantTier::Professional` -- this
    /// crate has no separate tenant-onboarding flow, so admission has to work the first
    /// time a workspace starts a run.
    pub fn with_quotas(mut self, quotas: Arc<QuotaManager>) -> Self {
        self.quotas = Some(quotas);
        self
    }

    fn ensure_registered(quotas: &QuotaManager, workspace_id: &str) {
        if quotas.get_usage(workspace_id, QuotaType::ConcurrentRuns).is_none() {
            let tenant = Tenant {
                id: workspace_id.to_string(),
                ..Tenant::new(workspace_id, workspace_id, "system", TenantTier::Professional)
            };
            quotas.register_tenant(&tenant);
        }
    }

    /// Validates the plan, builds its DAG, records the run as `queued`, and
    /// spawns the scheduling loop. Returns the run id immediately.
    pub async fn start_run(&self, plan: PipelineRunPlan) -> Result<String> {
        plan.validate()?;

        if let Some(quotas) = &self.quotas {
            if !plan.workspace_id.is_empty() {
                Self::ensure_registered(quotas, &plan.workspace_id);
                quotas
                    .increment(&plan.workspace_id, QuotaType::ConcurrentRuns, 1)
                    .map_err(|err| WorkflowError::QuotaExceeded(err.to_string()))?;
            }
        }

        let steps = plan.build_steps();
        let dag = WorkflowDag::new(steps)?;

        let mut run = PipelineRun::new(plan.run_id.clone(), plan.kb_id.clone());
        run.counters.docs_total = plan.sources.len() as u64;
        run.state = RunState::Running;
        run.started_at = Some(chrono::Utc::now());

        let sources_json = serde_json::to_value(&plan.sources).unwrap_or(serde_json::Value::Null);
        let context = ExecutionContext::new(&plan.kb_id, &plan.run_id)
            .with_variable("sources", sources_json)
            .with_variable("workspace_id", serde_json::Value::String(plan.workspace_id.clone()));
        let cancel_flag = Arc::new(RwLock::new(false));
        let run_id = plan.run_id.clone();

        {
            let mut runs = self.runs.write().await;
            runs.insert(
                run_id.clone(),
                RunExecution { plan, dag, run, context, cancel_flag: cancel_flag.clone(), results: HashMap::new() },
            );
        }

        tracing::info!(run_id = %run_id, "pipeline run started");

        let engine = self.clone();
        let spawned_run_id = run_id.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.run_loop(&spawned_run_id).await {
                tracing::error!(run_id = %spawned_run_id, error = %err, "pipeline run loop exited with error");
            }
        });

        Ok(run_id)
    }

    async fn run_loop(&self, run_id: &str) -> Result<()> {
        loop {
            let cancelled = {
                let runs = self.runs.read().await;
                let execution = runs.get(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
                *execution.cancel_flag.read().await
            };
            if cancelled {
                self.mark_cancelled(run_id).await?;
                break;
            }

            let (steps_to_run, concurrency) = {
                let runs = self.runs.read().await;
                let execution = runs.get(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
                if execution.run.state == RunState::Paused {
                    (Vec::new(), execution.plan.concurrency)
                } else {
                    let completed: HashSet<String> = execution.completed_step_ids();
                    let running: HashSet<String> = execution.running_step_ids();
                    let ready: Vec<String> = execution
                        .dag
                        .get_ready_steps(&completed)
                        .into_iter()
                        .filter(|id| !running.contains(id))
                        .collect();
                    let room = execution.plan.concurrency.saturating_sub(running.len());
                    (ready.into_iter().take(room).collect(), execution.plan.concurrency)
                }
            };
            let _ = concurrency;

            if steps_to_run.is_empty() {
                let (no_running, nothing_ready, paused) = {
                    let runs = self.runs.read().await;
                    let execution = runs.get(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
                    let completed = execution.completed_step_ids();
                    (
                        execution.running_step_ids().is_empty(),
                        execution.dag.get_ready_steps(&completed).is_empty(),
                        execution.run.state == RunState::Paused,
                    )
                };

                if !paused && no_running && nothing_ready {
                    self.mark_finished(run_id).await?;
                    break;
                }

                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                continue;
            }

            for step_id in steps_to_run {
                {
                    let mut runs = self.runs.write().await;
                    if let Some(execution) = runs.get_mut(run_id) {
                        execution.mark_running(&step_id);
                    }
                }
                let engine = self.clone();
                let rid = run_id.to_string();
                tokio::spawn(async move {
                    if let Err(err) = engine.execute_step(&rid, &step_id).await {
                        tracing::error!(run_id = %rid, step_id = %step_id, error = %err, "step execution failed");
                    }
                });
            }

            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }
        Ok(())
    }

    async fn execute_step(&self, run_id: &str, step_id: &str) -> Result<()> {
        let (step, context) = {
            let runs = self.runs.read().await;
            let execution = runs.get(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
            let step = execution
                .dag
                .get_step(step_id)
                .ok_or_else(|| WorkflowError::InvalidDefinition(format!("step not found: {step_id}")))?
                .clone();
            (step, execution.context.clone())
        };

        let result = self.executor.execute_step(&step, &context).await?;

        let mut runs = self.runs.write().await;
        let execution = runs.get_mut(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
        execution.apply_result(&step, result);
        Ok(())
    }

    async fn mark_finished(&self, run_id: &str) -> Result<()> {
        let mut runs = self.runs.write().await;
        let execution = runs.get_mut(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;

        execution.run.state = if execution.run.counters.docs_done > 0 {
            RunState::Completed
        } else {
            RunState::Failed
        };
        execution.run.finished_at = Some(chrono::Utc::now());
        self.release_run_quota(&execution.plan.workspace_id);
        tracing::info!(run_id = %run_id, state = ?execution.run.state, "pipeline run finished");
        Ok(())
    }

    async fn mark_cancelled(&self, run_id: &str) -> Result<()> {
        let mut runs = self.runs.write().await;
        let execution = runs.get_mut(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
        execution.run.state = RunState::Cancelled;
        execution.run.finished_at = Some(chrono::Utc::now());
        self.release_run_quota(&execution.plan.workspace_id);
        tracing::info!(run_id = %run_id, "pipeline run cancelled");
        Ok(())
    }

    fn release_run_quota(&self, workspace_id: &str) {
        if let Some(quotas) = &self.quotas {
            if !workspace_id.is_empty() {
                quotas.decrement(workspace_id, QuotaType::ConcurrentRuns, 1);
            }
        }
    }

    pub async fn pause_run(&self, run_id: &str) -> Result<()> {
        let mut runs = self.runs.write().await;
        let execution = runs.get_mut(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
        if execution.run.state != RunState::Running {
            return Err(WorkflowError::NotRunning(run_id.to_string()));
        }
        execution.run.state = RunState::Paused;
        Ok(())
    }

    pub async fn resume_run(&self, run_id: &str) -> Result<()> {
        let mut runs = self.runs.write().await;
        let execution = runs.get_mut(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
        if execution.run.state != RunState::Paused {
            return Err(WorkflowError::InvalidDefinition(format!("run is not paused: {:?}", execution.run.state)));
        }
        execution.run.state = RunState::Running;
        Ok(())
    }

    pub async fn cancel_run(&self, run_id: &str) -> Result<()> {
        let runs = self.runs.read().await;
        let execution = runs.get(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
        *execution.cancel_flag.write().await = true;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<PipelineRun> {
        let runs = self.runs.read().await;
        let execution = runs.get(run_id).ok_or_else(|| WorkflowError::NotFound(run_id.to_string()))?;
        Ok(execution.run.clone())
    }
}

impl RunExecution {
    fn completed_step_ids(&self) -> HashSet<String> {
        self.dag
            .get_all_steps()
            .values()
            .filter(|s| self.step_state(&s.id) == Some(StepState::Completed))
            .map(|s| s.id.clone())
            .collect()
    }

    fn running_step_ids(&self) -> HashSet<String> {
        self.dag
            .get_all_steps()
            .values()
            .filter(|s| self.step_state(&s.id) == Some(StepState::Running))
            .map(|s| s.id.clone())
            .collect()
    }

    fn step_state(&self, step_id: &str) -> Option<StepState> {
        self.results.get(step_id).map(|r| r.state)
    }

    fn mark_running(&mut self, step_id: &str) {
        self.results.insert(
            step_id.to_string(),
            StepResult { state: StepState::Running, ..StepResult::completed(step_id, 0, None) },
        );
    }

    fn apply_result(&mut self, step: &WorkflowStep, result: StepResult) {
        use crate::step::StepAction;
        let stage = match &step.action {
            StepAction::PipelineStage { stage, .. } => Some(*stage),
            _ => None,
        };

        if let Some(stage) = stage {
            let level = match result.state {
                StepState::Failed => StageEventLevel::Error,
                StepState::Skipped => StageEventLevel::Warn,
                _ => StageEventLevel::Info,
            };
            let source_id = match &step.action {
                StepAction::PipelineStage { source_id, .. } => Some(source_id.clone()),
                _ => None,
            };
            self.run.push_event(StageEvent {
                ts: chrono::Utc::now(),
                stage,
                level,
                source_id,
                document_id: None,
                chunk_id: None,
                message: match result.state {
                    StepState::Completed => format!("{} completed", stage.as_str()),
                    StepState::Failed => result.error.clone().unwrap_or_default(),
                    StepState::Skipped => result.error.clone().unwrap_or_default(),
                    _ => String::new(),
                },
                detail: result.output.clone(),
            });

            match (stage, result.state) {
                (PipelineStage::Index, StepState::Completed) => self.run.counters.docs_done += 1,
                (PipelineStage::Index, StepState::Failed) => self.run.counters.docs_failed += 1,
                _ => {}
            }

            let mut completed_units = HashMap::new();
            for s in PipelineStage::ORDER {
                let count = self
                    .dag
                    .get_all_steps()
                    .values()
                    .filter(|st| matches!(&st.action, StepAction::PipelineStage { stage, .. } if *stage == s))
                    .filter(|st| self.step_state(&st.id) == Some(StepState::Completed) || st.id == step.id && result.state == StepState::Completed)
                    .count();
                completed_units.insert(s, count);
            }
            let planned = self.plan.sources.len();
            self.run.recompute_progress(&completed_units, planned);
        }

        self.results.insert(step.id.clone(), result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> PipelineRunPlan {
        PipelineRunPlan::new("run-1", "kb-1").with_source("source-a")
    }

    #[tokio::test]
    async fn test_run_plan_validates_sources_present() {
        let empty = PipelineRunPlan::new("run-1", "kb-1");
        assert!(empty.validate().is_err());
        assert!(plan().validate().is_ok());
    }

    #[tokio::test]
    async fn test_start_run_reaches_completed_when_handlers_succeed() {
        use crate::execution::StageHandler;
        use async_trait::async_trait;

        struct Ok5;
        #[async_trait]
        impl StageHandler for Ok5 {
            async fn run(&self, _source_id: &str, _ctx: &ExecutionContext) -> std::result::Result<Option<serde_json::Value>, String> {
                Ok(None)
            }
        }

        let executor = DefaultStepExecutor::new()
            .with_handler(PipelineStage::Ingest, Arc::new(Ok5))
            .with_handler(PipelineStage::Parse, Arc::new(Ok5))
            .with_handler(PipelineStage::Chunk, Arc::new(Ok5))
            .with_handler(PipelineStage::Embed, Arc::new(Ok5))
            .with_handler(PipelineStage::Index, Arc::new(Ok5));

        let engine = WorkflowEngine::with_executor(Arc::new(executor));
        let run_id = engine.start_run(plan()).await.unwrap();

        for _ in 0..50 {
            let run = engine.get_run(&run_id).await.unwrap();
            if run.state.is_terminal() {
                assert_eq!(run.state, RunState::Completed);
                return;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }
        panic!("run did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn test_concurrent_runs_quota_blocks_admission() {
        let quotas = Arc::new(QuotaManager::new());
        let engine = WorkflowEngine::new().with_quotas(quotas.clone());

        let workspace_id = "ws-quota-test";
        let first = PipelineRunPlan::new("run-1", "kb-1").with_source("source-a").with_workspace(workspace_id);
        engine.start_run(first).await.unwrap();
        quotas.set_custom_limit(workspace_id, QuotaType::ConcurrentRuns, 1);

        let second = PipelineRunPlan::new("run-2", "kb-1").with_source("source-a").with_workspace(workspace_id);
        let err = engine.start_run(second).await.unwrap_err();
        assert_eq!(err.kind(), kb_core::ErrorKind::ResourceExhausted);
    }

    #[tokio::test]
    async fn test_pause_then_resume_round_trips_state() {
        let engine = WorkflowEngine::new();
        let run_id = engine.start_run(plan()).await.unwrap();
        engine.pause_run(&run_id).await.unwrap();
        assert_eq!(engine.get_run(&run_id).await.unwrap().state, RunState::Paused);
        engine.resume_run(&run_id).await.unwrap();
        assert_eq!(engine.get_run(&run_id).await.unwrap().state, RunState::Running);
    }

    #[test]
    fn test_stage_log_drops_oldest_info_first() {
        let mut run = PipelineRun::new("run-1", "kb-1");
        run.stage_log_cap = 2;
        for i in 0..3 {
            run.push_event(StageEvent {
                ts: chrono::Utc::now(),
                stage: PipelineStage::Parse,
                level: StageEventLevel::Info,
                source_id: None,
                document_id: None,
                chunk_id: None,
                message: format!("event {i}"),
                detail: None,
            });
        }
        assert_eq!(run.stage_log.len(), 2);
        assert_eq!(run.stage_log[0].message, "event 1");
    }

    #[test]
    fn test_stage_log_never_drops_warn_or_error() {
        let mut run = PipelineRun::new("run-1", "kb-1");
        run.stage_log_cap = 1;
        run.push_event(StageEvent {
            ts: chrono::Utc::now(),
            stage: PipelineStage::Embed,
            level: StageEventLevel::Error,
            source_id: None,
            document_id: None,
            chunk_id: None,
            message: "first error".to_string(),
            detail: None,
        });
        run.push_event(StageEvent {
            ts: chrono::Utc::now(),
            stage: PipelineStage::Embed,
            level: StageEventLevel::Error,
            source_id: None,
            document_id: None,
            chunk_id: None,
            message: "second error".to_string(),
            detail: None,
        });
        assert_eq!(run.stage_log.len(), 2);
    }
}
