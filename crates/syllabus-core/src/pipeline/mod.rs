//! The Strategist → Scout → Architect generation chain.
//!
//! A [`Pipeline`] runs its stages strictly in order. Each stage receives the
//! request plus the accumulated [`GenerationContext`] of all earlier stages;
//! any failure, empty output or timeout aborts the whole run. The final
//! stage's output is handed to [`crate::plan::extract_plan`].

pub mod generator;
pub mod prompts;
pub mod retry;
pub mod stage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{PlanError, ValidationError};
use crate::plan::validate::MAX_WEEKS;
use crate::plan::{ValidatedPlan, extract_plan};

pub use generator::{CommandGenerator, TextGenerator};
pub use retry::RetryPolicy;
pub use stage::{ARCHITECT, PromptStage, SCOUT, STRATEGIST, Stage};

// ---------------------------------------------------------------------------
// Request and context
// ---------------------------------------------------------------------------

/// A validated ask: a trimmed, non-empty goal and a week count in `1..=52`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    goal: String,
    weeks: u32,
}

impl GenerationRequest {
    pub fn new(goal: &str, weeks: u32) -> Result<Self, ValidationError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(ValidationError::new("goal", "must not be empty"));
        }
        if !(1..=MAX_WEEKS).contains(&weeks) {
            return Err(ValidationError::new(
                "weeks",
                format!("must be between 1 and {MAX_WEEKS}, got {weeks}"),
            ));
        }
        Ok(Self {
            goal: goal.to_string(),
            weeks,
        })
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn weeks(&self) -> u32 {
        self.weeks
    }
}

/// Outputs produced so far, in stage order. Append-only.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    entries: Vec<(String, String)>,
}

impl GenerationContext {
    pub fn push(&mut self, stage: impl Into<String>, output: String) {
        self.entries.push((stage.into(), output));
    }

    /// Output of the named stage, if it has run.
    pub fn get(&self, stage: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, out)| out.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, o)| (n.as_str(), o.as_str()))
    }

    pub fn last(&self) -> Option<(&str, &str)> {
        self.entries.last().map(|(n, o)| (n.as_str(), o.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upper bound on a single stage call.
    pub stage_timeout: Duration,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Self::DEFAULT_STAGE_TIMEOUT,
            retry: RetryPolicy::none(),
        }
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>, config: PipelineConfig) -> Self {
        Self { stages, config }
    }

    /// The three standard stages, all backed by the same generator.
    pub fn standard(generator: Arc<dyn TextGenerator>, config: PipelineConfig) -> Self {
        Self::new(
            vec![
                Box::new(PromptStage::strategist(generator.clone())),
                Box::new(PromptStage::scout(generator.clone())),
                Box::new(PromptStage::architect(generator)),
            ],
            config,
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order and return the full context.
    ///
    /// Nothing from a failed run is returned; the error names the stage that
    /// gave up.
    pub async fn run(&self, request: &GenerationRequest) -> Result<GenerationContext, PlanError> {
        let started = Instant::now();
        info!(goal = %request.goal(), weeks = request.weeks(), "generation started");

        let mut context = GenerationContext::default();
        for stage in &self.stages {
            let output = self.run_stage(stage.as_ref(), request, &context).await?;
            context.push(stage.name(), output);
        }

        info!(
            stages = context.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation finished"
        );
        Ok(context)
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage,
        request: &GenerationRequest,
        context: &GenerationContext,
    ) -> Result<String, PlanError> {
        let policy = &self.config.retry;
        let mut retry = 0;
        loop {
            let started = Instant::now();
            match self.attempt(stage, request, context).await {
                Ok(output) => {
                    debug!(
                        stage = stage.name(),
                        output_len = output.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "stage completed"
                    );
                    return Ok(output);
                }
                Err(reason) if retry < policy.max_retries => {
                    let delay = policy.delay_for(retry);
                    warn!(
                        stage = stage.name(),
                        %reason,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "stage failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(reason) => {
                    warn!(stage = stage.name(), %reason, "stage failed");
                    return Err(PlanError::upstream(stage.name(), reason));
                }
            }
        }
    }

    async fn attempt(
        &self,
        stage: &dyn Stage,
        request: &GenerationRequest,
        context: &GenerationContext,
    ) -> Result<String, String> {
        let timeout = self.config.stage_timeout;
        match tokio::time::timeout(timeout, stage.produce(request, context)).await {
            Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Ok(Ok(output)) if output.trim().is_empty() => Err("produced no output".to_string()),
            Ok(Ok(output)) => Ok(output),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .finish()
    }
}

/// Run the pipeline and turn the final stage's output into a validated plan.
pub async fn generate_plan(
    pipeline: &Pipeline,
    request: &GenerationRequest,
) -> Result<ValidatedPlan, PlanError> {
    let context = pipeline.run(request).await?;
    let (stage, text) = context
        .last()
        .ok_or_else(|| PlanError::upstream("pipeline", "no stages configured"))?;
    debug!(stage, "extracting plan from final stage output");
    extract_plan(text, request.weeks())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
