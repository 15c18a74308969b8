// Pipeline Executor
// Drives the ordered stages, owns run state and the final summary, and
// emits lifecycle events. State machine:
// Pending -> Running -> {Success, EarlyExit, Cancelled, Failed}.

use crate::cache::CacheStore;
use crate::config::models::{
    PipelineConfig, PipelineResult, PipelineStatus, RunSummary, StageResult, StageStatus,
};
use crate::config::validate::ConfigValidator;
use crate::error::EngineError;
use crate::execution::context::{CancellationToken, RunContext};
use crate::execution::events::{EventSender, PipelineEvent, ProgressSender};
use crate::execution::runner::StageRunner;
use crate::invoke::ModelInvoker;

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Executes a pipeline definition against a caller-supplied invoker
pub struct PipelineExecutor {
    config: PipelineConfig,
    invoker: Arc<dyn ModelInvoker>,
    cache: Option<Arc<dyn CacheStore>>,
    event_tx: Option<ProgressSender>,
}

impl PipelineExecutor {
    pub fn new(config: PipelineConfig, invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            config,
            invoker,
            cache: None,
            event_tx: None,
        }
    }

    /// Attach an external cache store, consulted when caching is enabled
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a lifecycle event observer
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run the pipeline to a terminal status.
    ///
    /// Returns `Err` only for configuration errors raised before any
    /// stage starts; stage failures land in the returned result with
    /// status `Failed`.
    pub async fn execute(
        &self,
        cancel: CancellationToken,
    ) -> Result<PipelineResult, EngineError> {
        ConfigValidator::validate_or_abort(&self.config)?;

        let start = Instant::now();
        let total = self.config.stages.len();
        let settings = &self.config.settings;
        let runner = StageRunner::new(
            self.invoker.as_ref(),
            settings,
            self.cache.as_deref(),
        );

        let mut ctx = RunContext::new(cancel);
        let mut stages: Vec<StageResult> = Vec::with_capacity(total);
        let mut summary = RunSummary::default();
        let mut final_output: Map<String, Value> = Map::new();
        let mut status = PipelineStatus::Success;
        let mut early_exit_stage: Option<String> = None;
        let mut error: Option<String> = None;

        for (index, stage) in self.config.stages.iter().enumerate() {
            // Cancellation is observed between stages; not-yet-started
            // stages never appear in the result list
            if ctx.cancel.is_cancelled() {
                status = PipelineStatus::Cancelled;
                break;
            }

            self.event_tx.send_event(PipelineEvent::stage_started(
                &stage.id, &stage.name, index, total,
            ));

            let outcome = runner.run(stage, &ctx).await;
            let result = outcome.result;

            match result.status {
                StageStatus::Skipped => {
                    self.event_tx.send_event(PipelineEvent::stage_skipped(
                        &stage.id,
                        result.skip_reason.clone().unwrap_or_default(),
                    ));
                }
                StageStatus::Failed => {
                    self.event_tx.send_event(PipelineEvent::stage_failed(
                        &stage.id,
                        result.error.clone().unwrap_or_default(),
                    ));
                }
                StageStatus::Success => {
                    self.event_tx.send_event(PipelineEvent::stage_completed(
                        &stage.id,
                        result.status,
                        result.duration,
                        result.cost.clone(),
                        result.cached,
                    ));
                }
            }
            self.event_tx
                .send_event(PipelineEvent::progress(index + 1, total));

            accumulate(&mut summary, &result);
            let halted = match result.status {
                StageStatus::Skipped => false,
                StageStatus::Failed => {
                    // Fail-fast: surface the stage's error as the
                    // pipeline-level error
                    status = PipelineStatus::Failed;
                    error = result.error.clone();
                    true
                }
                StageStatus::Success => {
                    ctx.record_output(&stage.id, result.parsed.clone());
                    final_output = result.parsed.clone();

                    if outcome.early_exit && settings.enable_early_exit {
                        status = PipelineStatus::EarlyExit;
                        early_exit_stage = Some(stage.id.clone());
                        true
                    } else {
                        false
                    }
                }
            };

            stages.push(result);
            if halted {
                break;
            }
        }

        summary.total_duration = start.elapsed();

        Ok(PipelineResult {
            status,
            stages,
            summary,
            early_exit_stage,
            error,
            final_output,
        })
    }
}

/// Fold one recorded stage into the running totals. Skipped and cached
/// stages contribute zero cost and zero tokens by construction.
fn accumulate(summary: &mut RunSummary, result: &StageResult) {
    match result.status {
        StageStatus::Success => summary.stages_run += 1,
        StageStatus::Skipped => summary.stages_skipped += 1,
        StageStatus::Failed => summary.stages_failed += 1,
    }
    summary.total_cost += result.cost.total_cost;
    summary.total_input_tokens += result.input_tokens;
    summary.total_output_tokens += result.output_tokens;
}
