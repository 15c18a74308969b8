// Stage Runner
// Executes one stage: skip check, template resolution, model invocation
// under deadline and retry policy, parsing, cost accounting, and the
// early-exit signal. Halting decisions belong to the executor.

use crate::cache::{fingerprint, CacheStore};
use crate::config::models::{PipelineSettings, StageConfig, StageResult, StageStatus};
use crate::cost;
use crate::error::StageError;
use crate::execution::context::{evaluate_early_exit, RunContext};
use crate::invoke::{ModelInvoker, ModelRequest, ModelResponse};
use crate::output;
use crate::template::TemplateResolver;

use std::time::{Duration, Instant};

/// Escalating delays between retry attempts; retry counts beyond the
/// schedule clamp to the last entry.
const RETRY_DELAYS: &[Duration] = &[
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// What the executor needs to know after one stage attempt
#[derive(Debug)]
pub struct StageOutcome {
    pub result: StageResult,
    /// The stage's early-exit condition held over its parsed output.
    /// Whether that ends the run is the executor's call.
    pub early_exit: bool,
}

impl StageOutcome {
    fn plain(result: StageResult) -> Self {
        Self {
            result,
            early_exit: false,
        }
    }
}

/// Runs a single stage against the caller-supplied invoker
pub struct StageRunner<'a> {
    invoker: &'a dyn ModelInvoker,
    settings: &'a PipelineSettings,
    cache: Option<&'a dyn CacheStore>,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        invoker: &'a dyn ModelInvoker,
        settings: &'a PipelineSettings,
        cache: Option<&'a dyn CacheStore>,
    ) -> Self {
        Self {
            invoker,
            settings,
            cache,
        }
    }

    /// Execute one stage. Every exit path produces a StageResult; errors
    /// become failed results rather than propagating.
    pub async fn run(&self, stage: &StageConfig, ctx: &RunContext) -> StageOutcome {
        // 1. Skip predicate: no cost, no duration
        if let Some(condition) = &stage.skip_if {
            if ctx.evaluate_skip(condition) {
                return StageOutcome::plain(StageResult::skipped(
                    &stage.id,
                    format!("skip condition held: {}", condition.describe()),
                ));
            }
        }

        let start = Instant::now();

        // 2. Template resolution; failure is a configuration error for
        // this stage, never retried
        let resolver = TemplateResolver::new(ctx.outputs());
        let prompt = match resolver.resolve(&stage.prompt) {
            Ok(prompt) => prompt,
            Err(e) => {
                return StageOutcome::plain(StageResult::failed(
                    &stage.id,
                    e.to_string(),
                    start.elapsed(),
                ));
            }
        };
        let system_prompt = match &stage.system_prompt {
            Some(template) => match resolver.resolve(template) {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    return StageOutcome::plain(StageResult::failed(
                        &stage.id,
                        e.to_string(),
                        start.elapsed(),
                    ));
                }
            },
            None => None,
        };

        let key = fingerprint(&stage.id, &prompt, &stage.model);

        // Cache hit: a normal success contributing zero additional
        // cost and duration to this run
        if self.settings.enable_caching {
            if let Some(store) = self.cache {
                if let Some(cached) = store.get(&key).await {
                    return self.finish_cached(stage, cached, key);
                }
            }
        }

        // 3. Invoke under deadline, with the retry schedule
        let request = ModelRequest {
            prompt,
            system_prompt,
            model: stage.model.clone(),
        };
        let response = match self.invoke_with_retry(&request, ctx).await {
            Ok(response) => response,
            Err(e) => {
                return StageOutcome::plain(StageResult::failed(
                    &stage.id,
                    e.to_string(),
                    start.elapsed(),
                ));
            }
        };

        // 4. Parse; a failure here is deterministic for this response
        let breakdown = cost::cost(
            &stage.model.model,
            response.input_tokens,
            response.output_tokens,
        );
        let parsed = match output::parse(&response.text, stage.output.as_ref()) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Tokens were consumed; the failed result still carries
                // the raw response and its cost for diagnosis
                let mut result =
                    StageResult::failed(&stage.id, e.to_string(), start.elapsed());
                result.raw_output = response.text;
                result.input_tokens = response.input_tokens;
                result.output_tokens = response.output_tokens;
                result.cost = breakdown;
                return StageOutcome::plain(result);
            }
        };

        // 6. Early-exit signal, decided by the executor
        let early_exit = stage
            .early_exit_if
            .as_ref()
            .map(|condition| evaluate_early_exit(condition, &parsed.parsed))
            .unwrap_or(false);

        let result = StageResult {
            stage_id: stage.id.clone(),
            status: StageStatus::Success,
            raw_output: parsed.raw,
            parsed: parsed.parsed,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            duration: start.elapsed(),
            cost: breakdown,
            error: None,
            cached: false,
            fingerprint: Some(key),
            skip_reason: None,
        };

        StageOutcome { result, early_exit }
    }

    /// Build the result for a cache hit
    fn finish_cached(
        &self,
        stage: &StageConfig,
        cached: StageResult,
        key: String,
    ) -> StageOutcome {
        let early_exit = stage
            .early_exit_if
            .as_ref()
            .map(|condition| evaluate_early_exit(condition, &cached.parsed))
            .unwrap_or(false);

        let result = StageResult {
            stage_id: stage.id.clone(),
            status: StageStatus::Success,
            raw_output: cached.raw_output,
            parsed: cached.parsed,
            input_tokens: 0,
            output_tokens: 0,
            duration: Duration::ZERO,
            cost: cost::CostBreakdown::zero(&stage.model.model),
            error: None,
            cached: true,
            fingerprint: Some(key),
            skip_reason: None,
        };

        StageOutcome { result, early_exit }
    }

    /// Invoke with the per-stage deadline and escalating retry schedule.
    /// Only retryable failures retry; cancellation skips remaining
    /// attempts. A deadline expiry counts as retryable.
    async fn invoke_with_retry(
        &self,
        request: &ModelRequest,
        ctx: &RunContext,
    ) -> Result<ModelResponse, StageError> {
        let deadline = self.settings.timeout();
        let mut attempt: u32 = 0;

        loop {
            let outcome = match tokio::time::timeout(
                deadline,
                self.invoker.invoke(request, &ctx.cancel),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StageError::retryable(format!(
                    "timed out after {}ms",
                    deadline.as_millis()
                ))),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let retries_left = attempt < self.settings.max_retries;
                    if !e.is_retryable() || !retries_left || ctx.cancel.is_cancelled() {
                        return Err(e);
                    }

                    let delay = RETRY_DELAYS
                        [usize::min(attempt as usize, RETRY_DELAYS.len() - 1)];
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
