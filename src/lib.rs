// Cascade Engine Library
// Execution engine for staged prompt pipelines: template resolution,
// output parsing, cost accounting, and the stage/pipeline run loop

pub mod cache;
pub mod config;
pub mod cost;
pub mod error;
pub mod execution;
pub mod invoke;
pub mod output;
pub mod template;

// Re-export error types
pub use error::{EngineError, StageError};

// Re-export configuration types
pub use config::{
    ConditionOp, ConfigValidator, ExtractField, ModelConfig, ModelTier, OutputConfig,
    OutputFormat, PipelineConfig, PipelineResult, PipelineSettings, PipelineStatus, RunSummary,
    StageCondition, StageConfig, StageResult, StageStatus, ValidationError,
};

// Re-export execution types
pub use execution::{
    progress_channel, CancellationToken, PipelineEvent, PipelineExecutor, ProgressReceiver,
    ProgressSender, RunContext, StageRunner,
};

// Re-export invocation and cache boundaries
pub use cache::{fingerprint, CacheStore};
pub use invoke::{ModelInvoker, ModelRequest, ModelResponse};

// Re-export cost accounting
pub use cost::{classify_tier, cost, price_for, CostBreakdown, ModelPrice};

// Re-export templating and parsing
pub use output::{apply_extraction, parse, ParsedOutput};
pub use template::TemplateResolver;
