// Pipeline configuration and result types

pub mod models;
pub mod validate;

pub use models::{
    ConditionOp, ExtractField, ModelConfig, ModelTier, OutputConfig, OutputFormat, PipelineConfig,
    PipelineResult, PipelineSettings, PipelineStatus, RunSummary, StageCondition, StageConfig,
    StageResult, StageStatus,
};
pub use validate::{ConfigValidator, ValidationError};
