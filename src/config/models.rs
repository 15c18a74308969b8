// Pipeline Data Models
// Typed configuration for staged prompt pipelines and the results a run produces

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::cost::CostBreakdown;

/// Immutable pipeline definition, loaded once per run by an external loader
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Unique pipeline id
    pub id: String,

    /// Display name
    pub name: String,

    /// Definition version
    #[serde(default)]
    pub version: Option<String>,

    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,

    /// Ordered stages; later stages may reference earlier outputs
    pub stages: Vec<StageConfig>,

    /// Run-level settings
    #[serde(default)]
    pub settings: PipelineSettings,
}

/// Run-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    /// Consult the external cache store before invoking a stage
    #[serde(default)]
    pub enable_caching: bool,

    /// Honor stage early-exit conditions
    #[serde(default = "default_true")]
    pub enable_early_exit: bool,

    /// Retries after the initial attempt, for retryable failures only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-stage invocation deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Reserved. Stages always execute sequentially in declared order;
    /// template resolution requires all referenced stages to have completed.
    #[serde(default)]
    pub parallel_execution: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    300_000
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enable_caching: false,
            enable_early_exit: true,
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            parallel_execution: false,
        }
    }
}

impl PipelineSettings {
    /// Per-stage deadline as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One unit of work: a model invocation plus its parsing/extraction rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    /// Unique within the pipeline; referenced by later stages' templates
    pub id: String,

    /// Display name
    pub name: String,

    /// Model selection for this stage
    pub model: ModelConfig,

    /// Prompt template with embedded `{stageId.path}` references
    pub prompt: String,

    /// Optional system prompt, templated the same way as the prompt
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// How to parse the raw response and which fields to extract
    #[serde(default)]
    pub output: Option<OutputConfig>,

    /// Skip this stage when the condition holds over prior outputs
    #[serde(default)]
    pub skip_if: Option<StageCondition>,

    /// End the pipeline successfully when the condition holds over this
    /// stage's own parsed output
    #[serde(default)]
    pub early_exit_if: Option<StageCondition>,
}

/// Model selection and sampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Provider id (e.g. "anthropic", "openai")
    pub provider: String,

    /// Model id, matched against the price table
    pub model: String,

    /// Coarse tier override; display/selection only, never pricing
    #[serde(default)]
    pub tier: Option<ModelTier>,

    /// Response token budget
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.7
}

/// Coarse capability/cost classification, display-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Small,
    Medium,
    Large,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Small => write!(f, "small"),
            ModelTier::Medium => write!(f, "medium"),
            ModelTier::Large => write!(f, "large"),
        }
    }
}

/// Declared response format plus extraction specs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    /// How to parse the raw response
    #[serde(default)]
    pub format: OutputFormat,

    /// Named fields to extract from the parsed mapping
    #[serde(default)]
    pub extract: Vec<ExtractField>,
}

/// Supported response formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Whole response under `content`, plus `Label: value` lines
    #[default]
    Text,
    /// First fenced block, else first balanced span, else the raw text
    Json,
    /// Heading-delimited sections
    Markdown,
}

/// One extraction spec: bind `path` from the parsed mapping under `name`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractField {
    /// Key to bind the value under
    pub name: String,

    /// Dot-separated path into the parsed mapping
    pub path: String,

    /// Fail the stage if the path resolves to nothing and no default exists
    #[serde(default)]
    pub required: bool,

    /// Fallback when the path resolves to nothing
    #[serde(default)]
    pub default: Option<Value>,
}

/// Predicate over a parsed-output mapping.
/// For `skip_if` the field path is `stageId.path` against prior outputs;
/// for `early_exit_if` it is a plain path into the stage's own output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCondition {
    /// Dot-path to the value under test
    pub field: String,

    /// Comparison to apply
    #[serde(default)]
    pub op: ConditionOp,

    /// Right-hand side for Equals/NotEquals/Contains
    #[serde(default)]
    pub value: Option<Value>,
}

/// Supported condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOp {
    /// The path resolves to any value
    Exists,
    /// The path resolves to a truthy value (non-false, non-null,
    /// non-empty string, non-zero number)
    #[default]
    Truthy,
    Equals,
    NotEquals,
    /// String or array containment of `value`
    Contains,
}

impl StageCondition {
    /// Evaluate against a resolved value (None = path did not resolve)
    pub fn evaluate(&self, resolved: Option<&Value>) -> bool {
        match self.op {
            ConditionOp::Exists => resolved.is_some(),
            ConditionOp::Truthy => resolved.map(is_truthy).unwrap_or(false),
            ConditionOp::Equals => match (resolved, &self.value) {
                (Some(actual), Some(expected)) => values_equal(actual, expected),
                _ => false,
            },
            ConditionOp::NotEquals => match (resolved, &self.value) {
                (Some(actual), Some(expected)) => !values_equal(actual, expected),
                (None, Some(_)) => true,
                _ => false,
            },
            ConditionOp::Contains => match (resolved, &self.value) {
                (Some(Value::String(haystack)), Some(needle)) => {
                    let needle = match needle {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    haystack.contains(&needle)
                }
                (Some(Value::Array(items)), Some(needle)) => {
                    items.iter().any(|item| values_equal(item, needle))
                }
                _ => false,
            },
        }
    }

    /// Human-readable description, used as the skip reason
    pub fn describe(&self) -> String {
        match (&self.op, &self.value) {
            (ConditionOp::Exists, _) => format!("'{}' exists", self.field),
            (ConditionOp::Truthy, _) => format!("'{}' is truthy", self.field),
            (op, Some(value)) => format!("'{}' {:?} {}", self.field, op, value),
            (op, None) => format!("'{}' {:?}", self.field, op),
        }
    }
}

/// Truthiness for condition evaluation
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("false")
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Loose equality: strings compare against the string form of the other side
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(s), other) | (other, Value::String(s)) => {
            !matches!(other, Value::String(_)) && s == &value_to_display_string(other)
        }
        _ => false,
    }
}

/// String form used by conditions and template substitution:
/// strings raw, scalars via to_string, structures as compact JSON
pub fn value_to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Resolve a dot-separated path against a parsed-output mapping.
/// Numeric segments index into arrays; traversal through a non-container
/// yields None ("not found").
pub fn resolve_path<'a>(base: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = base.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Terminal status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

/// Result of one stage attempt that completed (not per retry)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    /// Stage id from the definition
    pub stage_id: String,

    /// Terminal status
    pub status: StageStatus,

    /// Raw model response text (empty for skipped stages)
    #[serde(default)]
    pub raw_output: String,

    /// Parsed output mapping after extraction
    #[serde(default)]
    pub parsed: Map<String, Value>,

    /// Reported input token count
    #[serde(default)]
    pub input_tokens: u64,

    /// Reported output token count
    #[serde(default)]
    pub output_tokens: u64,

    /// Wall-clock duration of the attempt, retries included
    #[serde(with = "duration_millis")]
    pub duration: Duration,

    /// Derived cost for this stage
    pub cost: CostBreakdown,

    /// Error text when status is Failed
    #[serde(default)]
    pub error: Option<String>,

    /// Whether the result was served from the external cache
    #[serde(default)]
    pub cached: bool,

    /// Cache key for this stage's resolved inputs, present on success so
    /// the external store can populate entries
    #[serde(default)]
    pub fingerprint: Option<String>,

    /// Why the stage was skipped, when status is Skipped
    #[serde(default)]
    pub skip_reason: Option<String>,
}

impl StageResult {
    /// A skipped result: zero cost, zero duration
    pub fn skipped(stage_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let stage_id = stage_id.into();
        Self {
            cost: CostBreakdown::zero(""),
            stage_id,
            status: StageStatus::Skipped,
            raw_output: String::new(),
            parsed: Map::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration: Duration::ZERO,
            error: None,
            cached: false,
            fingerprint: None,
            skip_reason: Some(reason.into()),
        }
    }

    /// A failed result carrying the stage's error text
    pub fn failed(stage_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            cost: CostBreakdown::zero(""),
            stage_id: stage_id.into(),
            status: StageStatus::Failed,
            raw_output: String::new(),
            parsed: Map::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration,
            error: Some(error.into()),
            cached: false,
            fingerprint: None,
            skip_reason: None,
        }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Success,
    EarlyExit,
    Cancelled,
    Failed,
}

/// Aggregated run totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub stages_run: usize,
    pub stages_skipped: usize,
    pub stages_failed: usize,
    #[serde(with = "duration_millis")]
    pub total_duration: Duration,
    pub total_cost: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

/// Final result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Terminal status; a run produces exactly one
    pub status: PipelineStatus,

    /// Results for every stage that was started, in declared order
    pub stages: Vec<StageResult>,

    /// Aggregated totals over stages that actually ran
    pub summary: RunSummary,

    /// Stage that triggered early exit, if any
    #[serde(default)]
    pub early_exit_stage: Option<String>,

    /// Failing stage's error text, when status is Failed
    #[serde(default)]
    pub error: Option<String>,

    /// Parsed output of the last successfully produced stage
    #[serde(default)]
    pub final_output: Map<String, Value>,
}

/// Serialize Durations as integer milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.timeout_ms, 300_000);
        assert!(settings.enable_early_exit);
        assert!(!settings.enable_caching);
        assert!(!settings.parallel_execution);
    }

    #[test]
    fn test_stage_config_from_yaml() {
        let yaml = r#"
id: summarize
name: Summarize
model:
  provider: anthropic
  model: claude-3-5-sonnet
prompt: "Summarize: {fetch.content}"
output:
  format: json
  extract:
    - name: summary
      path: result.summary
      required: true
"#;
        let stage: StageConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(stage.id, "summarize");
        assert_eq!(stage.model.max_tokens, 4096);
        let output = stage.output.unwrap();
        assert_eq!(output.format, OutputFormat::Json);
        assert!(output.extract[0].required);
    }

    #[test]
    fn test_resolve_path_nested() {
        let base: Map<String, Value> = serde_json::from_value(json!({
            "nested": {"value": 123},
            "items": [{"name": "a"}, {"name": "b"}],
        }))
        .unwrap();

        assert_eq!(resolve_path(&base, "nested.value"), Some(&json!(123)));
        assert_eq!(resolve_path(&base, "items.1.name"), Some(&json!("b")));
        assert_eq!(resolve_path(&base, "nested.missing"), None);
        // Traversal through a scalar is "not found"
        assert_eq!(resolve_path(&base, "nested.value.deeper"), None);
    }

    #[test]
    fn test_condition_truthy_and_equals() {
        let base: Map<String, Value> = serde_json::from_value(json!({
            "done": true,
            "verdict": "pass",
            "count": 0,
        }))
        .unwrap();

        let truthy = StageCondition {
            field: "done".to_string(),
            op: ConditionOp::Truthy,
            value: None,
        };
        assert!(truthy.evaluate(resolve_path(&base, "done")));

        let zero = StageCondition {
            field: "count".to_string(),
            op: ConditionOp::Truthy,
            value: None,
        };
        assert!(!zero.evaluate(resolve_path(&base, "count")));

        let equals = StageCondition {
            field: "verdict".to_string(),
            op: ConditionOp::Equals,
            value: Some(json!("pass")),
        };
        assert!(equals.evaluate(resolve_path(&base, "verdict")));
    }

    #[test]
    fn test_condition_contains() {
        let base: Map<String, Value> = serde_json::from_value(json!({
            "tags": ["urgent", "review"],
            "text": "needs more work",
        }))
        .unwrap();

        let in_array = StageCondition {
            field: "tags".to_string(),
            op: ConditionOp::Contains,
            value: Some(json!("urgent")),
        };
        assert!(in_array.evaluate(resolve_path(&base, "tags")));

        let in_string = StageCondition {
            field: "text".to_string(),
            op: ConditionOp::Contains,
            value: Some(json!("more work")),
        };
        assert!(in_string.evaluate(resolve_path(&base, "text")));
    }

    #[test]
    fn test_display_string_forms() {
        assert_eq!(value_to_display_string(&json!("plain")), "plain");
        assert_eq!(value_to_display_string(&json!(42)), "42");
        assert_eq!(value_to_display_string(&json!(null)), "null");
        assert_eq!(
            value_to_display_string(&json!({"a": 1})),
            "{\"a\":1}"
        );
    }
}
