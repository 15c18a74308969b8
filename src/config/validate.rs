// Pipeline Validation
// Semantic checks run once per run, before any stage starts.
// Violations abort the run with no StageResults.

use crate::config::models::{PipelineConfig, StageConfig};
use crate::error::EngineError;
use crate::template::reference_tokens;

use std::collections::HashSet;
use std::fmt;

/// A single semantic violation with the config path it was found at
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
    pub path: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at '{}': {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates a pipeline definition before execution
pub struct ConfigValidator;

impl ConfigValidator {
    /// Run all checks, collecting every violation
    pub fn validate(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if config.stages.is_empty() {
            errors.push(ValidationError::new("pipeline has no stages", "stages"));
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut completed_ids: HashSet<&str> = HashSet::new();

        for (index, stage) in config.stages.iter().enumerate() {
            let path = format!("stages[{}]", index);

            if stage.id.is_empty() {
                errors.push(ValidationError::new("stage id is empty", format!("{}.id", path)));
            } else if !seen_ids.insert(&stage.id) {
                errors.push(ValidationError::new(
                    format!("duplicate stage id '{}'", stage.id),
                    format!("{}.id", path),
                ));
            }

            Self::check_stage(stage, &path, &completed_ids, &mut errors);

            completed_ids.insert(&stage.id);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Convenience wrapper producing the engine-level configuration error
    pub fn validate_or_abort(config: &PipelineConfig) -> Result<(), EngineError> {
        ConfigValidator::validate(config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            EngineError::Configuration(joined)
        })
    }

    fn check_stage(
        stage: &StageConfig,
        path: &str,
        completed: &HashSet<&str>,
        errors: &mut Vec<ValidationError>,
    ) {
        if stage.model.max_tokens == 0 {
            errors.push(ValidationError::new(
                "maxTokens must be greater than zero",
                format!("{}.model.maxTokens", path),
            ));
        }

        if !(0.0..=2.0).contains(&stage.model.temperature) {
            errors.push(ValidationError::new(
                format!("temperature {} outside 0.0..=2.0", stage.model.temperature),
                format!("{}.model.temperature", path),
            ));
        }

        // Prompt references may only name stages declared earlier
        Self::check_references(&stage.prompt, &format!("{}.prompt", path), completed, errors);
        if let Some(system_prompt) = &stage.system_prompt {
            Self::check_references(
                system_prompt,
                &format!("{}.systemPrompt", path),
                completed,
                errors,
            );
        }

        if let Some(output) = &stage.output {
            for (i, field) in output.extract.iter().enumerate() {
                let field_path = format!("{}.output.extract[{}]", path, i);
                if field.name.is_empty() {
                    errors.push(ValidationError::new("extract name is empty", format!("{}.name", field_path)));
                }
                if field.path.is_empty() {
                    errors.push(ValidationError::new("extract path is empty", format!("{}.path", field_path)));
                }
            }
        }

        if let Some(skip) = &stage.skip_if {
            let stage_ref = skip.field.split('.').next().unwrap_or("");
            if !completed.contains(stage_ref) {
                errors.push(ValidationError::new(
                    format!(
                        "skip condition references '{}', which is not an earlier stage",
                        stage_ref
                    ),
                    format!("{}.skipIf.field", path),
                ));
            }
        }
    }

    fn check_references(
        template: &str,
        path: &str,
        completed: &HashSet<&str>,
        errors: &mut Vec<ValidationError>,
    ) {
        for token in reference_tokens(template) {
            let stage_ref = token.split('.').next().unwrap_or("");
            if !completed.contains(stage_ref) {
                errors.push(ValidationError::new(
                    format!(
                        "reference '{{{}}}' names '{}', which is not an earlier stage",
                        token, stage_ref
                    ),
                    path,
                ));
            }
        }
    }
}
