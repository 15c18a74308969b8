// Stage Result Cache Boundary
// The engine defines the fingerprint and the hit/miss decision point;
// storage and population belong to an external collaborator.

use crate::config::models::{ModelConfig, StageResult};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Deterministic cache key for a stage's resolved inputs:
/// sha256 over (stage id, resolved prompt, canonical ModelConfig JSON).
pub fn fingerprint(stage_id: &str, resolved_prompt: &str, model: &ModelConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage_id.as_bytes());
    hasher.update([0]);
    hasher.update(resolved_prompt.as_bytes());
    hasher.update([0]);
    // serde_json emits map keys in struct field order, so this is stable
    // for a given ModelConfig definition
    let model_json = serde_json::to_string(model).unwrap_or_default();
    hasher.update(model_json.as_bytes());

    format!("{:x}", hasher.finalize())
}

/// External keyed store of previously recorded stage results
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a prior result by fingerprint
    async fn get(&self, fingerprint: &str) -> Option<StageResult>;
}
