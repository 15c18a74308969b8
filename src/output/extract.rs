// Field Extraction
// Resolves declared dot-paths against a parsed mapping, with
// required/default semantics. Extracted fields merge over (and shadow)
// same-named base keys.

use crate::config::models::{resolve_path, ExtractField};
use crate::error::StageError;

use serde_json::{Map, Value};

/// Apply extraction specs to a base mapping.
/// Empty specs return the base unchanged.
pub fn apply_extraction(
    base: Map<String, Value>,
    specs: &[ExtractField],
) -> Result<Map<String, Value>, StageError> {
    if specs.is_empty() {
        return Ok(base);
    }

    let mut extracted: Vec<(String, Value)> = Vec::with_capacity(specs.len());

    for spec in specs {
        match resolve_path(&base, &spec.path) {
            Some(value) => extracted.push((spec.name.clone(), value.clone())),
            None => match &spec.default {
                Some(default) => extracted.push((spec.name.clone(), default.clone())),
                None if spec.required => {
                    return Err(StageError::MissingField {
                        name: spec.name.clone(),
                        path: spec.path.clone(),
                    });
                }
                None => {}
            },
        }
    }

    let mut merged = base;
    for (name, value) in extracted {
        merged.insert(name, value);
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Map<String, Value> {
        serde_json::from_value(json!({
            "nested": {"value": 123},
            "x": "base",
        }))
        .unwrap()
    }

    fn spec(name: &str, path: &str, required: bool, default: Option<Value>) -> ExtractField {
        ExtractField {
            name: name.to_string(),
            path: path.to_string(),
            required,
            default,
        }
    }

    #[test]
    fn test_found_binds_under_name() {
        let result = apply_extraction(base(), &[spec("x", "nested.value", true, None)]).unwrap();
        assert_eq!(result["x"], json!(123));
    }

    #[test]
    fn test_missing_required_fails() {
        let err = apply_extraction(base(), &[spec("x", "not.there", true, None)]).unwrap_err();
        assert!(
            matches!(err, StageError::MissingField { ref name, ref path } if name == "x" && path == "not.there")
        );
    }

    #[test]
    fn test_missing_with_default_binds_default() {
        let result =
            apply_extraction(base(), &[spec("x", "not.there", true, Some(json!("d")))]).unwrap();
        assert_eq!(result["x"], json!("d"));
    }

    #[test]
    fn test_missing_optional_is_omitted() {
        let result = apply_extraction(base(), &[spec("y", "not.there", false, None)]).unwrap();
        assert!(!result.contains_key("y"));
        // Base keys survive
        assert_eq!(result["x"], json!("base"));
    }

    #[test]
    fn test_empty_specs_return_base_unchanged() {
        let result = apply_extraction(base(), &[]).unwrap();
        assert_eq!(result, base());
    }
}
