// Output Parser
// Converts raw model responses into structured mappings per the declared
// format. Models wrap JSON in prose and code fences, so the json format
// hunts for the actual payload before giving up.

use crate::config::models::{OutputConfig, OutputFormat};
use crate::error::StageError;
use crate::output::extract::apply_extraction;

use serde_json::{Map, Value};

/// A parsed model response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    /// Raw response text, untouched
    pub raw: String,
    /// Structured mapping after format parsing and extraction
    pub parsed: Map<String, Value>,
    /// Format that produced the mapping
    pub format: OutputFormat,
}

/// Parse a raw response per the stage's output config.
/// A missing config means plain text with no extraction.
pub fn parse(raw: &str, config: Option<&OutputConfig>) -> Result<ParsedOutput, StageError> {
    let default_config = OutputConfig::default();
    let config = config.unwrap_or(&default_config);

    let base = match config.format {
        OutputFormat::Text => parse_text(raw),
        OutputFormat::Json => parse_json(raw)?,
        OutputFormat::Markdown => parse_markdown(raw),
    };

    let parsed = apply_extraction(base, &config.extract)?;

    Ok(ParsedOutput {
        raw: raw.to_string(),
        parsed,
        format: config.format,
    })
}

/// Text format: whole input under `content`, plus `Label: value` lines.
/// Later identical labels overwrite earlier ones.
fn parse_text(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("content".to_string(), Value::String(raw.to_string()));

    for line in raw.lines() {
        if let Some((label, value)) = line.split_once(':') {
            let label = label.trim();
            let starts_upper = label.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false);
            if starts_upper
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-' | '&'))
            {
                map.insert(
                    label.to_lowercase(),
                    Value::String(value.trim().to_string()),
                );
            }
        }
    }

    map
}

/// Json format: first fenced code block, else first balanced span, else
/// the raw text. Whatever candidate is found must parse as JSON.
fn parse_json(raw: &str) -> Result<Map<String, Value>, StageError> {
    let candidate = extract_fenced_block(raw)
        .or_else(|| extract_balanced_span(raw))
        .unwrap_or(raw);

    let value: Value = serde_json::from_str(candidate).map_err(|e| StageError::Parse {
        message: e.to_string(),
    })?;

    // Non-object payloads are wrapped so extraction always has a mapping
    Ok(match value {
        Value::Object(map) => map,
        Value::Array(items) => {
            let mut map = Map::new();
            map.insert("items".to_string(), Value::Array(items));
            map
        }
        scalar => {
            let mut map = Map::new();
            map.insert("content".to_string(), scalar);
            map
        }
    })
}

/// First fenced code block's contents, tag line (e.g. ```json) excluded
fn extract_fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_fence = &raw[open + 3..];
    // The opening fence may carry a language tag up to the first newline
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// First balanced `{...}` or `[...]` span, string-aware
fn extract_balanced_span(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let bytes = raw.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Markdown format: heading-delimited sections. Preamble before the first
/// heading lands under `content`; heading text is lowercased with
/// whitespace collapsed to underscores to form the section key.
fn parse_markdown(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    let mut current_key: Option<String> = None;
    let mut buffer = String::new();

    let flush = |key: Option<String>, buffer: &mut String, map: &mut Map<String, Value>| {
        let body = buffer.trim().to_string();
        buffer.clear();
        match key {
            Some(key) => {
                map.insert(key, Value::String(body));
            }
            None if !body.is_empty() => {
                map.insert("content".to_string(), Value::String(body));
            }
            None => {}
        }
    };

    for line in raw.lines() {
        if let Some(heading) = heading_text(line) {
            flush(current_key.take(), &mut buffer, &mut map);
            current_key = Some(section_key(heading));
        } else {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }
    flush(current_key, &mut buffer, &mut map);

    map
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 {
        return None;
    }
    let text = trimmed[hashes..].trim();
    (!text.is_empty()).then_some(text)
}

fn section_key(heading: &str) -> String {
    heading
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::ExtractField;
    use serde_json::json;

    #[test]
    fn test_text_content_and_labels() {
        let raw = "Verdict: pass\nsome prose\nScore: 8\nScore: 9\nnot_a_Label: x";
        let parsed = parse(raw, None).unwrap().parsed;

        assert_eq!(parsed["content"], json!(raw));
        assert_eq!(parsed["verdict"], json!("pass"));
        // Later identical labels overwrite earlier ones
        assert_eq!(parsed["score"], json!("9"));
        assert!(!parsed.contains_key("not_a_label"));
    }

    #[test]
    fn test_text_labels_allow_punctuated_names() {
        let raw = "X-Score: 9\nQ&A: covered\nFinal Verdict: ship it";
        let parsed = parse(raw, None).unwrap().parsed;

        assert_eq!(parsed["x-score"], json!("9"));
        assert_eq!(parsed["q&a"], json!("covered"));
        assert_eq!(parsed["final verdict"], json!("ship it"));
    }

    #[test]
    fn test_json_fenced_block() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\ndone";
        let config = OutputConfig {
            format: OutputFormat::Json,
            extract: Vec::new(),
        };
        let parsed = parse(raw, Some(&config)).unwrap().parsed;
        assert_eq!(parsed["a"], json!(1));
    }

    #[test]
    fn test_json_embedded_span() {
        let raw = r#"The result is {"verdict": "pass", "note": "has } in string"} as requested"#;
        let config = OutputConfig {
            format: OutputFormat::Json,
            extract: Vec::new(),
        };
        let parsed = parse(raw, Some(&config)).unwrap().parsed;
        assert_eq!(parsed["verdict"], json!("pass"));
        assert_eq!(parsed["note"], json!("has } in string"));
    }

    #[test]
    fn test_json_array_wrapped_under_items() {
        let raw = "[1, 2, 3]";
        let config = OutputConfig {
            format: OutputFormat::Json,
            extract: Vec::new(),
        };
        let parsed = parse(raw, Some(&config)).unwrap().parsed;
        assert_eq!(parsed["items"], json!([1, 2, 3]));
    }

    #[test]
    fn test_json_garbage_is_parse_error() {
        let config = OutputConfig {
            format: OutputFormat::Json,
            extract: Vec::new(),
        };
        let err = parse("not json", Some(&config)).unwrap_err();
        assert!(matches!(err, StageError::Parse { .. }));
    }

    #[test]
    fn test_markdown_sections() {
        let raw = "intro text\n\n# First Section\nbody one\n\n## Second Part\nbody two\n";
        let config = OutputConfig {
            format: OutputFormat::Markdown,
            extract: Vec::new(),
        };
        let parsed = parse(raw, Some(&config)).unwrap().parsed;

        assert_eq!(parsed["content"], json!("intro text"));
        assert_eq!(parsed["first_section"], json!("body one"));
        assert_eq!(parsed["second_part"], json!("body two"));
    }

    #[test]
    fn test_extraction_shadows_base_keys() {
        let raw = r#"{"summary": "short", "detail": {"summary": "long"}}"#;
        let config = OutputConfig {
            format: OutputFormat::Json,
            extract: vec![ExtractField {
                name: "summary".to_string(),
                path: "detail.summary".to_string(),
                required: true,
                default: None,
            }],
        };
        let parsed = parse(raw, Some(&config)).unwrap().parsed;
        assert_eq!(parsed["summary"], json!("long"));
    }

    #[test]
    fn test_reparse_of_raw_is_deterministic() {
        let raw = "# Plan\ndo the thing\n\n# Risks\nnone\n";
        let config = OutputConfig {
            format: OutputFormat::Markdown,
            extract: Vec::new(),
        };
        let first = parse(raw, Some(&config)).unwrap();
        let second = parse(&first.raw, Some(&config)).unwrap();
        assert_eq!(first.parsed, second.parsed);
    }
}
