//! Incremental parsing of streamed output.
//!
//! While streaming, the accumulated buffer is usually an unfinished JSON
//! document. `parse_partial` closes it as far as it can and reports
//! `Incomplete` for anything that still does not parse or validate; that is
//! the normal state mid-stream. Only `parse_final` can report `Invalid`.

use serde_json::Value;

use super::error::GenerationError;
use crate::schema::{validate, CompiledSchema};

/// Outcome of a parse attempt that did not produce a usable value
#[derive(Debug, Clone)]
pub enum ParseFailure {
    /// Not enough data yet; wait for more
    Incomplete,
    /// The complete payload is unusable
    Invalid(GenerationError),
}

/// Remove a surrounding Markdown code fence (```json ... ```), complete or not
pub fn strip_code_fence(buffer: &str) -> &str {
    let trimmed = buffer.trim_start();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return buffer;
    };

    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => "",
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim_end()
}

/// Close an unfinished JSON text: terminate an open string, drop a dangling
/// comma, fill a dangling colon and close open arrays and objects.
/// Returns `None` when the brackets are already unbalanced.
pub fn repair_json(buffer: &str) -> Option<String> {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in buffer.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.pop() != Some(c) {
                    return None;
                }
            }
            _ => {}
        }
    }

    let mut out = buffer.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    }

    while let Some(closer) = closers.pop() {
        out.push(closer);
    }
    Some(out)
}

/// Attempt to read a usable value out of a partial buffer
pub fn parse_partial(buffer: &str, schema: Option<&CompiledSchema>) -> Result<Value, ParseFailure> {
    let body = strip_code_fence(buffer);
    if body.trim().is_empty() {
        return Err(ParseFailure::Incomplete);
    }

    let repaired = repair_json(body).ok_or(ParseFailure::Incomplete)?;
    let value: Value = serde_json::from_str(&repaired).map_err(|_| ParseFailure::Incomplete)?;

    match schema {
        Some(schema) if validate(schema, &value).is_err() => Err(ParseFailure::Incomplete),
        _ => Ok(value),
    }
}

/// Parse the complete buffer once the stream has finished
pub fn parse_final(buffer: &str, schema: Option<&CompiledSchema>) -> Result<Value, ParseFailure> {
    let body = strip_code_fence(buffer);
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| ParseFailure::Invalid(GenerationError::Malformed(e.to_string())))?;
    check_final(value, schema)
}

/// Validate a complete value
pub fn check_final(value: Value, schema: Option<&CompiledSchema>) -> Result<Value, ParseFailure> {
    if let Some(schema) = schema {
        validate(schema, &value)
            .map_err(|violations| ParseFailure::Invalid(GenerationError::SchemaViolation(violations)))?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compile;
    use serde_json::json;

    #[test]
    fn test_repair_closes_structures() {
        assert_eq!(repair_json("{\"a\":[1,2").as_deref(), Some("{\"a\":[1,2]}"));
        assert_eq!(repair_json("{\"a\":\"hel").as_deref(), Some("{\"a\":\"hel\"}"));
        assert_eq!(repair_json("{\"a\":1,  ").as_deref(), Some("{\"a\":1}"));
        assert_eq!(repair_json("{\"a\":").as_deref(), Some("{\"a\":null}"));
        assert_eq!(repair_json("{\"a\":\"x\\").as_deref(), Some("{\"a\":\"x\"}"));
        assert_eq!(repair_json("{\"a\":\"}\"").as_deref(), Some("{\"a\":\"}\"}"));
        assert_eq!(repair_json("[}"), None);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":"), "{\"a\":");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_partial_stream_prefixes() {
        let schema = compile(["heading"]);

        assert!(matches!(
            parse_partial("{\"root\":", Some(&schema)),
            Err(ParseFailure::Incomplete)
        ));

        let preview = parse_partial("{\"root\":{\"type\":\"root\",\"children\":[]", Some(&schema)).unwrap();
        assert_eq!(preview, json!({ "root": { "type": "root", "children": [] } }));

        assert!(matches!(
            parse_partial("{\"root\":{\"type\":\"root\",\"children\":[{\"type\":\"hea", Some(&schema)),
            Err(ParseFailure::Incomplete)
        ));
    }

    #[test]
    fn test_final_reports_invalid() {
        let schema = compile(Vec::<&str>::new());

        match parse_final("{\"root\":{\"type\":\"root\"", Some(&schema)) {
            Err(ParseFailure::Invalid(GenerationError::Malformed(_))) => {}
            other => panic!("expected malformed, got {:?}", other),
        }

        match parse_final("{\"root\":{\"type\":\"root\",\"children\":[{\"type\":\"list\"}]}}", Some(&schema)) {
            Err(ParseFailure::Invalid(GenerationError::SchemaViolation(v))) => assert!(!v.is_empty()),
            other => panic!("expected schema violation, got {:?}", other),
        }

        assert!(parse_final("{\"root\":{\"type\":\"root\",\"children\":[]}}", Some(&schema)).is_ok());
    }
}
