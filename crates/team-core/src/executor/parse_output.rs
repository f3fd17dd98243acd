//! Structured-output extraction: find the last well-formed JSON object in
//! an Agent CLI invocation's combined stdout+stderr.
//!
//! Precedence: a whole non-blank line that parses as an object, then the
//! last fenced ` ```json ` block, then the last balanced `{...}` substring
//! found scanning backward. An empty object if nothing parses, so callers
//! can uniformly treat "no structured output" as validation failure rather
//! than a panic.

use serde_json::Value;

pub fn extract_last_json_object(combined: &str) -> Value {
    if let Some(v) = last_line_object(combined) {
        return v;
    }
    if let Some(v) = last_fenced_object(combined) {
        return v;
    }
    if let Some(v) = last_balanced_object(combined) {
        return v;
    }
    Value::Object(serde_json::Map::new())
}

fn last_line_object(text: &str) -> Option<Value> {
    let mut found = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
            if v.is_object() {
                found = Some(v);
            }
        }
    }
    found
}

fn last_fenced_object(text: &str) -> Option<Value> {
    let mut found = None;
    for block in fenced_json_blocks(text) {
        if let Ok(v) = serde_json::from_str::<Value>(block.trim()) {
            if v.is_object() {
                found = Some(v);
            }
        }
    }
    found
}

fn fenced_json_blocks(text: &str) -> Vec<String> {
    let marker = "```json";
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(marker) {
        let after_marker = &rest[start + marker.len()..];
        let Some(end) = after_marker.find("```") else { break };
        blocks.push(after_marker[..end].to_string());
        rest = &after_marker[end + 3..];
    }
    blocks
}

/// Scan backward for the last `{...}` substring with balanced braces that
/// parses as a JSON object.
fn last_balanced_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let close_positions: Vec<usize> =
        bytes.iter().enumerate().filter(|(_, b)| **b == b'}').map(|(i, _)| i).collect();

    for &end in close_positions.iter().rev() {
        let mut depth = 0i32;
        let mut start = None;
        for i in (0..=end).rev() {
            match bytes[i] {
                b'}' => depth += 1,
                b'{' => {
                    depth -= 1;
                    if depth == 0 {
                        start = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        if let Some(start) = start {
            if let Ok(v) = serde_json::from_str::<Value>(&text[start..=end]) {
                if v.is_object() {
                    return Some(v);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_last_whole_line_object() {
        let text = "some log noise\n{\"status\":\"pass\"}\nmore noise";
        let v = extract_last_json_object(text);
        assert_eq!(v["status"], "pass");
    }

    #[test]
    fn falls_back_to_fenced_block_when_no_line_matches() {
        let text = "thinking...\n```json\n{\"plan_summary\":\"x\"}\n```\ndone";
        let v = extract_last_json_object(text);
        assert_eq!(v["plan_summary"], "x");
    }

    #[test]
    fn falls_back_to_balanced_braces_embedded_in_prose() {
        let text = "the agent said {\"ok\":true} right there, nothing else structured";
        let v = extract_last_json_object(text);
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn picks_the_last_of_several_candidates() {
        let text = "{\"status\":\"fail\"}\n{\"status\":\"pass\"}";
        let v = extract_last_json_object(text);
        assert_eq!(v["status"], "pass");
    }

    #[test]
    fn empty_object_when_nothing_parses() {
        let v = extract_last_json_object("no json anywhere here");
        assert_eq!(v, Value::Object(serde_json::Map::new()));
    }
}
