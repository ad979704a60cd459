//! Free-text tool-call extraction.
//!
//! Some backends describe tool calls inside assistant text instead of the
//! structured `tool_calls` field. Three formats are accepted, checked in
//! order, first match wins:
//!
//! 1. `[TOOL_REQUEST] {...} [END_TOOL_REQUEST]`
//! 2. fenced ```` ```tool_code ```` blocks
//! 3. `<function_call> {...} </function_call>` tags
//!
//! Matched spans are removed from the content and each request becomes a
//! tool call with a freshly generated id. Anything that matches none of the
//! formats stays plain content.

use crate::agent::types::{AssistantToolCall, FunctionCall};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// System note appended after a free-text extraction, telling the model to
/// use the structured tool-call interface on the next turn.
pub const STRUCTURED_INTERFACE_NUDGE: &str = "Your last message described tool calls in plain \
text. Use the structured tool-call interface instead of writing them into the response body.";

/// Tool calls recovered from assistant text, plus the scrubbed content.
#[derive(Debug, Clone)]
pub struct ExtractedCalls {
    /// Recovered calls, in order of appearance
    pub calls: Vec<AssistantToolCall>,
    /// Content with the matched spans removed
    pub cleaned_content: String,
}

fn tool_request_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\[TOOL_REQUEST\](.*?)\[END_TOOL_REQUEST\]").expect("static pattern")
    })
}

fn tool_code_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```tool_code\s+(.*?)```").expect("static pattern"))
}

fn function_call_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<function_call>\s*(.*?)\s*</function_call>").expect("static pattern")
    })
}

fn call_style_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^(\w+)\((.*)\)$").expect("static pattern"))
}

fn key_value_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\w+)=(?:"([^"]*)"|'([^']*)'|([^,\s)]+))"#).expect("static pattern")
    })
}

/// Scan assistant content for free-text tool requests. Returns `None` when
/// no accepted format matches.
pub fn extract_tool_calls(content: &str) -> Option<ExtractedCalls> {
    let patterns = [
        tool_request_pattern(),
        tool_code_pattern(),
        function_call_pattern(),
    ];

    for pattern in patterns {
        let mut calls = Vec::new();
        for capture in pattern.captures_iter(content) {
            let body = capture.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            match parse_request_body(body) {
                Some((name, arguments)) => calls.push(make_call(name, arguments)),
                None => warn!("Unparseable tool request body: {}", truncate(body, 120)),
            }
        }
        if !calls.is_empty() {
            let cleaned_content = pattern.replace_all(content, "").trim().to_string();
            debug!("Extracted {} tool calls from assistant content", calls.len());
            return Some(ExtractedCalls {
                calls,
                cleaned_content,
            });
        }
    }

    None
}

fn make_call(name: String, arguments: Value) -> AssistantToolCall {
    AssistantToolCall {
        id: format!("call_{}", Uuid::new_v4().simple()),
        call_type: "function".to_string(),
        function: FunctionCall {
            name,
            arguments: arguments.to_string(),
        },
    }
}

/// Parse one request body: either `{"name": ..., "arguments": ...}` JSON or
/// a `name(args)` call expression.
fn parse_request_body(body: &str) -> Option<(String, Value)> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let name = map.get("name")?.as_str()?.to_string();
        let arguments = match map.get("arguments") {
            Some(Value::Object(args)) => Value::Object(args.clone()),
            Some(Value::String(raw)) => serde_json::from_str(raw)
                .unwrap_or_else(|_| single_field("text", raw)),
            _ => Value::Object(Map::new()),
        };
        return Some((name, arguments));
    }

    let capture = call_style_pattern().captures(body)?;
    let name = capture[1].to_string();
    let args_str = capture[2].trim();

    let arguments = if args_str.is_empty() {
        Value::Object(Map::new())
    } else if args_str.starts_with('{') && args_str.ends_with('}') {
        serde_json::from_str(args_str).unwrap_or_else(|_| single_field("query", args_str))
    } else {
        let mut map = Map::new();
        for kv in key_value_pattern().captures_iter(args_str) {
            let key = kv[1].to_string();
            let value = kv
                .get(2)
                .or_else(|| kv.get(3))
                .or_else(|| kv.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            map.insert(key, Value::String(value.to_string()));
        }
        if map.is_empty() {
            single_field("query", args_str)
        } else {
            Value::Object(map)
        }
    };

    Some((name, arguments))
}

fn single_field(key: &str, value: &str) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), Value::String(value.to_string()));
    Value::Object(map)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_tool_request_blocks() {
        let content =
            r#"I'll check. [TOOL_REQUEST]{"name":"time","arguments":{}}[END_TOOL_REQUEST]"#;
        let extracted = extract_tool_calls(content).unwrap();

        assert_eq!(extracted.calls.len(), 1);
        assert_eq!(extracted.calls[0].function.name, "time");
        assert_eq!(
            serde_json::from_str::<Value>(&extracted.calls[0].function.arguments).unwrap(),
            json!({})
        );
        assert_eq!(extracted.cleaned_content, "I'll check.");
        assert!(extracted.calls[0].id.starts_with("call_"));
    }

    #[test]
    fn extracts_fenced_tool_code_call_expression() {
        let content = "Let me search.\n```tool_code\nweb_search(query=\"rust agents\")\n```";
        let extracted = extract_tool_calls(content).unwrap();

        assert_eq!(extracted.calls[0].function.name, "web_search");
        let args: Value = serde_json::from_str(&extracted.calls[0].function.arguments).unwrap();
        assert_eq!(args, json!({"query": "rust agents"}));
        assert_eq!(extracted.cleaned_content, "Let me search.");
    }

    #[test]
    fn extracts_function_call_tags() {
        let content = r#"<function_call>{"name":"read_file","arguments":{"path":"a.txt"}}</function_call>"#;
        let extracted = extract_tool_calls(content).unwrap();

        assert_eq!(extracted.calls[0].function.name, "read_file");
        let args: Value = serde_json::from_str(&extracted.calls[0].function.arguments).unwrap();
        assert_eq!(args, json!({"path": "a.txt"}));
        assert!(extracted.cleaned_content.is_empty());
    }

    #[test]
    fn tool_request_takes_precedence_over_other_formats() {
        let content = concat!(
            r#"[TOOL_REQUEST]{"name":"time","arguments":{}}[END_TOOL_REQUEST]"#,
            "\n<function_call>{\"name\":\"other\",\"arguments\":{}}</function_call>"
        );
        let extracted = extract_tool_calls(content).unwrap();
        assert_eq!(extracted.calls.len(), 1);
        assert_eq!(extracted.calls[0].function.name, "time");
    }

    #[test]
    fn string_arguments_are_decoded_when_possible() {
        let content = r#"[TOOL_REQUEST]{"name":"t","arguments":"{\"n\":1}"}[END_TOOL_REQUEST]"#;
        let extracted = extract_tool_calls(content).unwrap();
        let args: Value = serde_json::from_str(&extracted.calls[0].function.arguments).unwrap();
        assert_eq!(args, json!({"n": 1}));
    }

    #[test]
    fn plain_content_is_not_extracted() {
        assert!(extract_tool_calls("Just a normal answer about tools.").is_none());
        assert!(extract_tool_calls("").is_none());
    }

    #[test]
    fn multiple_requests_preserve_order() {
        let content = concat!(
            r#"[TOOL_REQUEST]{"name":"first","arguments":{}}[END_TOOL_REQUEST]"#,
            r#" then [TOOL_REQUEST]{"name":"second","arguments":{}}[END_TOOL_REQUEST]"#
        );
        let extracted = extract_tool_calls(content).unwrap();
        assert_eq!(extracted.calls.len(), 2);
        assert_eq!(extracted.calls[0].function.name, "first");
        assert_eq!(extracted.calls[1].function.name, "second");
        assert_ne!(extracted.calls[0].id, extracted.calls[1].id);
    }
}
