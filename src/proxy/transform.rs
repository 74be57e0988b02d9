//! Pure OpenAI-chat-completions → Anthropic-messages payload translation.
//!
//! Kept free of I/O so the whole mapping is property-testable: the output is
//! a function of the parsed request body and the target model name alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anthropic requires `max_tokens`; this is the fill-in when the client
/// omits it.
pub const DEFAULT_MAX_TOKENS: i64 = 4096;

/// OpenAI-compatible chat completion request. Fields this gateway does not
/// route or translate are preserved in `extra` when the body is re-serialized
/// for OpenAI-format upstreams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChatRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    pub max_tokens: i64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    /// String or structured-content array, preserved verbatim.
    pub content: Value,
}

/// Returned when the transform cannot produce a valid Anthropic request.
#[derive(Debug, PartialEq, Eq)]
pub enum TransformError {
    /// The input had no user/assistant messages after the system extraction.
    NoMessages,
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformError::NoMessages => write!(f, "at least one user or assistant message is required"),
        }
    }
}

impl std::error::Error for TransformError {}

/// Flatten a message's content to plain text: a string is itself, an array of
/// parts contributes each part's `text` field joined by newlines.
pub fn content_to_string(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Translate an OpenAI chat request into the Anthropic messages schema.
///
/// System-role messages concatenate into the top-level `system` field (joined
/// by a blank line), user/assistant messages pass through with their content
/// untouched, and any other role is downgraded to `user`.
pub fn to_anthropic(req: &OpenAiChatRequest, model_name: &str) -> Result<AnthropicRequest, TransformError> {
    let mut out = AnthropicRequest {
        model: model_name.to_string(),
        messages: Vec::new(),
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: String::new(),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stop_sequences: stop_sequences(req.stop.as_ref()),
    };

    for msg in &req.messages {
        match msg.role.as_str() {
            "system" => {
                let text = content_to_string(&msg.content);
                if out.system.is_empty() {
                    out.system = text;
                } else {
                    out.system.push_str("\n\n");
                    out.system.push_str(&text);
                }
            }
            "user" | "assistant" => out.messages.push(AnthropicMessage {
                role: msg.role.clone(),
                content: msg.content.clone(),
            }),
            // Roles Anthropic doesn't know (function, tool, ...) become user turns.
            _ => out.messages.push(AnthropicMessage {
                role: "user".to_string(),
                content: msg.content.clone(),
            }),
        }
    }

    if out.messages.is_empty() {
        return Err(TransformError::NoMessages);
    }

    Ok(out)
}

/// `stop` → `stop_sequences`: a bare string becomes a one-element list, a
/// string array is copied, anything else is dropped.
fn stop_sequences(stop: Option<&Value>) -> Vec<String> {
    match stop {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> OpenAiChatRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn cross_schema_transform_matches_wire_shape() {
        // The exact upstream body for a system + user conversation.
        let req = request(json!({
            "model": "anthropic/claude-3-5-sonnet-20241022",
            "messages": [
                {"role": "system", "content": "Be terse."},
                {"role": "user", "content": "hi"}
            ]
        }));

        let out = to_anthropic(&req, "claude-3-5-sonnet-20241022").unwrap();
        let wire = serde_json::to_value(&out).unwrap();

        assert_eq!(
            wire,
            json!({
                "model": "claude-3-5-sonnet-20241022",
                "max_tokens": 4096,
                "system": "Be terse.",
                "messages": [{"role": "user", "content": "hi"}]
            })
        );
    }

    #[test]
    fn system_messages_concatenate_in_order() {
        let req = request(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "one"},
                {"role": "user", "content": "hi"},
                {"role": "system", "content": "two"}
            ]
        }));

        let out = to_anthropic(&req, "m").unwrap();
        assert_eq!(out.system, "one\n\ntwo");
        assert_eq!(out.messages.len(), 1);
    }

    #[test]
    fn max_tokens_defaults_only_when_absent() {
        let with = request(json!({
            "model": "m", "max_tokens": 128,
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(to_anthropic(&with, "m").unwrap().max_tokens, 128);

        let without = request(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(to_anthropic(&without, "m").unwrap().max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn sampling_params_copy_through() {
        let req = request(json!({
            "model": "m", "temperature": 0.2, "top_p": 0.9, "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = to_anthropic(&req, "m").unwrap();
        assert_eq!(out.temperature, Some(0.2));
        assert_eq!(out.top_p, Some(0.9));
        assert_eq!(out.stream, Some(true));
    }

    #[test]
    fn stop_string_becomes_single_sequence() {
        let req = request(json!({
            "model": "m", "stop": "END",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(to_anthropic(&req, "m").unwrap().stop_sequences, vec!["END"]);
    }

    #[test]
    fn stop_list_is_copied_and_other_shapes_dropped() {
        let list = request(json!({
            "model": "m", "stop": ["a", "b"],
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(to_anthropic(&list, "m").unwrap().stop_sequences, vec!["a", "b"]);

        let odd = request(json!({
            "model": "m", "stop": 42,
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert!(to_anthropic(&odd, "m").unwrap().stop_sequences.is_empty());
    }

    #[test]
    fn unknown_roles_downgrade_to_user_preserving_order() {
        let req = request(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "call the tool"},
                {"role": "tool", "content": "{\"result\": 7}"},
                {"role": "assistant", "content": "done"}
            ]
        }));
        let out = to_anthropic(&req, "m").unwrap();
        let roles: Vec<&str> = out.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "user", "assistant"]);
        assert_eq!(out.messages[1].content, json!("{\"result\": 7}"));
    }

    #[test]
    fn structured_content_passes_through_verbatim() {
        let content = json!([
            {"type": "text", "text": "look at this"},
            {"type": "image_url", "image_url": {"url": "https://example.com/x.png"}}
        ]);
        let req = request(json!({
            "model": "m",
            "messages": [{"role": "user", "content": content}]
        }));
        let out = to_anthropic(&req, "m").unwrap();
        assert_eq!(out.messages[0].content, content);
    }

    #[test]
    fn system_only_input_is_rejected() {
        let req = request(json!({
            "model": "m",
            "messages": [{"role": "system", "content": "alone"}]
        }));
        assert_eq!(to_anthropic(&req, "m").unwrap_err(), TransformError::NoMessages);
    }

    #[test]
    fn content_to_string_joins_part_text() {
        assert_eq!(content_to_string(&json!("plain")), "plain");
        assert_eq!(
            content_to_string(&json!([
                {"type": "text", "text": "a"},
                {"type": "image_url", "image_url": {"url": "u"}},
                {"type": "text", "text": "b"}
            ])),
            "a\nb"
        );
        assert_eq!(content_to_string(&json!(null)), "");
    }
}
