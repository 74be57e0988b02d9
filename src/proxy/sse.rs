//! Opportunistic usage extraction from server-sent-event streams.
//!
//! The dispatcher tees every chunk it forwards into this scanner. It splits
//! the byte stream into SSE `data:` lines (tolerating payloads that straddle
//! chunk boundaries) and remembers the most recent usage figures seen, so
//! that when the stream ends a usage record can be written without ever
//! buffering the body.
//!
//! Shapes handled:
//! - OpenAI terminal chunk: `{"usage": {"prompt_tokens": ..,
//!   "completion_tokens": .., "total_tokens": ..}}`
//! - Anthropic `message_start`: `{"type": "message_start", "message":
//!   {"usage": {"input_tokens": .., "output_tokens": ..}}}`
//! - Anthropic `message_delta`: `{"type": "message_delta", "usage":
//!   {"output_tokens": ..}}`

use serde_json::Value;

/// Token counts extracted from a response. All-zero when the provider never
/// reported usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

impl TokenUsage {
    /// Fill in the total when the provider only reported the parts.
    pub fn normalized(mut self) -> TokenUsage {
        if self.total_tokens == 0 {
            self.total_tokens = self.input_tokens + self.output_tokens;
        }
        self
    }
}

#[derive(Debug, Default)]
pub struct SseUsageScanner {
    pending: Vec<u8>,
    usage: TokenUsage,
}

impl SseUsageScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one forwarded chunk. Complete lines are inspected immediately;
    /// a trailing partial line is kept for the next chunk.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.inspect_line(&line);
        }
    }

    /// Best-effort final figures. Flushes any unterminated trailing line
    /// first.
    pub fn finish(mut self) -> TokenUsage {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.inspect_line(&line);
        }
        self.usage.normalized()
    }

    fn inspect_line(&mut self, line: &[u8]) {
        let Ok(text) = std::str::from_utf8(line) else {
            return;
        };
        let Some(payload) = text.trim().strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return;
        }
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return;
        };
        self.inspect_event(&value);
    }

    fn inspect_event(&mut self, value: &Value) {
        match value.get("type").and_then(|t| t.as_str()) {
            Some("message_start") => {
                if let Some(usage) = value.pointer("/message/usage") {
                    self.merge(usage);
                }
            }
            Some("message_delta") => {
                if let Some(usage) = value.get("usage") {
                    self.merge(usage);
                }
            }
            _ => {
                if let Some(usage) = value.get("usage").filter(|u| u.is_object()) {
                    self.merge(usage);
                }
            }
        }
    }

    /// Merge one usage object, accepting either wire vocabulary. Later
    /// events overwrite the fields they carry and leave the rest alone, so
    /// Anthropic's message_start input count survives the message_delta.
    fn merge(&mut self, usage: &Value) {
        let get = |key: &str| usage.get(key).and_then(|v| v.as_i64());

        if let Some(v) = get("prompt_tokens").or_else(|| get("input_tokens")) {
            self.usage.input_tokens = v;
        }
        if let Some(v) = get("completion_tokens").or_else(|| get("output_tokens")) {
            self.usage.output_tokens = v;
        }
        if let Some(v) = get("total_tokens") {
            self.usage.total_tokens = v;
        }
    }
}

/// Extract usage from a buffered (non-streaming) 2xx response body. Parse
/// failure is tolerated and reports zero tokens.
pub fn extract_buffered_usage(body: &[u8]) -> TokenUsage {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return TokenUsage::default();
    };
    let Some(usage) = value.get("usage") else {
        return TokenUsage::default();
    };

    let get = |key: &str| usage.get(key).and_then(|v| v.as_i64()).unwrap_or(0);

    TokenUsage {
        input_tokens: get("prompt_tokens").max(get("input_tokens")),
        output_tokens: get("completion_tokens").max(get("output_tokens")),
        total_tokens: get("total_tokens"),
    }
    .normalized()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_openai_usage() {
        let body = br#"{"id":"chatcmpl-1","usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let usage = extract_buffered_usage(body);
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn buffered_anthropic_usage_totals_the_parts() {
        let body = br#"{"id":"msg_1","usage":{"input_tokens":7,"output_tokens":3}}"#;
        let usage = extract_buffered_usage(body);
        assert_eq!(usage.input_tokens, 7);
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(usage.total_tokens, 10);
    }

    #[test]
    fn buffered_parse_failure_is_zero() {
        assert_eq!(extract_buffered_usage(b"not json"), TokenUsage::default());
        assert_eq!(extract_buffered_usage(b"{}"), TokenUsage::default());
    }

    #[test]
    fn scans_openai_final_chunk() {
        let mut scanner = SseUsageScanner::new();
        scanner.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"h\"}}]}\n\n");
        scanner.feed(
            b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":8,\"total_tokens\":20}}\n\n",
        );
        scanner.feed(b"data: [DONE]\n\n");

        let usage = scanner.finish();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 8);
        assert_eq!(usage.total_tokens, 20);
    }

    #[test]
    fn merges_anthropic_start_and_delta() {
        let mut scanner = SseUsageScanner::new();
        scanner.feed(b"event: message_start\n");
        scanner.feed(
            b"data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n\n",
        );
        scanner.feed(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"hello\"}}\n\n");
        scanner.feed(b"data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":40}}\n\n");

        let usage = scanner.finish();
        assert_eq!(usage.input_tokens, 25);
        assert_eq!(usage.output_tokens, 40);
        assert_eq!(usage.total_tokens, 65);
    }

    #[test]
    fn handles_payload_split_across_chunks() {
        let mut scanner = SseUsageScanner::new();
        let line = b"data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":9,\"input_tokens\":4}}\n";
        scanner.feed(&line[..20]);
        scanner.feed(&line[20..]);

        let usage = scanner.finish();
        assert_eq!(usage.input_tokens, 4);
        assert_eq!(usage.output_tokens, 9);
        assert_eq!(usage.total_tokens, 13);
    }

    #[test]
    fn stream_without_usage_reports_zero() {
        let mut scanner = SseUsageScanner::new();
        scanner.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\ndata: [DONE]\n\n");
        assert_eq!(scanner.finish(), TokenUsage::default());
    }

    #[test]
    fn trailing_line_without_newline_still_counts() {
        let mut scanner = SseUsageScanner::new();
        scanner.feed(b"data: {\"usage\":{\"prompt_tokens\":2,\"completion_tokens\":1,\"total_tokens\":3}}");
        let usage = scanner.finish();
        assert_eq!(usage.total_tokens, 3);
    }
}
