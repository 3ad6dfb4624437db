//! Streaming SSE colouriser.
//!
//! A stateful adapter over the raw upstream byte flow: buffer bytes, emit one
//! framed event at a time, rewrite the `data:` JSON with ANSI-wrapped text
//! fields, and forward everything else untouched. Colouring is best-effort
//! and never data-lossy: any event that fails to decode or parse is forwarded
//! verbatim, and a wrapped payload strips back to the original.

use std::collections::HashMap;

use serde_json::Value;

use crate::palette::RolePalette;

const LF_DELIM: &[u8] = b"\n\n";
const CRLF_DELIM: &[u8] = b"\r\n\r\n";

/// Colours streamed chat SSE events with role-specific ANSI sequences.
///
/// Feed raw chunks via [`feed`](SseColorizer::feed); call
/// [`finish`](SseColorizer::finish) at stream end to flush residual bytes
/// that never saw a delimiter. One instance per stream: it owns the framing
/// buffer and the per-choice role memory (later deltas omit `role`).
pub struct SseColorizer {
    palette: RolePalette,
    buffer: Vec<u8>,
    /// Last seen role per choice index, carried across frames.
    choice_roles: HashMap<usize, String>,
}

impl Default for SseColorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SseColorizer {
    pub fn new() -> Self {
        Self::with_palette(RolePalette::default())
    }

    pub fn with_palette(palette: RolePalette) -> Self {
        Self {
            palette,
            buffer: Vec::new(),
            choice_roles: HashMap::new(),
        }
    }

    /// Buffers `chunk` and returns the colourised bytes of every complete
    /// event found so far. Bytes after the last delimiter stay buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        loop {
            let (index, delim) = match find_subslice(&self.buffer, LF_DELIM) {
                Some(i) => (i, LF_DELIM),
                None => match find_subslice(&self.buffer, CRLF_DELIM) {
                    Some(i) => (i, CRLF_DELIM),
                    None => break,
                },
            };
            let event: Vec<u8> = self.buffer.drain(..index + delim.len()).collect();
            let (event_bytes, delim_bytes) = event.split_at(index);
            out.extend_from_slice(&self.process_event(event_bytes, delim_bytes));
        }
        out
    }

    /// Flushes whatever is left in the framing buffer, unmodified.
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Rewrites one framed event; on any parse failure the original bytes
    /// come back with their delimiter untouched.
    fn process_event(&mut self, event_bytes: &[u8], delimiter: &[u8]) -> Vec<u8> {
        let passthrough = || {
            let mut v = event_bytes.to_vec();
            v.extend_from_slice(delimiter);
            v
        };

        let Ok(event_text) = std::str::from_utf8(event_bytes) else {
            return passthrough();
        };
        if event_text.trim().is_empty() {
            return passthrough();
        }

        let mut other_lines: Vec<&str> = Vec::new();
        let mut data_lines: Vec<&str> = Vec::new();
        for line in event_text.lines() {
            match line.strip_prefix("data:") {
                Some(rest) => data_lines.push(rest.trim_start()),
                None => other_lines.push(line),
            }
        }
        if data_lines.is_empty() {
            return passthrough();
        }

        let payload_text = data_lines.join("\n");
        if payload_text.trim() == "[DONE]" {
            return passthrough();
        }
        let Ok(mut payload) = serde_json::from_str::<Value>(&payload_text) else {
            return passthrough();
        };
        if !self.colorize_payload(&mut payload) {
            return passthrough();
        }
        let Ok(serialized) = serde_json::to_string(&payload) else {
            return passthrough();
        };

        let line_separator = if delimiter == CRLF_DELIM { "\r\n" } else { "\n" };
        let mut lines: Vec<String> = other_lines.iter().map(|l| l.to_string()).collect();
        lines.push(format!("data: {serialized}"));
        let mut out = lines.join(line_separator).into_bytes();
        out.extend_from_slice(delimiter);
        out
    }

    fn colorize_payload(&mut self, payload: &mut Value) -> bool {
        let Some(choices) = payload.get_mut("choices").and_then(Value::as_array_mut) else {
            return false;
        };
        let mut modified = false;
        for (idx, choice) in choices.iter_mut().enumerate() {
            if choice.is_object() && self.colorize_choice(idx, choice) {
                modified = true;
            }
        }
        modified
    }

    fn colorize_choice(&mut self, idx: usize, choice: &mut Value) -> bool {
        // Role comes from whichever section names one; later deltas omit it.
        for key in ["delta", "message"] {
            if let Some(role) = choice
                .get(key)
                .and_then(|s| s.get("role"))
                .and_then(Value::as_str)
            {
                self.choice_roles.insert(idx, role.to_string());
            }
        }
        let role = self
            .choice_roles
            .get(&idx)
            .cloned()
            .unwrap_or_else(|| "assistant".to_string());

        let mut modified = false;
        for key in ["delta", "message"] {
            if let Some(section) = choice.get_mut(key).filter(|s| s.is_object()) {
                if self.colorize_section(section, &role) {
                    modified = true;
                }
            }
        }
        if let Some(text) = choice.get("text").and_then(Value::as_str) {
            if let Some(wrapped) = self.palette.wrap(text, &role) {
                choice["text"] = Value::String(wrapped);
                modified = true;
            }
        }
        modified
    }

    /// Colours `content` (string or typed part list) and `tool_calls` within
    /// one `delta`/`message` section.
    fn colorize_section(&self, section: &mut Value, role: &str) -> bool {
        let mut modified = false;
        match section.get_mut("content") {
            Some(Value::String(s)) => {
                if let Some(wrapped) = self.palette.wrap(s, role) {
                    *s = wrapped;
                    modified = true;
                }
            }
            Some(Value::Array(items)) => {
                for item in items {
                    if self.colorize_content_part(item, role) {
                        modified = true;
                    }
                }
            }
            _ => {}
        }

        if let Some(tool_calls) = section.get_mut("tool_calls").and_then(Value::as_array_mut) {
            for call in tool_calls {
                if call.get("type").and_then(Value::as_str) != Some("function") {
                    continue;
                }
                if let Some(function) = call.get_mut("function") {
                    if self.wrap_field(function, "name", "tool") {
                        modified = true;
                    }
                }
            }
        }
        modified
    }

    fn colorize_content_part(&self, item: &mut Value, role: &str) -> bool {
        match item.get("type").and_then(Value::as_str) {
            Some("text") => self.wrap_field(item, "text", role),
            Some("tool_result") => self.wrap_field(item, "content", "tool_result"),
            Some("tool_use") => self.wrap_field(item, "name", "tool"),
            _ => false,
        }
    }

    fn wrap_field(&self, container: &mut Value, key: &str, role: &str) -> bool {
        let Some(text) = container.get(key).and_then(Value::as_str) else {
            return false;
        };
        match self.palette.wrap(text, role) {
            Some(wrapped) => {
                container[key] = Value::String(wrapped);
                true
            }
            None => false,
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
