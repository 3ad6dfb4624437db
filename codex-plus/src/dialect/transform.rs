//! Responses → chat-completions payload transform.
//!
//! Applied when the configured upstream speaks the flat `messages` dialect
//! (e.g. Cerebras). Total over [`RequestEnvelope`] and idempotent: a
//! chat-completions envelope passes through unchanged.

use std::collections::HashMap;

use serde_json::Value;

use super::{
    ChatCompletionsEnvelope, ChatMessage, ChatTool, FunctionSpec, RequestEnvelope,
    ResponsesEnvelope,
};

/// Knobs for the dialect transform: model aliasing and the sampling
/// defaults injected when the inbound payload has none.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Source-dialect model aliases → upstream model names.
    pub model_map: HashMap<String, String>,
    pub default_temperature: f64,
    pub default_max_tokens: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        let model_map = [
            ("gpt-5-codex", "qwen-3-coder-480b"),
            ("gpt-5", "qwen-3-coder-480b"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
        Self {
            model_map,
            default_temperature: 0.2,
            default_max_tokens: 4096,
        }
    }
}

impl TransformConfig {
    fn map_model(&self, model: Option<String>) -> Option<String> {
        model.map(|m| self.model_map.get(&m).cloned().unwrap_or(m))
    }
}

/// Rewrites a responses-dialect envelope into chat-completions form.
/// A chat-completions envelope is returned as-is.
pub fn to_chat_completions(
    envelope: RequestEnvelope,
    config: &TransformConfig,
) -> ChatCompletionsEnvelope {
    match envelope {
        RequestEnvelope::ChatCompletions(env) => env,
        RequestEnvelope::Responses(env) => transform_responses(env, config),
    }
}

fn transform_responses(env: ResponsesEnvelope, config: &TransformConfig) -> ChatCompletionsEnvelope {
    let mut messages = Vec::new();
    if let Some(instructions) = env.instructions_text().filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(instructions));
    }
    for item in &env.input {
        if !item.is_message() {
            continue;
        }
        let role = item.role.clone().unwrap_or_else(|| "user".to_string());
        messages.push(ChatMessage::new(role, item.joined_input_text()));
    }

    let tools = env.tools.as_ref().map(|tools| {
        tools
            .iter()
            .filter(|t| t.kind == "function")
            .filter_map(|t| {
                // `strict` is discarded: the flat dialect has no slot for it.
                Some(ChatTool {
                    kind: "function".to_string(),
                    function: FunctionSpec {
                        name: t.name.clone()?,
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
            })
            .collect::<Vec<_>>()
    });

    // Sampling knobs may ride along as unknown fields on the responses
    // side; lift them so defaults only fill real gaps.
    let mut extra = env.extra;
    let temperature = extra
        .remove("temperature")
        .and_then(|v| v.as_f64())
        .unwrap_or(config.default_temperature);
    let max_tokens = extra
        .remove("max_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(config.default_max_tokens);

    // `instructions`, `input`, `reasoning`, `store`, `include`, and
    // `prompt_cache_key` end here: none of them is copied over.
    ChatCompletionsEnvelope {
        model: config.map_model(env.model),
        messages,
        tools,
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        stream: env.stream,
        tool_choice: env.tool_choice,
        parallel_tool_calls: env.parallel_tool_calls,
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DROPPED_FIELDS: [&str; 6] = [
        "instructions",
        "input",
        "reasoning",
        "store",
        "include",
        "prompt_cache_key",
    ];

    fn envelope(value: Value) -> RequestEnvelope {
        RequestEnvelope::from_value(value).unwrap()
    }

    fn full_responses_request() -> RequestEnvelope {
        envelope(json!({
            "model": "gpt-5-codex",
            "instructions": "You are a helpful assistant.",
            "input": [{
                "type": "message",
                "role": "user",
                "content": [{"type": "input_text", "text": "Hello"}]
            }],
            "tools": [{
                "type": "function",
                "name": "test_tool",
                "description": "A test tool",
                "strict": false,
                "parameters": {"type": "object", "properties": {}}
            }],
            "reasoning": {"effort": "high"},
            "store": false,
            "stream": true,
            "prompt_cache_key": "some-uuid",
            "include": ["reasoning.encrypted_content"]
        }))
    }

    #[test]
    fn instructions_become_leading_system_message() {
        let out = to_chat_completions(full_responses_request(), &TransformConfig::default());
        assert_eq!(out.messages[0].role, "system");
        assert_eq!(out.messages[0].text(), "You are a helpful assistant.");
        assert_eq!(out.messages[1].role, "user");
        assert_eq!(out.messages[1].text(), "Hello");
    }

    #[test]
    fn multiple_text_parts_concatenate() {
        let env = envelope(json!({
            "model": "m",
            "input": [{
                "type": "message",
                "role": "user",
                "content": [
                    {"type": "input_text", "text": "Part 1"},
                    {"type": "image", "data": "…"},
                    {"type": "input_text", "text": "Part 2"}
                ]
            }]
        }));
        let out = to_chat_completions(env, &TransformConfig::default());
        assert_eq!(out.messages[0].text(), "Part 1Part 2");
    }

    #[test]
    fn tools_gain_function_wrapper_and_lose_strict() {
        let out = to_chat_completions(full_responses_request(), &TransformConfig::default());
        let tools = serde_json::to_value(out.tools.unwrap()).unwrap();
        assert_eq!(
            tools,
            json!([{
                "type": "function",
                "function": {
                    "name": "test_tool",
                    "description": "A test tool",
                    "parameters": {"type": "object", "properties": {}}
                }
            }])
        );
        assert!(!tools.to_string().contains("strict"));
    }

    #[test]
    fn provider_specific_fields_are_dropped() {
        let out = to_chat_completions(full_responses_request(), &TransformConfig::default());
        let value = serde_json::to_value(&out).unwrap();
        let obj = value.as_object().unwrap();
        for field in DROPPED_FIELDS {
            assert!(!obj.contains_key(field), "field {field} survived transform");
        }
    }

    #[test]
    fn compatible_fields_survive_and_defaults_fill_gaps() {
        let env = envelope(json!({
            "model": "m",
            "input": [],
            "stream": true,
            "tool_choice": "auto",
            "parallel_tool_calls": false
        }));
        let out = to_chat_completions(env, &TransformConfig::default());
        assert_eq!(out.stream, Some(true));
        assert_eq!(out.tool_choice, Some(json!("auto")));
        assert_eq!(out.parallel_tool_calls, Some(false));
        assert_eq!(out.temperature, Some(0.2));
        assert_eq!(out.max_tokens, Some(4096));
    }

    #[test]
    fn inbound_sampling_values_beat_defaults() {
        let env = envelope(json!({
            "model": "m",
            "input": [],
            "temperature": 0.9,
            "max_tokens": 128
        }));
        let out = to_chat_completions(env, &TransformConfig::default());
        assert_eq!(out.temperature, Some(0.9));
        assert_eq!(out.max_tokens, Some(128));
        // Lifted values must not duplicate into the passthrough map.
        assert!(!out.extra.contains_key("temperature"));
    }

    #[test]
    fn known_model_alias_is_mapped_unknown_passes_through() {
        let out = to_chat_completions(full_responses_request(), &TransformConfig::default());
        assert_eq!(out.model.as_deref(), Some("qwen-3-coder-480b"));

        let env = envelope(json!({"model": "llama3.3-70b", "input": []}));
        let out = to_chat_completions(env, &TransformConfig::default());
        assert_eq!(out.model.as_deref(), Some("llama3.3-70b"));
    }

    #[test]
    fn transform_is_idempotent() {
        let config = TransformConfig::default();
        let once = to_chat_completions(full_responses_request(), &config);
        let twice = to_chat_completions(RequestEnvelope::ChatCompletions(once.clone()), &config);
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }

    #[test]
    fn empty_instructions_and_input_still_produce_messages_array() {
        let env = envelope(json!({"model": "gpt-5-codex", "instructions": "", "input": []}));
        let out = to_chat_completions(env, &TransformConfig::default());
        assert!(out.messages.is_empty());
        let value = serde_json::to_value(&out).unwrap();
        assert!(value.get("messages").unwrap().is_array());
    }

    #[test]
    fn minimal_request_gets_defaults() {
        let env = envelope(json!({"model": "gpt-5-codex", "input": []}));
        let out = to_chat_completions(env, &TransformConfig::default());
        let value = serde_json::to_value(&out).unwrap();
        assert!(value.get("model").is_some());
        assert!(value.get("messages").is_some());
        assert!(value.get("temperature").is_some());
        assert!(value.get("max_tokens").is_some());
    }
}
