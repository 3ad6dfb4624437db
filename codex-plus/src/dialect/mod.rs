//! Request dialects: the two JSON request shapes the proxy handles.
//!
//! Inbound bodies are normalised to [`RequestEnvelope`] at ingress: a sum
//! of the *responses* dialect (nested `input` with typed content parts) and
//! the *chat-completions* dialect (flat `messages`). The transformer in
//! [`transform`] is a total function on the sum.
//!
//! Message content parts stay [`serde_json::Value`]s inside the typed
//! envelope: the part vocabulary is open (`input_text`, `image`, …) and the
//! proxy only ever interprets `input_text`.

mod transform;

pub use transform::{to_chat_completions, TransformConfig};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors normalising a body into a [`RequestEnvelope`].
#[derive(Debug, Error)]
pub enum DialectError {
    #[error("body is not a JSON object")]
    NotAnObject,
    #[error("body matches neither the responses nor the chat-completions dialect")]
    UnrecognisedShape,
    #[error("malformed {dialect} body: {source}")]
    Malformed {
        dialect: &'static str,
        source: serde_json::Error,
    },
}

/// One item of the responses-dialect `input` array. Non-message items
/// (tool outputs, reasoning items) keep their fields in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InputItem {
    pub fn is_message(&self) -> bool {
        self.kind == "message"
    }

    pub fn is_user_message(&self) -> bool {
        self.is_message() && self.role.as_deref() == Some("user")
    }

    /// Concatenates the text of all `input_text` content parts.
    /// Non-text parts (images, …) are skipped.
    pub fn joined_input_text(&self) -> String {
        self.content
            .iter()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("input_text"))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("")
    }

    /// Prepends `prefix` to the latest `input_text` part. Returns false when
    /// the item has no text part to write into.
    pub fn prepend_to_last_input_text(&mut self, prefix: &str) -> bool {
        for part in self.content.iter_mut().rev() {
            if part.get("type").and_then(Value::as_str) != Some("input_text") {
                continue;
            }
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                let combined = format!("{prefix}{text}");
                part["text"] = Value::String(combined);
                return true;
            }
        }
        false
    }
}

/// Responses-dialect tool definition (flat `name`/`parameters`, optional
/// `strict`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesTool {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The responses dialect: nested `input`, top-level `instructions`, and the
/// provider-specific fields the chat-completions transform drops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Value>,
    #[serde(default)]
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ResponsesTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_cache_key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponsesEnvelope {
    /// Instructions as a string, when the field is a string.
    pub fn instructions_text(&self) -> Option<&str> {
        self.instructions.as_ref().and_then(Value::as_str)
    }

    /// Latest `input` item that is a user message.
    pub fn last_user_message_mut(&mut self) -> Option<&mut InputItem> {
        self.input.iter_mut().rev().find(|i| i.is_user_message())
    }

    pub fn last_user_message(&self) -> Option<&InputItem> {
        self.input.iter().rev().find(|i| i.is_user_message())
    }
}

/// One flat chat-completions message. `content` is a string or a typed part
/// list; `extra` keeps fields like `tool_call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Value::String(content.into()),
            extra: Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Message text: the string content, or the joined `text` parts.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        }
    }
}

/// Chat-completions tool: `function` sub-object, no `strict`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// The chat-completions dialect: flat `messages` plus sampling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionsEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionsEnvelope {
    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role.eq_ignore_ascii_case("user"))
    }
}

/// A recognised inbound request body, normalised at ingress.
#[derive(Debug, Clone)]
pub enum RequestEnvelope {
    Responses(ResponsesEnvelope),
    ChatCompletions(ChatCompletionsEnvelope),
}

impl RequestEnvelope {
    /// Normalises a parsed JSON body. `messages` selects chat-completions,
    /// otherwise `input` selects responses; anything else is unrecognised
    /// and flows through the proxy untouched.
    pub fn from_value(value: Value) -> Result<Self, DialectError> {
        let obj = value.as_object().ok_or(DialectError::NotAnObject)?;
        if obj.contains_key("messages") {
            let env = serde_json::from_value(value).map_err(|source| DialectError::Malformed {
                dialect: "chat-completions",
                source,
            })?;
            Ok(Self::ChatCompletions(env))
        } else if obj.contains_key("input") {
            let env = serde_json::from_value(value).map_err(|source| DialectError::Malformed {
                dialect: "responses",
                source,
            })?;
            Ok(Self::Responses(env))
        } else {
            Err(DialectError::UnrecognisedShape)
        }
    }

    /// Best-effort parse of raw bytes; `None` when the body is not JSON or
    /// not a recognised dialect.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(bytes).ok()?;
        Self::from_value(value).ok()
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Responses(env) => serde_json::to_value(env).unwrap_or(Value::Null),
            Self::ChatCompletions(env) => serde_json::to_value(env).unwrap_or(Value::Null),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_value()).unwrap_or_default()
    }

    /// Whether the caller asked for a streamed response.
    pub fn stream_requested(&self) -> bool {
        match self {
            Self::Responses(env) => env.stream.unwrap_or(false),
            Self::ChatCompletions(env) => env.stream.unwrap_or(false),
        }
    }

    /// Text of the latest user message, for slash scanning and
    /// user-prompt-submit hooks. Earlier messages are history.
    pub fn latest_user_text(&self) -> Option<String> {
        match self {
            Self::Responses(env) => env.last_user_message().map(InputItem::joined_input_text),
            Self::ChatCompletions(env) => env.last_user_message().map(ChatMessage::text),
        }
    }
}
