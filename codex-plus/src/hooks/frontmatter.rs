//! Hook metadata front-matter parsing.
//!
//! Two on-disk forms are accepted:
//!
//! - YAML header: `---\nname: …\ntype: …\n---` before the body.
//! - Docstring form: a `"""…"""` block (optionally after a shebang) holding
//!   `name:` / `type:` / `priority:` / `enabled:` lines.

use serde::Deserialize;

use super::HookEvent;

/// Raw metadata extracted from a hook file header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookMeta {
    pub name: Option<String>,
    pub event: Option<HookEvent>,
    pub priority: Option<i64>,
    pub enabled: Option<bool>,
}

#[derive(Deserialize, Default)]
struct RawMeta {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    priority: Option<i64>,
    enabled: Option<bool>,
}

impl From<RawMeta> for HookMeta {
    fn from(raw: RawMeta) -> Self {
        Self {
            name: raw.name,
            event: raw.kind.as_deref().and_then(HookEvent::parse),
            priority: raw.priority,
            enabled: raw.enabled,
        }
    }
}

/// Extracts metadata from hook file content; `None` when no recognisable
/// front-matter is present or the header fails to parse.
pub fn parse_front_matter(content: &str) -> Option<HookMeta> {
    if let Some(yaml) = yaml_header(content) {
        let raw: RawMeta = serde_yaml::from_str(yaml).ok()?;
        return Some(raw.into());
    }
    docstring_header(content).map(parse_key_values)
}

/// Body of a `---` … `---` header at the start of the file.
fn yaml_header(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

/// Body of the first `"""` … `"""` block within the leading lines.
fn docstring_header(content: &str) -> Option<&str> {
    let start = content.find("\"\"\"")?;
    let after = &content[start + 3..];
    let end = after.find("\"\"\"")?;
    Some(&after[..end])
}

/// Parses loose `key: value` lines (the docstring form has no YAML
/// guarantees, so quoting and nesting are not supported).
fn parse_key_values(block: &str) -> HookMeta {
    let mut meta = HookMeta::default();
    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "name" => meta.name = Some(value.to_string()),
            "type" => meta.event = HookEvent::parse(value),
            "priority" => meta.priority = value.parse().ok(),
            "enabled" => meta.enabled = value.parse().ok(),
            _ => {}
        }
    }
    meta
}
