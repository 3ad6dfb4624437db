//! Role → 24-bit ANSI foreground palette.
//!
//! One palette instance maps chat roles to escape sequences so every module
//! that renders streamed output (colouriser, status lines) stays consistent.

use once_cell::sync::Lazy;
use regex::Regex;

/// ANSI reset sequence appended after every wrapped span.
pub const RESET: &str = "\x1b[0m";

static ANSI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("ANSI pattern is valid"));

/// 24-bit foreground escape for the given RGB triplet.
fn rgb_escape(r: u8, g: u8, b: u8) -> String {
    format!("\x1b[38;2;{};{};{}m", r, g, b)
}

/// Converts a `#RRGGBB` hex string into a 24-bit ANSI foreground sequence.
/// Returns `None` when the string is not six hex digits.
pub fn hex_to_ansi(hex: &str) -> Option<String> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(rgb_escape(r, g, b))
}

/// Removes ANSI colour escape codes, keeping the raw content.
pub fn strip_ansi(text: &str) -> String {
    ANSI_PATTERN.replace_all(text, "").into_owned()
}

/// Maps chat roles to ANSI escapes. Unknown roles fall back to the
/// assistant colour.
#[derive(Clone, Debug)]
pub struct RolePalette {
    entries: Vec<(String, String)>,
}

// Colours sampled from the Claude Code CLI transcript frames: lavender for
// the assistant, cyan for the user, amber for tool metadata, mint for
// observations.
const DEFAULT_ROLE_HEX: &[(&str, &str)] = &[
    ("assistant", "#BDA6FF"),
    ("user", "#6CD9FF"),
    ("system", "#93A1AD"),
    ("developer", "#FF8BC0"),
    ("tool", "#F5B971"),
    ("function", "#F5B971"),
    ("tool_result", "#7FE3AE"),
    ("observation", "#7FE3AE"),
    ("error", "#FF7A7A"),
];

impl Default for RolePalette {
    fn default() -> Self {
        let entries = DEFAULT_ROLE_HEX
            .iter()
            .filter_map(|(role, hex)| Some((role.to_string(), hex_to_ansi(hex)?)))
            .collect();
        Self { entries }
    }
}

impl RolePalette {
    /// Builds a palette from explicit role → escape pairs.
    pub fn from_entries(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Escape sequence for `role`, falling back to the assistant colour.
    pub fn color_for(&self, role: &str) -> Option<&str> {
        self.lookup(role).or_else(|| self.lookup("assistant"))
    }

    fn lookup(&self, role: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| r == role)
            .map(|(_, c)| c.as_str())
    }

    /// Wraps `text` in the colour for `role`, guarding against double
    /// wrapping: text that already carries an escape is returned unchanged.
    pub fn wrap(&self, text: &str, role: &str) -> Option<String> {
        if text.is_empty() || text.contains("\x1b[") {
            return None;
        }
        let color = self.color_for(role)?;
        Some(format!("{color}{text}{RESET}"))
    }
}
