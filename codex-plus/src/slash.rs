//! Slash-command detection and execution directives.
//!
//! Scans the **latest** user message for `/name args` tokens (earlier
//! `/commands` in the transcript are history, not active requests), resolves
//! each name against the command-definition directories, and synthesizes one
//! system directive instructing the model to execute rather than describe.
//!
//! Injection is dialect-specific: chat-completions payloads get a leading
//! `system` message; responses payloads get `[SYSTEM: …]` prepended inside
//! the latest `input_text` of the last user message, because that dialect
//! has no system slot at that layer.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::dialect::RequestEnvelope;

static SLASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)/([A-Za-z0-9_-]+)(?:[ \t]+([^\n/]*))?").expect("slash pattern is valid")
});

/// Longest preview of a command file carried into the directive.
const PREVIEW_MAX_CHARS: usize = 100;
const PREVIEW_MAX_LINES: usize = 5;

/// One `/name args` token found in the latest user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedCommand {
    pub name: String,
    pub args: String,
}

/// Finds slash-command tokens in `text`. Tokens must start the text or
/// follow whitespace; arguments run to the end of line or the next slash.
pub fn detect_slash_commands(text: &str) -> Vec<DetectedCommand> {
    SLASH_RE
        .captures_iter(text)
        .map(|caps| DetectedCommand {
            name: caps[1].to_string(),
            args: caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        })
        .collect()
}

/// Drops injected annotations before scanning: `[SYSTEM: …]` directive
/// blocks and `[STATUS`-prefixed status lines are not user input.
fn scannable_text(text: &str) -> String {
    let mut rest = text;
    while let Some(stripped) = rest.strip_prefix("[SYSTEM:") {
        match stripped.find("]\n\n") {
            Some(end) => rest = &stripped[end + 3..],
            None => return String::new(),
        }
    }
    rest.lines()
        .filter(|line| !line.trim_start().starts_with("[STATUS"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolves slash commands against on-disk `.md` definitions and injects
/// execution directives into request envelopes.
pub struct SlashCommandResolver {
    /// Precedence-ordered command directories; first hit wins.
    search_dirs: Vec<PathBuf>,
}

impl SlashCommandResolver {
    /// Default precedence: project `.codexplus/commands`, project
    /// `.claude/commands`, then the user-home equivalents.
    pub fn new() -> Self {
        let mut search_dirs = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            search_dirs.push(cwd.join(".codexplus/commands"));
            search_dirs.push(cwd.join(".claude/commands"));
        }
        if let Some(home) = dirs::home_dir() {
            search_dirs.push(home.join(".codexplus/commands"));
            search_dirs.push(home.join(".claude/commands"));
        }
        Self { search_dirs }
    }

    /// Builds a resolver over explicit directories (tests, embedding).
    pub fn with_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// First `<dir>/<name>.md` that exists, in precedence order.
    pub fn find_command_file(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(format!("{name}.md")))
            .find(|path| path.is_file())
    }

    /// Scans the latest user message and, when commands are present,
    /// injects the execution directive. Returns the detected commands;
    /// an empty result means the envelope was left untouched.
    pub fn apply(&self, envelope: &mut RequestEnvelope) -> Vec<DetectedCommand> {
        let Some(text) = envelope.latest_user_text() else {
            return Vec::new();
        };
        let commands = detect_slash_commands(&scannable_text(&text));
        if commands.is_empty() {
            return Vec::new();
        }
        info!(
            commands = %commands.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(","),
            "detected slash commands"
        );

        let directive = self.build_directive(&commands);
        match envelope {
            RequestEnvelope::ChatCompletions(env) => {
                env.messages
                    .insert(0, crate::dialect::ChatMessage::system(directive));
            }
            RequestEnvelope::Responses(env) => {
                let injected = env
                    .last_user_message_mut()
                    .map(|item| item.prepend_to_last_input_text(&format!("[SYSTEM: {directive}]\n\n")))
                    .unwrap_or(false);
                if !injected {
                    debug!("no input_text slot for slash directive; envelope unchanged");
                    return Vec::new();
                }
            }
        }
        commands
    }

    /// One directive covering every detected command.
    pub fn build_directive(&self, commands: &[DetectedCommand]) -> String {
        let mut directive = String::from(
            "You are an AI assistant with slash command execution capabilities.\n\n\
             When you see slash commands (starting with /), you must:\n\
             1. Recognize them as executable commands, not conversation\n\
             2. Execute them directly and show actual results\n\
             3. Format output appropriately (code blocks, terminal output, etc.)\n\
             4. Do not explain what you're doing unless asked - just execute\n\n\
             Available slash commands and their behaviors:\n",
        );

        for command in commands {
            directive.push_str(&format!("\n/{}:", command.name));
            match self.find_command_file(&command.name) {
                Some(path) => {
                    directive.push_str(&format!("\n  - Location: {}", path.display()));
                    directive.push_str("\n  - Execute the instructions in this command file");
                    if command.args.is_empty() {
                        directive.push_str("\n  - No arguments provided");
                    } else {
                        directive.push_str(&format!("\n  - Apply arguments: {}", command.args));
                    }
                    if let Some(preview) = read_preview(&path) {
                        directive.push_str(&format!("\n  - Preview: {preview}..."));
                    }
                }
                None => {
                    directive.push_str(&format!(
                        "\n  - Interpret and execute this command with args: {}",
                        command.args
                    ));
                    directive.push_str("\n  - Provide appropriate output for the command type");
                }
            }
        }

        directive.push_str(
            "\n\nIMPORTANT:\n\
             - Execute these commands NOW in your response\n\
             - Show actual output, not descriptions\n\
             - Format as the command would naturally output\n\
             - For code/tests, use appropriate code blocks\n\
             - For searches, show file:line format\n\
             - For git commands, show git-style output\n",
        );
        directive
    }
}

impl Default for SlashCommandResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// First lines of a command file, capped for the directive.
fn read_preview(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let head = content
        .lines()
        .take(PREVIEW_MAX_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    let head = head.trim();
    if head.is_empty() {
        return None;
    }
    Some(head.chars().take(PREVIEW_MAX_CHARS).collect())
}
