//! SSE colouring for streamed chat payloads.
//!
//! Frames a raw Server-Sent-Events byte flow on `\n\n` / `\r\n\r\n`
//! boundaries, recognises the chat-delta JSON schema, and wraps textual
//! content in 24-bit ANSI colours keyed on message role. Everything it does
//! not recognise is forwarded byte-for-byte; stripping the ANSI sequences
//! from the output always yields a payload deep-equal to the input.
//!
//! **Public API**: [`SseColorizer`], [`RolePalette`], [`hex_to_ansi`],
//! [`strip_ansi`], [`RESET`].

mod colorize;
mod palette;

pub use colorize::SseColorizer;
pub use palette::{hex_to_ansi, strip_ansi, RolePalette, RESET};
