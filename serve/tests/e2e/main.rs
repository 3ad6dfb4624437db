//! End-to-end tests: real proxy server against a mock upstream, both on
//! random loopback ports.

mod common;

mod cerebras_transform;
mod health;
mod hook_block;
mod midstream_error;
mod proxy_stream;
mod slash_inject;
