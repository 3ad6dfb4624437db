//! Port ownership guard CLI.
//!
//! Invoked by the supervisor before starting the proxy. Prints a JSON
//! summary and exits with a state-specific code: 0 owned, 10 free,
//! 20 occupied by another process, 30 unknown.

use std::time::Duration;

use clap::Parser;
use codex_plus::port_guard::{check_port_ownership, DEFAULT_EXPECTED_MARKERS};

#[derive(Parser, Debug)]
#[command(name = "port-guard")]
#[command(about = "Inspect ownership of the Codex Plus proxy port")]
struct Args {
    /// TCP port to inspect
    #[arg(long)]
    port: u16,

    /// Expected process-command markers (repeatable); defaults to the
    /// proxy's own names
    #[arg(long = "expect", value_name = "STR")]
    expected: Vec<String>,

    /// Health URL probed when no marker matches
    #[arg(long, value_name = "URL")]
    health_url: Option<String>,

    /// Health probe timeout in seconds
    #[arg(long, value_name = "SEC", default_value_t = 1.0)]
    health_timeout: f64,

    /// Emit compact JSON instead of pretty output
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let markers = if args.expected.is_empty() {
        DEFAULT_EXPECTED_MARKERS
            .iter()
            .map(|m| m.to_string())
            .collect()
    } else {
        args.expected.clone()
    };

    let result = check_port_ownership(
        args.port,
        &markers,
        args.health_url.as_deref(),
        Duration::from_secs_f64(args.health_timeout),
    )
    .await;

    let summary = if args.json {
        serde_json::to_string(&result)
    } else {
        serde_json::to_string_pretty(&result)
    };
    match summary {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("port-guard: serialize result: {e}"),
    }

    std::process::exit(result.state.exit_code());
}
