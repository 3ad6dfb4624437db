//! Codex Plus proxy binary: resolve configuration, then serve.

use clap::Parser;
use codex_plus::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "codex-plus")]
#[command(about = "Codex Plus: local LLM reverse proxy with hooks and slash commands")]
struct Args {
    /// Bind host (default 127.0.0.1, or CODEX_PLUS_HOST)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Bind port (default 10000, or CODEX_PLUS_PORT)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    // Seed env from .env / XDG before anything reads configuration.
    if let Err(e) = env_config::load_and_apply("codex-plus", None) {
        eprintln!("codex-plus: config load: {e}");
    }
    init_tracing();

    let args = Args::parse();
    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            // The one fatal error class: bad upstream configuration.
            eprintln!("codex-plus: configuration error: {e}");
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    if let Err(e) = serve::run_serve(settings).await {
        eprintln!("codex-plus: server error: {e}");
        std::process::exit(1);
    }
}
