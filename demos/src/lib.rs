//! Shared plumbing for the runnable demo binaries under `src/bin/`: CLI
//! arguments and logging setup, so each demo's `main` reads like the Go
//! examples it mirrors (`example/{simple,timed,multiclient}`).

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct DemoArgs {
    /// Base endpoint name shared by the server and client in this demo.
    #[arg(long, default_value = "ipc_demo")]
    pub name: String,

    /// Require an encrypted channel on both sides.
    #[arg(long)]
    pub encryption: bool,
}

/// Installs a `tracing-subscriber` sink honoring `RUST_LOG`, defaulting to
/// `info`. Mirrors `log.Println`-driven output in the Go examples.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
