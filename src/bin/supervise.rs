//! channel-relay supervisor.
//!
//! Runs the relay binary with the arguments given to the supervisor and starts
//! it again whenever it exits with the restart code (the operator's `/reboot`).
//! Any other exit status ends supervision and is passed through.
//!
//! The relay binary is looked up next to this executable unless
//! `CHANNEL_RELAY_BIN` points somewhere else.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Keep in sync with control::RESTART_EXIT_CODE.
const RESTART_EXIT_CODE: i32 = 75;

fn relay_binary() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHANNEL_RELAY_BIN") {
        return Ok(PathBuf::from(path));
    }
    let current = std::env::current_exe().context("Failed to locate the supervisor binary")?;
    let dir = current
        .parent()
        .context("Supervisor binary has no parent directory")?;
    Ok(dir.join(format!("channel-relay{}", std::env::consts::EXE_SUFFIX)))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let binary = relay_binary()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut generation: u32 = 0;

    loop {
        generation += 1;
        info!("Starting {} (run {})", binary.display(), generation);

        let status = tokio::process::Command::new(&binary)
            .args(&args)
            .status()
            .await
            .with_context(|| format!("Failed to start {}", binary.display()))?;

        match status.code() {
            Some(RESTART_EXIT_CODE) => {
                info!("Relay requested a restart");
                continue;
            }
            Some(code) => {
                info!("Relay exited with status {}", code);
                return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
            }
            None => {
                warn!("Relay was terminated by a signal");
                return Ok(ExitCode::FAILURE);
            }
        }
    }
}
