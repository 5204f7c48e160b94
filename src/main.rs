mod bot;
mod config;
mod control;
mod platform;
mod relay;

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use teloxide::Bot;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::{AppState, RunOutcome};
use crate::config::Config;
use crate::control::RESTART_EXIT_CODE;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,channel_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            wait_for_enter();
            return Ok(ExitCode::FAILURE);
        }
    };

    info!("Configuration loaded successfully");
    info!("  Source channels: {:?}", config.relay.source_channels);
    info!("  Target channel: {}", config.relay.target_channel);
    info!("  Operator: {}", config.telegram.operator_id);
    info!("  On forward failure: {:?}", config.relay.on_forward_failure);

    let bot = Bot::new(&config.telegram.bot_token);
    let state = Arc::new(AppState::new(&config, bot.clone()));

    info!("Relay is starting...");
    match bot::run(bot, state).await? {
        RunOutcome::Stopped => {
            info!("Relay stopped");
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::RestartRequested => {
            info!("Exiting with code {} for restart", RESTART_EXIT_CODE);
            Ok(ExitCode::from(RESTART_EXIT_CODE as u8))
        }
    }
}

/// Keep the console window open until the user has read the error
fn wait_for_enter() {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return;
    }
    print!("Press enter to exit");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).ok();
}
