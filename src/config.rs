use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::relay::dedup::FailurePolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// The only user allowed to run operator commands
    pub operator_id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    pub source_channels: Vec<i64>,
    pub target_channel: i64,
    #[serde(default)]
    pub replacement_url: Option<String>,
    #[serde(default)]
    pub replacement_username: Option<String>,
    /// How long to wait for the rest of a media group before forwarding it
    #[serde(default = "default_settle_ms")]
    pub media_group_settle_ms: u64,
    /// Upper bound on remembered media groups
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default)]
    pub on_forward_failure: FailurePolicy,
}

fn default_settle_ms() -> u64 {
    1500
}

fn default_dedup_capacity() -> usize {
    4096
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;

        // A bare "@name" is accepted for convenience; the sigil is added back on rewrite.
        if let Some(username) = config.relay.replacement_username.as_mut() {
            *username = username.trim_start_matches('@').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("telegram.bot_token must be set");
        }
        if self.telegram.operator_id == 0 {
            bail!("telegram.operator_id must be set");
        }
        if self.relay.source_channels.is_empty() {
            bail!("relay.source_channels must list at least one chat");
        }
        if self.relay.target_channel == 0 {
            bail!("relay.target_channel must be set");
        }
        if self.relay.source_channels.contains(&self.relay.target_channel) {
            bail!("relay.target_channel must not also be a source channel");
        }
        if self.relay.dedup_capacity == 0 {
            bail!("relay.dedup_capacity must be greater than zero");
        }
        if matches!(self.relay.replacement_username.as_deref(), Some("")) {
            bail!("relay.replacement_username must not be empty");
        }
        if let Some(url) = &self.relay.replacement_url {
            reqwest::Url::parse(url)
                .with_context(|| format!("relay.replacement_url is not a valid URL: {}", url))?;
        }
        Ok(())
    }
}
