pub mod classify;
pub mod dedup;
pub mod forward;
pub mod gateway;
pub mod message;
pub mod rewrite;
pub mod sources;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::relay::classify::{classify, ContentKind};
use crate::relay::dedup::{GroupOutcome, MediaGroupDeduplicator};
use crate::relay::forward::Forwarder;
use crate::relay::gateway::Gateway;
use crate::relay::message::{InboundMessage, Media};
use crate::relay::rewrite::ReplacementRule;
use crate::relay::sources::SourceChannels;

/// What the relay did with one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The chat is not a source channel
    Ignored,
    Forwarded(ContentKind),
    /// Another event of the same media group already forwarded the album
    Duplicate,
}

/// Routes inbound messages from source channels to the target channel
pub struct Relay {
    sources: Arc<SourceChannels>,
    gateway: Arc<dyn Gateway>,
    forwarder: Forwarder,
    dedup: MediaGroupDeduplicator,
}

impl Relay {
    pub fn new(gateway: Arc<dyn Gateway>, sources: Arc<SourceChannels>, config: &RelayConfig) -> Self {
        let rule = ReplacementRule::new(
            config.replacement_url.clone(),
            config.replacement_username.clone(),
        );
        Self {
            forwarder: Forwarder::new(gateway.clone(), config.target_channel, rule),
            dedup: MediaGroupDeduplicator::new(config.dedup_capacity, config.on_forward_failure),
            sources,
            gateway,
        }
    }

    pub fn accepts(&self, chat_id: i64) -> bool {
        self.sources.contains(chat_id)
    }

    /// Handle one inbound event. Gateway failures are returned, never retried.
    pub async fn handle(&self, message: InboundMessage) -> Result<Handled> {
        if !self.accepts(message.chat_id) {
            return Ok(Handled::Ignored);
        }

        let kind = classify(&message);
        debug!(
            "Relaying {} message {} from chat {}",
            kind, message.id, message.chat_id
        );

        match kind {
            ContentKind::MediaGroupMember => self.forward_group(&message).await,
            ContentKind::Unrecognized => {
                let name = match &message.media {
                    Some(Media::Unsupported(name)) => name.as_str(),
                    _ => "unknown",
                };
                warn!(
                    "Unrecognized message kind '{}' (message {} in chat {}), relaying text only",
                    name, message.id, message.chat_id
                );
                self.forwarder.forward_text(&message).await?;
                Ok(Handled::Forwarded(kind))
            }
            _ => {
                self.forwarder.forward(&message).await?;
                Ok(Handled::Forwarded(kind))
            }
        }
    }

    async fn forward_group(&self, message: &InboundMessage) -> Result<Handled> {
        let group_id = message
            .media_group_id
            .as_deref()
            .context("media group member without a group ID")?;

        let outcome = self
            .dedup
            .run_once(group_id, || async {
                let members = self
                    .gateway
                    .media_group(message)
                    .await
                    .with_context(|| format!("Failed to fetch media group {}", group_id))?;
                debug!("Media group {} has {} member(s)", group_id, members.len());
                self.forwarder.forward_album(&members).await?;
                self.gateway.forget_group(group_id);
                Ok(())
            })
            .await?;

        Ok(match outcome {
            GroupOutcome::Forwarded => Handled::Forwarded(ContentKind::MediaGroupMember),
            GroupOutcome::AlreadyForwarded => Handled::Duplicate,
        })
    }
}
