use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::relay::gateway::{AlbumItem, AlbumKind, CaptionedKind, Gateway, Outbound, Upload};
use crate::relay::message::{FileRef, InboundMessage, Media};
use crate::relay::rewrite::{rewrite_content, ReplacementRule};

/// Telegram rejects albums with more items than this
const MAX_ALBUM_ITEMS: usize = 10;

/// Performs the download-then-send for each content kind, targeting one chat
pub struct Forwarder {
    gateway: Arc<dyn Gateway>,
    target: i64,
    rule: ReplacementRule,
}

impl Forwarder {
    pub fn new(gateway: Arc<dyn Gateway>, target: i64, rule: ReplacementRule) -> Self {
        Self {
            gateway,
            target,
            rule,
        }
    }

    /// Relay a single (non-album) message
    pub async fn forward(&self, message: &InboundMessage) -> Result<()> {
        let outbound = match &message.media {
            None => return self.forward_text(message).await,
            Some(Media::Photo(file)) => self.captioned(CaptionedKind::Photo, file, message).await?,
            Some(Media::Video(file)) => self.captioned(CaptionedKind::Video, file, message).await?,
            Some(Media::Audio(file)) => self.captioned(CaptionedKind::Audio, file, message).await?,
            Some(Media::Voice(file)) => self.captioned(CaptionedKind::Voice, file, message).await?,
            Some(Media::Animation(file)) => {
                self.captioned(CaptionedKind::Animation, file, message)
                    .await?
            }
            Some(Media::Document(file)) => {
                self.captioned(CaptionedKind::Document, file, message)
                    .await?
            }
            Some(Media::Sticker(file)) => Outbound::Sticker(self.download(file).await?),
            Some(Media::VideoNote(file)) => Outbound::VideoNote(self.download(file).await?),
            Some(Media::Poll(poll)) => Outbound::Poll(poll.clone()),
            Some(Media::Contact(contact)) => Outbound::Contact(contact.clone()),
            Some(Media::Location(location)) => Outbound::Location(*location),
            Some(Media::Venue(venue)) => Outbound::Venue(venue.clone()),
            Some(Media::Game(game)) => Outbound::Game(game.clone()),
            Some(Media::Dice { emoji }) => Outbound::Dice {
                emoji: emoji.clone(),
            },
            Some(Media::Unsupported(_)) => return self.forward_text(message).await,
        };

        self.send(outbound).await
    }

    /// Best-effort plain-text relay of whatever text or caption the message has
    pub async fn forward_text(&self, message: &InboundMessage) -> Result<()> {
        let body = message.body();
        if body.trim().is_empty() {
            warn!(
                "Message {} in chat {} has no text to relay, dropping",
                message.id, message.chat_id
            );
            return Ok(());
        }

        let (text, entities) = rewrite_content(body, &message.entities, &self.rule);
        self.send(Outbound::Text { text, entities }).await
    }

    /// Relay the members of one media group as a single album, in the given order
    pub async fn forward_album(&self, members: &[InboundMessage]) -> Result<()> {
        let candidates: Vec<(AlbumKind, &FileRef, &InboundMessage)> = members
            .iter()
            .filter_map(|member| match album_entry(member) {
                Some((kind, file)) => Some((kind, file, member)),
                None => {
                    warn!(
                        "Media group member {} cannot be part of an album, skipping",
                        member.id
                    );
                    None
                }
            })
            .collect();

        if candidates.is_empty() {
            warn!("Media group has no album-compatible members, nothing to send");
            return Ok(());
        }

        // A one-item album is rejected by the platform; send it as plain media.
        if let [(_, _, member)] = candidates.as_slice() {
            return self.forward(member).await;
        }

        let items = try_join_all(candidates.iter().map(|(kind, file, member)| async move {
            let (caption, entities) = rewrite_content(member.body(), &member.entities, &self.rule);
            Ok::<_, anyhow::Error>(AlbumItem {
                kind: *kind,
                upload: self.download(file).await?,
                caption,
                entities,
            })
        }))
        .await?;

        info!("Sending album of {} item(s)", items.len());
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            let chunk: Vec<AlbumItem> = items.by_ref().take(MAX_ALBUM_ITEMS).collect();
            self.send(Outbound::Album(chunk)).await?;
        }

        Ok(())
    }

    async fn captioned(
        &self,
        kind: CaptionedKind,
        file: &FileRef,
        message: &InboundMessage,
    ) -> Result<Outbound> {
        let upload = self.download(file).await?;
        let (caption, entities) = rewrite_content(message.body(), &message.entities, &self.rule);
        Ok(Outbound::Captioned {
            kind,
            upload,
            caption,
            entities,
        })
    }

    async fn download(&self, file: &FileRef) -> Result<Upload> {
        debug!("Downloading file {}", file.file_id);
        self.gateway
            .download(file)
            .await
            .with_context(|| format!("Failed to download file {}", file.file_id))
    }

    async fn send(&self, outbound: Outbound) -> Result<()> {
        self.gateway
            .send(self.target, outbound)
            .await
            .with_context(|| format!("Failed to send to target chat {}", self.target))
    }
}

fn album_entry(message: &InboundMessage) -> Option<(AlbumKind, &FileRef)> {
    match message.media.as_ref()? {
        Media::Photo(file) => Some((AlbumKind::Photo, file)),
        Media::Video(file) => Some((AlbumKind::Video, file)),
        Media::Audio(file) => Some((AlbumKind::Audio, file)),
        Media::Document(file) => Some((AlbumKind::Document, file)),
        _ => None,
    }
}
