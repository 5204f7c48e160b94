use anyhow::Result;
use async_trait::async_trait;

use crate::relay::message::{
    Contact, Entity, FileRef, Game, InboundMessage, Location, Poll, Venue,
};

/// Binary payload downloaded from the platform, ready to upload again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub data: Vec<u8>,
    pub file_name: Option<String>,
}

/// Media kinds that accept a caption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionedKind {
    Photo,
    Video,
    Audio,
    Voice,
    Animation,
    Document,
}

/// Media kinds that can be members of an album
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumKind {
    Photo,
    Video,
    Audio,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumItem {
    pub kind: AlbumKind,
    pub upload: Upload,
    pub caption: String,
    pub entities: Vec<Entity>,
}

/// One send call into the platform
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text {
        text: String,
        entities: Vec<Entity>,
    },
    Captioned {
        kind: CaptionedKind,
        upload: Upload,
        caption: String,
        entities: Vec<Entity>,
    },
    Sticker(Upload),
    VideoNote(Upload),
    Poll(Poll),
    Contact(Contact),
    Location(Location),
    Venue(Venue),
    Game(Game),
    Dice {
        emoji: String,
    },
    Album(Vec<AlbumItem>),
}

/// Everything the relay needs from the messaging platform
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Download the payload behind a file reference
    async fn download(&self, file: &FileRef) -> Result<Upload>;

    /// All members of the media group `message` belongs to, in platform order
    async fn media_group(&self, message: &InboundMessage) -> Result<Vec<InboundMessage>>;

    /// Release whatever `media_group` kept for `group_id` once the album is sent
    fn forget_group(&self, group_id: &str);

    /// Send content to `chat_id`
    async fn send(&self, chat_id: i64, outbound: Outbound) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::{anyhow, Context};

    use super::*;

    /// In-memory gateway that records every send.
    /// Downloads return the file ID as bytes.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub groups: Mutex<HashMap<String, Vec<InboundMessage>>>,
        pub sent: Mutex<Vec<(i64, Outbound)>>,
        pub downloads: Mutex<Vec<String>>,
        pub fail_sends: Mutex<bool>,
        pub forgotten: Mutex<Vec<String>>,
    }

    impl RecordingGateway {
        pub fn with_group(self, group_id: &str, members: Vec<InboundMessage>) -> Self {
            self.groups
                .lock()
                .unwrap()
                .insert(group_id.to_string(), members);
            self
        }

        pub fn set_fail_sends(&self, fail: bool) {
            *self.fail_sends.lock().unwrap() = fail;
        }

        pub fn sent(&self) -> Vec<(i64, Outbound)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Gateway for RecordingGateway {
        async fn download(&self, file: &FileRef) -> Result<Upload> {
            tokio::task::yield_now().await;
            self.downloads.lock().unwrap().push(file.file_id.clone());
            Ok(Upload {
                data: file.file_id.as_bytes().to_vec(),
                file_name: file.file_name.clone(),
            })
        }

        async fn media_group(&self, message: &InboundMessage) -> Result<Vec<InboundMessage>> {
            tokio::task::yield_now().await;
            let group_id = message
                .media_group_id
                .as_deref()
                .context("message is not part of a media group")?;
            Ok(self
                .groups
                .lock()
                .unwrap()
                .get(group_id)
                .cloned()
                .unwrap_or_else(|| vec![message.clone()]))
        }

        fn forget_group(&self, group_id: &str) {
            self.forgotten.lock().unwrap().push(group_id.to_string());
        }

        async fn send(&self, chat_id: i64, outbound: Outbound) -> Result<()> {
            tokio::task::yield_now().await;
            if *self.fail_sends.lock().unwrap() {
                return Err(anyhow!("send failed"));
            }
            self.sent.lock().unwrap().push((chat_id, outbound));
            Ok(())
        }
    }
}
