use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use teloxide::prelude::*;
use teloxide::types::{
    DiceEmoji, FileId, InputFile, InputMedia, InputMediaAudio, InputMediaDocument,
    InputMediaPhoto, InputMediaVideo, InputPollOption, MessageEntity, MessageEntityKind,
    MessageKind,
};
use tracing::{debug, warn};

use crate::relay::gateway::{AlbumItem, AlbumKind, CaptionedKind, Gateway, Outbound, Upload};
use crate::relay::message::{
    Contact, Entity, EntityStyle, FileRef, Game, InboundMessage, Location, Media, Poll, UserRef,
    Venue,
};

/// Media-group members buffered this long without being fetched are dropped
const PENDING_GROUP_TTL: Duration = Duration::from_secs(120);

struct PendingGroup {
    first_seen: Instant,
    members: Vec<InboundMessage>,
}

/// Bot API implementation of the relay gateway.
///
/// The Bot API cannot list the members of a media group, so every member the
/// bot sees is buffered here and `media_group` waits `settle` for stragglers.
pub struct TelegramGateway {
    bot: Bot,
    http: reqwest::Client,
    pending_groups: DashMap<String, PendingGroup>,
    settle: Duration,
}

impl TelegramGateway {
    pub fn new(bot: Bot, settle: Duration) -> Self {
        Self {
            bot,
            http: reqwest::Client::new(),
            pending_groups: DashMap::new(),
            settle,
        }
    }

    /// Remember a media-group member so a later `media_group` call can return it
    pub fn observe(&self, message: &InboundMessage) {
        let Some(group_id) = &message.media_group_id else {
            return;
        };

        self.prune_stale(Instant::now());

        let mut group = self
            .pending_groups
            .entry(group_id.clone())
            .or_insert_with(|| PendingGroup {
                first_seen: Instant::now(),
                members: Vec::new(),
            });
        if !group.members.iter().any(|m| m.id == message.id) {
            group.members.push(message.clone());
        }
    }

    fn prune_stale(&self, now: Instant) {
        self.pending_groups
            .retain(|_, group| now.duration_since(group.first_seen) < PENDING_GROUP_TTL);
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn download(&self, file: &FileRef) -> Result<Upload> {
        let tg_file = self
            .bot
            .get_file(FileId(file.file_id.clone()))
            .await
            .context("get_file failed")?;

        // Telegram file URL format: https://api.telegram.org/file/bot<token>/<file_path>
        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            tg_file.path
        );

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "failed to download file: HTTP {}",
                response.status()
            ));
        }

        let data = response.bytes().await?.to_vec();
        debug!("Downloaded {} bytes for file {}", data.len(), file.file_id);
        Ok(Upload {
            data,
            file_name: file.file_name.clone(),
        })
    }

    async fn media_group(&self, message: &InboundMessage) -> Result<Vec<InboundMessage>> {
        let group_id = message
            .media_group_id
            .as_deref()
            .context("message is not part of a media group")?;

        tokio::time::sleep(self.settle).await;

        // The buffer stays until the album is sent so a retry sees every member.
        let mut members = self
            .pending_groups
            .get(group_id)
            .map(|group| group.members.clone())
            .unwrap_or_default();
        if !members.iter().any(|m| m.id == message.id) {
            members.push(message.clone());
        }
        members.sort_by_key(|m| m.id);
        Ok(members)
    }

    fn forget_group(&self, group_id: &str) {
        self.pending_groups.remove(group_id);
    }

    async fn send(&self, chat_id: i64, outbound: Outbound) -> Result<()> {
        let chat = ChatId(chat_id);

        match outbound {
            Outbound::Text { text, entities } => {
                let entities = to_telegram_entities(&entities, &text);
                self.bot.send_message(chat, text).entities(entities).await?;
            }
            Outbound::Captioned {
                kind,
                upload,
                caption,
                entities,
            } => {
                let entities = to_telegram_entities(&entities, &caption);
                let file = input_file(upload);
                match kind {
                    CaptionedKind::Photo => {
                        self.bot
                            .send_photo(chat, file)
                            .caption(caption)
                            .caption_entities(entities)
                            .await?;
                    }
                    CaptionedKind::Video => {
                        self.bot
                            .send_video(chat, file)
                            .caption(caption)
                            .caption_entities(entities)
                            .await?;
                    }
                    CaptionedKind::Audio => {
                        self.bot
                            .send_audio(chat, file)
                            .caption(caption)
                            .caption_entities(entities)
                            .await?;
                    }
                    CaptionedKind::Voice => {
                        self.bot
                            .send_voice(chat, file)
                            .caption(caption)
                            .caption_entities(entities)
                            .await?;
                    }
                    CaptionedKind::Animation => {
                        self.bot
                            .send_animation(chat, file)
                            .caption(caption)
                            .caption_entities(entities)
                            .await?;
                    }
                    CaptionedKind::Document => {
                        self.bot
                            .send_document(chat, file)
                            .caption(caption)
                            .caption_entities(entities)
                            .await?;
                    }
                }
            }
            Outbound::Sticker(upload) => {
                self.bot.send_sticker(chat, input_file(upload)).await?;
            }
            Outbound::VideoNote(upload) => {
                self.bot.send_video_note(chat, input_file(upload)).await?;
            }
            Outbound::Poll(poll) => {
                let options = poll.options.into_iter().map(InputPollOption::new);
                self.bot.send_poll(chat, poll.question, options).await?;
            }
            Outbound::Contact(contact) => {
                let mut request =
                    self.bot
                        .send_contact(chat, contact.phone_number, contact.first_name);
                if let Some(last_name) = contact.last_name {
                    request = request.last_name(last_name);
                }
                request.await?;
            }
            Outbound::Location(location) => {
                self.bot
                    .send_location(chat, location.latitude, location.longitude)
                    .await?;
            }
            Outbound::Venue(venue) => {
                self.bot
                    .send_venue(
                        chat,
                        venue.location.latitude,
                        venue.location.longitude,
                        venue.title,
                        venue.address,
                    )
                    .await?;
            }
            Outbound::Game(game) => {
                // Bots can only send games they own; relay the description instead.
                let text = format!("{}\n\n{}", game.title, game.description);
                self.bot.send_message(chat, text.trim()).await?;
            }
            Outbound::Dice { emoji } => {
                self.bot.send_dice(chat).emoji(dice_from_str(&emoji)).await?;
            }
            Outbound::Album(items) => {
                let media: Vec<InputMedia> = items.into_iter().map(album_media).collect();
                self.bot.send_media_group(chat, media).await?;
            }
        }

        Ok(())
    }
}

/// Convert a teloxide message into the relay's representation
pub fn inbound_from(msg: &Message) -> InboundMessage {
    let (body, entities) = match msg.text() {
        Some(text) => (Some(text.to_string()), msg.entities()),
        None => (msg.caption().map(str::to_string), msg.caption_entities()),
    };

    InboundMessage {
        id: msg.id.0,
        chat_id: msg.chat.id.0,
        media_group_id: msg.media_group_id().map(|id| id.to_string()),
        media: media_from(msg),
        body,
        entities: entities
            .unwrap_or_default()
            .iter()
            .map(from_telegram_entity)
            .collect(),
    }
}

fn media_from(msg: &Message) -> Option<Media> {
    if msg.text().is_some() {
        return None;
    }

    let media = if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        // Sizes are ordered smallest first
        Media::Photo(FileRef::new(photo.file.id.to_string()))
    } else if let Some(video) = msg.video() {
        Media::Video(named_file(video.file.id.to_string(), &video.file_name))
    } else if let Some(audio) = msg.audio() {
        Media::Audio(named_file(audio.file.id.to_string(), &audio.file_name))
    } else if let Some(voice) = msg.voice() {
        Media::Voice(FileRef::new(voice.file.id.to_string()))
    } else if let Some(animation) = msg.animation() {
        // Animations also carry a document, so they are checked first.
        Media::Animation(named_file(animation.file.id.to_string(), &animation.file_name))
    } else if let Some(document) = msg.document() {
        Media::Document(named_file(document.file.id.to_string(), &document.file_name))
    } else if let Some(sticker) = msg.sticker() {
        Media::Sticker(FileRef::new(sticker.file.id.to_string()))
    } else if let Some(note) = msg.video_note() {
        Media::VideoNote(FileRef::new(note.file.id.to_string()))
    } else if let Some(poll) = msg.poll() {
        Media::Poll(Poll {
            question: poll.question.clone(),
            options: poll.options.iter().map(|o| o.text.clone()).collect(),
        })
    } else if let Some(contact) = msg.contact() {
        Media::Contact(Contact {
            phone_number: contact.phone_number.clone(),
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
        })
    } else if let Some(venue) = msg.venue() {
        // Venues also carry a location, so they are checked first.
        Media::Venue(Venue {
            location: Location {
                latitude: venue.location.latitude,
                longitude: venue.location.longitude,
            },
            title: venue.title.clone(),
            address: venue.address.clone(),
        })
    } else if let Some(location) = msg.location() {
        Media::Location(Location {
            latitude: location.latitude,
            longitude: location.longitude,
        })
    } else if let Some(game) = msg.game() {
        Media::Game(Game {
            title: game.title.clone(),
            description: game.description.clone(),
        })
    } else if let Some(dice) = msg.dice() {
        Media::Dice {
            emoji: dice_to_str(&dice.emoji).to_string(),
        }
    } else {
        let name = match &msg.kind {
            MessageKind::Common(_) => "unknown media",
            _ => "service message",
        };
        Media::Unsupported(name.to_string())
    };

    Some(media)
}

fn named_file(file_id: String, file_name: &Option<String>) -> FileRef {
    FileRef {
        file_id,
        file_name: file_name.clone(),
    }
}

fn from_telegram_entity(entity: &MessageEntity) -> Entity {
    let style = match &entity.kind {
        MessageEntityKind::TextLink { url } => {
            return Entity::link(url.to_string(), entity.offset, entity.length);
        }
        MessageEntityKind::TextMention { user } => {
            let user = UserRef {
                id: user.id.0,
                username: user.username.clone(),
            };
            return Entity::mention(user, entity.offset, entity.length);
        }
        MessageEntityKind::Bold => EntityStyle::Bold,
        MessageEntityKind::Italic => EntityStyle::Italic,
        MessageEntityKind::Underline => EntityStyle::Underline,
        MessageEntityKind::Strikethrough => EntityStyle::Strikethrough,
        MessageEntityKind::Spoiler => EntityStyle::Spoiler,
        MessageEntityKind::Code => EntityStyle::Code,
        MessageEntityKind::Pre { language } => EntityStyle::Pre {
            language: language.clone(),
        },
        MessageEntityKind::Blockquote => EntityStyle::Blockquote,
        MessageEntityKind::Mention => EntityStyle::Mention,
        MessageEntityKind::Hashtag => EntityStyle::Hashtag,
        MessageEntityKind::Cashtag => EntityStyle::Cashtag,
        MessageEntityKind::BotCommand => EntityStyle::BotCommand,
        MessageEntityKind::Url => EntityStyle::Url,
        MessageEntityKind::Email => EntityStyle::Email,
        MessageEntityKind::PhoneNumber => EntityStyle::PhoneNumber,
        _ => EntityStyle::Plain,
    };
    Entity::styled(style, entity.offset, entity.length)
}

/// Convert relay entities back, dropping any that no longer fit inside `text`
/// (rewriting mentions can shorten it).
fn to_telegram_entities(entities: &[Entity], text: &str) -> Vec<MessageEntity> {
    let text_len = text.encode_utf16().count();
    entities
        .iter()
        .filter(|e| e.length > 0 && e.offset + e.length <= text_len)
        .filter_map(to_telegram_entity)
        .collect()
}

fn to_telegram_entity(entity: &Entity) -> Option<MessageEntity> {
    let link = entity.url.clone().or_else(|| {
        let username = entity.user.as_ref()?.username.as_ref()?;
        Some(format!("https://t.me/{}", username))
    });

    let kind = if let Some(link) = link {
        match reqwest::Url::parse(&link) {
            Ok(url) => MessageEntityKind::TextLink { url },
            Err(e) => {
                warn!("Dropping entity with invalid URL {}: {}", link, e);
                return None;
            }
        }
    } else {
        match &entity.style {
            EntityStyle::Plain => return None,
            EntityStyle::Bold => MessageEntityKind::Bold,
            EntityStyle::Italic => MessageEntityKind::Italic,
            EntityStyle::Underline => MessageEntityKind::Underline,
            EntityStyle::Strikethrough => MessageEntityKind::Strikethrough,
            EntityStyle::Spoiler => MessageEntityKind::Spoiler,
            EntityStyle::Code => MessageEntityKind::Code,
            EntityStyle::Pre { language } => MessageEntityKind::Pre {
                language: language.clone(),
            },
            EntityStyle::Blockquote => MessageEntityKind::Blockquote,
            EntityStyle::Mention => MessageEntityKind::Mention,
            EntityStyle::Hashtag => MessageEntityKind::Hashtag,
            EntityStyle::Cashtag => MessageEntityKind::Cashtag,
            EntityStyle::BotCommand => MessageEntityKind::BotCommand,
            EntityStyle::Url => MessageEntityKind::Url,
            EntityStyle::Email => MessageEntityKind::Email,
            EntityStyle::PhoneNumber => MessageEntityKind::PhoneNumber,
        }
    };

    Some(MessageEntity::new(kind, entity.offset, entity.length))
}

fn input_file(upload: Upload) -> InputFile {
    let file = InputFile::memory(upload.data);
    match upload.file_name {
        Some(name) => file.file_name(name),
        None => file,
    }
}

fn album_media(item: AlbumItem) -> InputMedia {
    let entities = to_telegram_entities(&item.entities, &item.caption);
    let file = input_file(item.upload);
    match item.kind {
        AlbumKind::Photo => InputMedia::Photo(
            InputMediaPhoto::new(file)
                .caption(item.caption)
                .caption_entities(entities),
        ),
        AlbumKind::Video => InputMedia::Video(
            InputMediaVideo::new(file)
                .caption(item.caption)
                .caption_entities(entities),
        ),
        AlbumKind::Audio => InputMedia::Audio(
            InputMediaAudio::new(file)
                .caption(item.caption)
                .caption_entities(entities),
        ),
        AlbumKind::Document => InputMedia::Document(
            InputMediaDocument::new(file)
                .caption(item.caption)
                .caption_entities(entities),
        ),
    }
}

fn dice_to_str(emoji: &DiceEmoji) -> &'static str {
    #[allow(unreachable_patterns)]
    match emoji {
        DiceEmoji::Dice => "🎲",
        DiceEmoji::Darts => "🎯",
        DiceEmoji::Basketball => "🏀",
        DiceEmoji::Football => "⚽",
        DiceEmoji::SlotMachine => "🎰",
        DiceEmoji::Bowling => "🎳",
        _ => "🎲",
    }
}

fn dice_from_str(emoji: &str) -> DiceEmoji {
    match emoji {
        "🎯" => DiceEmoji::Darts,
        "🏀" => DiceEmoji::Basketball,
        "⚽" => DiceEmoji::Football,
        "🎰" => DiceEmoji::SlotMachine,
        "🎳" => DiceEmoji::Bowling,
        _ => DiceEmoji::Dice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> TelegramGateway {
        TelegramGateway::new(Bot::new("1:x"), Duration::ZERO)
    }

    fn member(id: i32, group_id: &str) -> InboundMessage {
        InboundMessage {
            media_group_id: Some(group_id.to_string()),
            media: Some(Media::Photo(FileRef::new(format!("file-{}", id)))),
            ..InboundMessage::text(id, -1001, "")
        }
    }

    fn ids(members: &[InboundMessage]) -> Vec<i32> {
        members.iter().map(|m| m.id).collect()
    }

    #[tokio::test]
    async fn test_media_group_sorted_and_deduplicated() {
        let gateway = gateway();
        gateway.observe(&member(12, "g"));
        gateway.observe(&member(10, "g"));
        gateway.observe(&member(12, "g"));
        gateway.observe(&member(11, "g"));
        gateway.observe(&member(20, "other"));

        let members = gateway.media_group(&member(12, "g")).await.unwrap();

        assert_eq!(ids(&members), vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_media_group_includes_unobserved_trigger() {
        let gateway = gateway();
        gateway.observe(&member(11, "g"));

        let members = gateway.media_group(&member(10, "g")).await.unwrap();
        assert_eq!(ids(&members), vec![10, 11]);

        let alone = gateway.media_group(&member(5, "fresh")).await.unwrap();
        assert_eq!(ids(&alone), vec![5]);
    }

    #[tokio::test]
    async fn test_media_group_kept_until_forgotten() {
        let gateway = gateway();
        gateway.observe(&member(10, "g"));
        gateway.observe(&member(11, "g"));

        let first = gateway.media_group(&member(11, "g")).await.unwrap();
        let again = gateway.media_group(&member(10, "g")).await.unwrap();
        assert_eq!(ids(&first), vec![10, 11]);
        assert_eq!(ids(&again), vec![10, 11]);

        gateway.forget_group("g");
        assert!(gateway.pending_groups.is_empty());
        let after = gateway.media_group(&member(10, "g")).await.unwrap();
        assert_eq!(ids(&after), vec![10]);
    }

    #[tokio::test]
    async fn test_stale_groups_are_pruned() {
        let gateway = gateway();
        gateway.observe(&member(10, "old"));

        gateway.prune_stale(Instant::now() + PENDING_GROUP_TTL + Duration::from_secs(1));
        assert!(gateway.pending_groups.is_empty());

        gateway.observe(&member(11, "new"));
        gateway.prune_stale(Instant::now());
        assert_eq!(gateway.pending_groups.len(), 1);
    }

    #[tokio::test]
    async fn test_text_messages_are_not_buffered() {
        let gateway = gateway();
        gateway.observe(&InboundMessage::text(1, -1001, "hello"));
        assert!(gateway.pending_groups.is_empty());
        assert!(gateway.media_group(&InboundMessage::text(1, -1001, "hello")).await.is_err());
    }

    #[test]
    fn test_entities_past_text_end_are_dropped() {
        let entities = vec![
            Entity::styled(EntityStyle::Bold, 0, 5),
            Entity::styled(EntityStyle::Italic, 4, 10),
        ];

        let converted = to_telegram_entities(&entities, "hello world");

        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].kind, MessageEntityKind::Bold);
    }

    #[test]
    fn test_entity_length_counts_utf16_units() {
        // "😀" is two UTF-16 code units
        let entities = vec![Entity::styled(EntityStyle::Bold, 0, 3)];
        assert_eq!(to_telegram_entities(&entities, "😀a").len(), 1);
        assert!(to_telegram_entities(&entities, "😀").is_empty());
    }

    #[test]
    fn test_rewritten_user_becomes_profile_link() {
        let entity = Entity::mention(
            UserRef {
                id: 1,
                username: Some("relay".to_string()),
            },
            0,
            4,
        );

        let converted = to_telegram_entity(&entity).unwrap();

        match converted.kind {
            MessageEntityKind::TextLink { url } => assert_eq!(url.as_str(), "https://t.me/relay"),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_plain_entity_is_not_sent() {
        assert!(to_telegram_entity(&Entity::styled(EntityStyle::Plain, 0, 1)).is_none());
    }

    #[test]
    fn test_inbound_entities_keep_style_and_link() {
        let bold = MessageEntity::new(MessageEntityKind::Bold, 2, 3);
        assert_eq!(from_telegram_entity(&bold), Entity::styled(EntityStyle::Bold, 2, 3));

        let link = MessageEntity::new(
            MessageEntityKind::TextLink {
                url: reqwest::Url::parse("https://spam.example/x").unwrap(),
            },
            0,
            4,
        );
        assert_eq!(
            from_telegram_entity(&link).url.as_deref(),
            Some("https://spam.example/x")
        );
    }

    #[test]
    fn test_dice_emoji_mapping() {
        assert_eq!(dice_to_str(&dice_from_str("🎯")), "🎯");
        assert_eq!(dice_from_str("?"), DiceEmoji::Dice);
    }
}
