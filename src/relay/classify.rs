use std::fmt;

use crate::relay::message::{InboundMessage, Media};

/// What the relay does with a message, decided once per event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Audio,
    Voice,
    Animation,
    Document,
    Sticker,
    Poll,
    Contact,
    Location,
    Venue,
    Game,
    VideoNote,
    Dice,
    MediaGroupMember,
    Unrecognized,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Text => "text",
            ContentKind::Photo => "photo",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Voice => "voice",
            ContentKind::Animation => "animation",
            ContentKind::Document => "document",
            ContentKind::Sticker => "sticker",
            ContentKind::Poll => "poll",
            ContentKind::Contact => "contact",
            ContentKind::Location => "location",
            ContentKind::Venue => "venue",
            ContentKind::Game => "game",
            ContentKind::VideoNote => "video_note",
            ContentKind::Dice => "dice",
            ContentKind::MediaGroupMember => "media_group",
            ContentKind::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// Media-group membership wins over the media kind; no media means text.
pub fn classify(message: &InboundMessage) -> ContentKind {
    if message.media_group_id.is_some() {
        return ContentKind::MediaGroupMember;
    }

    match &message.media {
        None => ContentKind::Text,
        Some(Media::Photo(_)) => ContentKind::Photo,
        Some(Media::Video(_)) => ContentKind::Video,
        Some(Media::Audio(_)) => ContentKind::Audio,
        Some(Media::Voice(_)) => ContentKind::Voice,
        Some(Media::Animation(_)) => ContentKind::Animation,
        Some(Media::Document(_)) => ContentKind::Document,
        Some(Media::Sticker(_)) => ContentKind::Sticker,
        Some(Media::VideoNote(_)) => ContentKind::VideoNote,
        Some(Media::Poll(_)) => ContentKind::Poll,
        Some(Media::Contact(_)) => ContentKind::Contact,
        Some(Media::Location(_)) => ContentKind::Location,
        Some(Media::Venue(_)) => ContentKind::Venue,
        Some(Media::Game(_)) => ContentKind::Game,
        Some(Media::Dice { .. }) => ContentKind::Dice,
        Some(Media::Unsupported(_)) => ContentKind::Unrecognized,
    }
}
