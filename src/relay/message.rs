/// A message observed in a source chat, detached from the platform's wire types
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Platform message ID, unique within `chat_id`
    pub id: i32,
    /// Chat the message was posted in
    pub chat_id: i64,
    /// Set when the message is one member of an album
    pub media_group_id: Option<String>,
    /// Media payload; `None` for plain text messages
    pub media: Option<Media>,
    /// Message text, or the caption for media messages
    pub body: Option<String>,
    /// Entities over `body`, in platform order
    pub entities: Vec<Entity>,
}

impl InboundMessage {
    #[cfg(test)]
    pub fn text(id: i32, chat_id: i64, body: impl Into<String>) -> Self {
        Self {
            id,
            chat_id,
            media_group_id: None,
            media: None,
            body: Some(body.into()),
            entities: Vec::new(),
        }
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Reference to a file stored on the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub file_id: String,
    pub file_name: Option<String>,
}

impl FileRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Poll {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub phone_number: String,
    pub first_name: String,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Venue {
    pub location: Location,
    pub title: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub title: String,
    pub description: String,
}

/// Media payload carried by an inbound message. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq)]
pub enum Media {
    Photo(FileRef),
    Video(FileRef),
    Audio(FileRef),
    Voice(FileRef),
    Animation(FileRef),
    Document(FileRef),
    Sticker(FileRef),
    VideoNote(FileRef),
    Poll(Poll),
    Contact(Contact),
    Location(Location),
    Venue(Venue),
    Game(Game),
    Dice { emoji: String },
    /// A kind this relay does not know how to re-send
    Unsupported(String),
}

/// Formatting carried by an entity, independent of any URL or user reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStyle {
    Plain,
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    Blockquote,
    Mention,
    Hashtag,
    Cashtag,
    BotCommand,
    Url,
    Email,
    PhoneNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: u64,
    pub username: Option<String>,
}

/// A span over message text. Offsets and lengths are in UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub offset: usize,
    pub length: usize,
    pub style: EntityStyle,
    pub url: Option<String>,
    pub user: Option<UserRef>,
}

impl Entity {
    pub fn styled(style: EntityStyle, offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            style,
            url: None,
            user: None,
        }
    }

    pub fn link(url: impl Into<String>, offset: usize, length: usize) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::styled(EntityStyle::Plain, offset, length)
        }
    }

    pub fn mention(user: UserRef, offset: usize, length: usize) -> Self {
        Self {
            user: Some(user),
            ..Self::styled(EntityStyle::Plain, offset, length)
        }
    }
}
