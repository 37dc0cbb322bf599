use std::{fmt, sync::Arc};

use rand::{rngs::StdRng, Rng, SeedableRng};
use shared::domain::{MessageId, RoomId, UserId};

/// Display colors for user names.
///
/// Black, white and the dark blue of the basic ANSI set are left out so that
/// every entry stays readable on a dark terminal background.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserColor {
    Red,
    #[default]
    Green,
    Yellow,
    Magenta,
    Cyan,
}

impl UserColor {
    pub const PALETTE: [UserColor; 5] = [
        UserColor::Red,
        UserColor::Green,
        UserColor::Yellow,
        UserColor::Magenta,
        UserColor::Cyan,
    ];

    /// Pseudo-random palette entry seeded by the user ID, stable for the process lifetime.
    pub fn for_user(id: UserId) -> Self {
        let mut rng = StdRng::seed_from_u64(u64::from(id.0));
        Self::PALETTE[rng.gen_range(0..Self::PALETTE.len())]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Magenta => "magenta",
            Self::Cyan => "cyan",
        }
    }
}

impl fmt::Display for UserColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub avatar_url: String,
    pub color: UserColor,
}

impl User {
    pub fn clear(&mut self) {
        self.id = UserId::default();
        self.username.clear();
        self.avatar_url.clear();
        self.color = UserColor::default();
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    #[default]
    Chat,
    /// Connection status produced locally, shown to the user.
    System,
    /// Diagnostics produced locally, usually hidden.
    Debug,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Message {
    /// Canonical registry record of the author. `None` only while pooled.
    pub author: Option<Arc<User>>,
    /// Body as rendered by the server (markup, HTML-escaped).
    pub body: String,
    /// Unescaped plain body.
    pub body_raw: String,
    pub id: MessageId,
    pub created_at: i64,
    /// Zero when the message was never edited.
    pub edited_at: i64,
    pub room: RoomId,
    pub is_mention: bool,
    pub kind: MessageKind,
}

impl Message {
    pub fn is_edited(&self) -> bool {
        self.edited_at > 0
    }

    pub fn is_chat(&self) -> bool {
        self.kind == MessageKind::Chat
    }

    pub fn author_name(&self) -> &str {
        self.author
            .as_deref()
            .map(|user| user.username.as_str())
            .unwrap_or_default()
    }

    /// Timestamp of the latest revision.
    pub fn revised_at(&self) -> i64 {
        if self.is_edited() {
            self.edited_at
        } else {
            self.created_at
        }
    }

    pub fn clear(&mut self) {
        self.author = None;
        self.body.clear();
        self.body_raw.clear();
        self.id = MessageId::default();
        self.created_at = 0;
        self.edited_at = 0;
        self.room = RoomId::default();
        self.is_mention = false;
        self.kind = MessageKind::default();
    }
}

/// Immutable, fully materialized copy of the history window, oldest first.
#[derive(Debug, Default, Clone)]
pub struct HistorySnapshot {
    entries: Arc<Vec<Message>>,
}

impl HistorySnapshot {
    pub fn new(entries: Vec<Message>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.entries.iter().map(|msg| msg.id).collect()
    }
}
