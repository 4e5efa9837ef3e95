use serde::{Deserialize, Serialize};

/// Events pushed from server to connected sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was posted to a conversation.
    NewMessage {
        id: i64,
        conversation_id: i64,
        sender_id: i64,
        sender_username: String,
        content: Option<String>,
        image: Option<String>,
        message_type: String,
        created_at: chrono::DateTime<chrono::Utc>,
    },

    /// A message was soft-deleted. Only the identifiers travel; sessions
    /// that already received the payload keep it.
    MessageDeleted {
        conversation_id: i64,
        message_id: i64,
    },

    /// A participant is typing. Ephemeral, never persisted.
    UserTyping {
        conversation_id: i64,
        user_id: i64,
        username: String,
    },

    /// A post was published.
    NewPost {
        id: i64,
        user_id: i64,
        username: String,
        content: String,
        image: Option<String>,
        created_at: chrono::DateTime<chrono::Utc>,
    },

    /// A post was liked.
    PostLiked {
        post_id: i64,
        user_id: i64,
        likes_count: i32,
    },

    /// A like was withdrawn.
    PostUnliked {
        post_id: i64,
        user_id: i64,
        likes_count: i32,
    },

    /// A post was removed by its author.
    PostDeleted { post_id: i64 },
}

impl ChatEvent {
    /// Returns the conversation this event is scoped to.
    /// Events that return `None` are global and go to every connected session.
    pub fn conversation_id(&self) -> Option<i64> {
        match self {
            Self::NewMessage { conversation_id, .. } => Some(*conversation_id),
            Self::MessageDeleted { conversation_id, .. } => Some(*conversation_id),
            Self::UserTyping { conversation_id, .. } => Some(*conversation_id),
            Self::NewPost { .. }
            | Self::PostLiked { .. }
            | Self::PostUnliked { .. }
            | Self::PostDeleted { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Subscribe to a conversation's events. Idempotent; membership is
    /// verified server-side.
    JoinConversation { conversation_id: i64 },

    /// Unsubscribe from a conversation's events.
    LeaveConversation { conversation_id: i64 },

    /// Tell the other participant the user is typing.
    Typing { conversation_id: i64 },
}
