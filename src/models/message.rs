use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maximum length of a message body, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Body substituted into a user's messages when their account is deleted
/// but the conversation itself survives.
pub const REDACTION_MARKER: &str = "[account deleted]";

/// Represents the 'messages' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,

    /// NULL once the sender's account has been deleted.
    pub sender_id: Option<i64>,

    /// Text body. Required unless an image is attached.
    pub content: Option<String>,

    /// Stored upload path of the attached image, if any.
    pub image: Option<String>,

    /// 'text' or 'image'.
    pub message_type: String,

    /// Soft-delete flag. Deleted messages keep their row and content but
    /// are excluded from history and previews.
    pub deleted: bool,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for a message joined with its sender, as returned by history and
/// send responses.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: Option<i64>,
    pub sender_username: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub message_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Query parameters for paginated message history.
#[derive(Debug, Deserialize)]
pub struct MessageHistoryParams {
    /// 1-based page number; page 1 is the most recent messages.
    pub page: Option<i64>,

    /// Page size (default: 50, max: 100).
    pub limit: Option<i64>,
}
