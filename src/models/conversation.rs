use serde::Serialize;
use sqlx::FromRow;

/// Represents the 'conversations' table in the database.
///
/// The participant pair is stored normalized (user_min < user_max) so the
/// unique index makes "at most one conversation per unordered pair" a
/// storage-level guarantee rather than a lookup-before-create convention.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub user_min: i64,
    pub user_max: i64,
    pub last_message_id: Option<i64>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Raw inbox row: one conversation joined with the other participant and
/// the last message, ordered by recency.
#[derive(Debug, FromRow)]
pub struct InboxRow {
    pub id: i64,
    pub other_id: i64,
    pub other_username: String,
    pub other_avatar: Option<String>,
    pub last_activity: chrono::DateTime<chrono::Utc>,

    pub lm_id: Option<i64>,
    pub lm_sender_id: Option<i64>,
    pub lm_content: Option<String>,
    pub lm_type: Option<String>,
    pub lm_deleted: Option<bool>,
    pub lm_created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Short description of a conversation's most recent message.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePreview {
    pub id: i64,
    pub sender_id: Option<i64>,
    pub preview: String,
    pub message_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One inbox entry: the other participant plus the last-message preview.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub other_id: i64,
    pub other_username: String,
    pub other_avatar: Option<String>,
    pub last_message: Option<MessagePreview>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

/// How many characters of a text message survive into the inbox preview.
const PREVIEW_LEN: usize = 100;

impl InboxRow {
    pub fn into_summary(self) -> ConversationSummary {
        let last_message = match (self.lm_id, self.lm_type, self.lm_created_at) {
            (Some(id), Some(message_type), Some(created_at)) => {
                let preview = if self.lm_deleted.unwrap_or(false) {
                    "Message deleted".to_string()
                } else if message_type == "image" {
                    "Image".to_string()
                } else {
                    truncate_chars(self.lm_content.as_deref().unwrap_or(""), PREVIEW_LEN)
                };
                Some(MessagePreview {
                    id,
                    sender_id: self.lm_sender_id,
                    preview,
                    message_type,
                    created_at,
                })
            }
            _ => None,
        };

        ConversationSummary {
            id: self.id,
            other_id: self.other_id,
            other_username: self.other_username,
            other_avatar: self.other_avatar,
            last_message,
            last_activity: self.last_activity,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(content: Option<&str>, message_type: &str, deleted: bool) -> InboxRow {
        InboxRow {
            id: 1,
            other_id: 2,
            other_username: "bob".to_string(),
            other_avatar: None,
            last_activity: chrono::Utc::now(),
            lm_id: Some(10),
            lm_sender_id: Some(2),
            lm_content: content.map(str::to_string),
            lm_type: Some(message_type.to_string()),
            lm_deleted: Some(deleted),
            lm_created_at: Some(chrono::Utc::now()),
        }
    }

    #[test]
    fn text_preview_is_truncated() {
        let summary = row(Some(&"x".repeat(200)), "text", false).into_summary();
        assert_eq!(summary.last_message.unwrap().preview.chars().count(), 100);
    }

    #[test]
    fn image_and_deleted_previews_are_markers() {
        let image = row(None, "image", false).into_summary();
        assert_eq!(image.last_message.unwrap().preview, "Image");

        let deleted = row(Some("hi"), "text", true).into_summary();
        assert_eq!(deleted.last_message.unwrap().preview, "Message deleted");
    }

    #[test]
    fn no_last_message_yields_none() {
        let mut empty = row(None, "text", false);
        empty.lm_id = None;
        empty.lm_type = None;
        empty.lm_created_at = None;
        assert!(empty.into_summary().last_message.is_none());
    }
}
