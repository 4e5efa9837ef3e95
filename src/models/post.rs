use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maximum length of a post body, in characters.
pub const MAX_POST_LEN: usize = 5000;

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub content: String,

    /// Whether the body is rich text (sanitized HTML) or plain text.
    pub is_rich: bool,

    /// Stored upload path of the attached image, if any.
    pub image: Option<String>,

    /// Mirror of the post_likes rows, maintained in the same transaction
    /// that mutates them.
    pub likes_count: i32,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for a post joined with its author, as returned by feed queries.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub is_rich: bool,
    pub image: Option<String>,
    pub likes_count: i32,

    /// Whether the requesting user has liked this post.
    pub is_liked: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Query parameters for listing posts.
#[derive(Debug, Deserialize)]
pub struct PostListParams {
    /// Cursor for pagination: the created_at timestamp of the last post in the previous page.
    pub cursor: Option<chrono::DateTime<chrono::Utc>>,

    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
}
