use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    config::Config,
    error::AppError,
    models::{
        conversation::{ConversationSummary, InboxRow},
        message::{MAX_MESSAGE_LEN, MessageHistoryParams, MessageResponse},
    },
    realtime::{events::ChatEvent, notifier::Notifier},
    utils::{
        jwt::Claims,
        upload::{public_url, save_image},
    },
};

/// Whether two users follow each other. Symmetric by construction: the
/// same two EXISTS checks run regardless of argument order.
async fn mutual_follow(pool: &PgPool, a: i64, b: i64) -> Result<bool, AppError> {
    let mutual: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2)
           AND EXISTS(SELECT 1 FROM follows WHERE follower_id = $2 AND followee_id = $1)
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_one(pool)
    .await?;

    Ok(mutual)
}

async fn resolve_user_id(pool: &PgPool, username: &str) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// One conversation of `$1`, joined with the other participant and the
/// last message. Append an ORDER BY or an extra filter before running.
const INBOX_QUERY: &str = r#"
    SELECT
        c.id,
        u.id AS other_id,
        u.username AS other_username,
        u.avatar AS other_avatar,
        c.last_activity,
        m.id AS lm_id,
        m.sender_id AS lm_sender_id,
        m.content AS lm_content,
        m.message_type AS lm_type,
        m.deleted AS lm_deleted,
        m.created_at AS lm_created_at
    FROM conversations c
    JOIN conversation_participants mine
      ON mine.conversation_id = c.id AND mine.user_id = $1
    JOIN conversation_participants theirs
      ON theirs.conversation_id = c.id AND theirs.user_id <> $1
    JOIN users u ON u.id = theirs.user_id
    LEFT JOIN messages m ON m.id = c.last_message_id
"#;

fn summarize(row: InboxRow, headers: &HeaderMap) -> ConversationSummary {
    let mut summary = row.into_summary();
    summary.other_avatar = summary
        .other_avatar
        .take()
        .map(|path| public_url(headers, &path));
    summary
}

/// Mutual-follow eligibility check. A `false` here is a normal answer,
/// not an error; only the conversation and message endpoints turn it
/// into a 403.
pub async fn can_chat(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let other_id = resolve_user_id(&pool, &username).await?;

    let can_chat = user_id != other_id && mutual_follow(&pool, user_id, other_id).await?;

    Ok(Json(json!({ "can_chat": can_chat })))
}

/// Get or create the conversation with another user.
///
/// The pair is stored normalized (smaller id first) under a unique index,
/// so concurrent first contact from both sides still yields exactly one
/// conversation: the losing insert just reads the winner's row.
pub async fn open_conversation(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let other_id = resolve_user_id(&pool, &username).await?;

    if user_id == other_id {
        return Err(AppError::BadRequest(
            "You cannot start a conversation with yourself".to_string(),
        ));
    }

    if !mutual_follow(&pool, user_id, other_id).await? {
        return Err(AppError::Forbidden(
            "You must follow each other to chat".to_string(),
        ));
    }

    let (user_min, user_max) = if user_id < other_id {
        (user_id, other_id)
    } else {
        (other_id, user_id)
    };

    let mut tx = pool.begin().await?;

    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO conversations (user_min, user_max)
        VALUES ($1, $2)
        ON CONFLICT (user_min, user_max) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(user_min)
    .bind(user_max)
    .fetch_optional(&mut *tx)
    .await?;

    let (conversation_id, created) = match inserted {
        Some(id) => {
            sqlx::query(
                r#"
                INSERT INTO conversation_participants (conversation_id, user_id)
                VALUES ($1, $2), ($1, $3)
                "#,
            )
            .bind(id)
            .bind(user_min)
            .bind(user_max)
            .execute(&mut *tx)
            .await?;
            (id, true)
        }
        None => {
            let id: i64 = sqlx::query_scalar(
                "SELECT id FROM conversations WHERE user_min = $1 AND user_max = $2",
            )
            .bind(user_min)
            .bind(user_max)
            .fetch_one(&mut *tx)
            .await?;
            (id, false)
        }
    };

    tx.commit().await?;

    let query = format!("{} WHERE c.id = $2", INBOX_QUERY);
    let row = sqlx::query_as::<_, InboxRow>(&query)
        .bind(user_id)
        .bind(conversation_id)
        .fetch_one(&pool)
        .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((status, Json(summarize(row, &headers))))
}

/// Inbox: every conversation of the requester, most recent activity
/// first. Full scan, no pagination.
pub async fn list_conversations(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let query = format!("{} ORDER BY c.last_activity DESC", INBOX_QUERY);
    let rows = sqlx::query_as::<_, InboxRow>(&query)
        .bind(user_id)
        .fetch_all(&pool)
        .await?;

    let summaries: Vec<ConversationSummary> = rows
        .into_iter()
        .map(|row| summarize(row, &headers))
        .collect();

    Ok(Json(summaries))
}

/// Paginated history within one conversation.
///
/// Fetched newest-first for cheap pagination, then reordered so page 1 is
/// the most recent `limit` messages in ascending chronological order.
/// Soft-deleted messages are excluded.
pub async fn list_messages(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<i64>,
    Query(params): Query<MessageHistoryParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let participants = conversation_participants(&pool, conversation_id).await?;
    if !participants.contains(&user_id) {
        return Err(AppError::Forbidden(
            "You are not part of this conversation".to_string(),
        ));
    }

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let offset = (page - 1) * limit;

    let mut messages = sqlx::query_as::<_, MessageResponse>(
        r#"
        SELECT
            m.id, m.conversation_id, m.sender_id,
            u.username AS sender_username,
            m.content, m.image, m.message_type, m.created_at
        FROM messages m
        LEFT JOIN users u ON u.id = m.sender_id
        WHERE m.conversation_id = $1 AND m.deleted = FALSE
        ORDER BY m.created_at DESC, m.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(conversation_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await?;

    messages.reverse();

    for message in &mut messages {
        message.image = message.image.take().map(|path| public_url(&headers, &path));
    }

    Ok(Json(messages))
}

/// Send a message.
///
/// Multipart form: `conversation_id` (required), `content` and/or `image`.
/// The mutual-follow gate is re-checked against the other participant on
/// every send, so revoking a follow blocks the thread without erasing it.
pub async fn send_message(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(notifier): State<Notifier>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut conversation_id: Option<i64> = None;
    let mut content: Option<String> = None;
    let mut image_upload: Option<(Option<String>, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("conversation_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                conversation_id = Some(value.parse().map_err(|_| {
                    AppError::BadRequest("conversation_id must be a number".to_string())
                })?);
            }
            Some("content") => {
                content = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?,
                );
            }
            Some("image") => {
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                image_upload = Some((content_type, data));
            }
            _ => {}
        }
    }

    let conversation_id =
        conversation_id.ok_or(AppError::BadRequest("conversation_id is required".to_string()))?;

    let content = content.filter(|c| !c.trim().is_empty());

    if content.is_none() && image_upload.is_none() {
        return Err(AppError::BadRequest(
            "A message needs text content or an image".to_string(),
        ));
    }

    if let Some(text) = &content {
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::BadRequest(format!(
                "Message content must be at most {} characters",
                MAX_MESSAGE_LEN
            )));
        }
    }

    let participants = conversation_participants(&pool, conversation_id).await?;
    if !participants.contains(&user_id) {
        return Err(AppError::Forbidden(
            "You are not part of this conversation".to_string(),
        ));
    }

    let other_id = participants
        .iter()
        .copied()
        .find(|&id| id != user_id)
        .ok_or_else(|| {
            AppError::InternalServerError("conversation has no other participant".to_string())
        })?;

    if !mutual_follow(&pool, user_id, other_id).await? {
        return Err(AppError::Forbidden(
            "You must follow each other to chat".to_string(),
        ));
    }

    let image = match image_upload {
        Some((content_type, data)) => {
            Some(save_image(&config.upload_dir, content_type.as_deref(), &data).await?)
        }
        None => None,
    };

    let message_type = if image.is_some() { "image" } else { "text" };

    let mut tx = pool.begin().await?;

    let (message_id, created_at): (i64, chrono::DateTime<chrono::Utc>) = sqlx::query_as(
        r#"
        INSERT INTO messages (conversation_id, sender_id, content, image, message_type)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, created_at
        "#,
    )
    .bind(conversation_id)
    .bind(user_id)
    .bind(&content)
    .bind(&image)
    .bind(message_type)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE conversations SET last_message_id = $2, last_activity = $3 WHERE id = $1")
        .bind(conversation_id)
        .bind(message_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let image = image.map(|path| public_url(&headers, &path));

    notifier.emit(ChatEvent::NewMessage {
        id: message_id,
        conversation_id,
        sender_id: user_id,
        sender_username: claims.username.clone(),
        content: content.clone(),
        image: image.clone(),
        message_type: message_type.to_string(),
        created_at,
    });

    let message = MessageResponse {
        id: message_id,
        conversation_id,
        sender_id: Some(user_id),
        sender_username: Some(claims.username),
        content,
        image,
        message_type: message_type.to_string(),
        created_at,
    };

    Ok((StatusCode::CREATED, Json(message)))
}

/// Soft-delete an own message.
///
/// The row and its content stay; only the flag and timestamp change.
/// Subscribed sessions hear `message_deleted` with the identifiers only.
pub async fn delete_message(
    State(pool): State<PgPool>,
    State(notifier): State<Notifier>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let row: Option<(i64, Option<i64>)> = sqlx::query_as(
        "SELECT conversation_id, sender_id FROM messages WHERE id = $1 AND deleted = FALSE",
    )
    .bind(message_id)
    .fetch_optional(&pool)
    .await?;

    let (conversation_id, sender_id) =
        row.ok_or(AppError::NotFound("Message not found".to_string()))?;

    if sender_id != Some(user_id) {
        return Err(AppError::Forbidden(
            "Only the sender can delete a message".to_string(),
        ));
    }

    sqlx::query("UPDATE messages SET deleted = TRUE, deleted_at = NOW() WHERE id = $1")
        .bind(message_id)
        .execute(&pool)
        .await?;

    notifier.emit(ChatEvent::MessageDeleted {
        conversation_id,
        message_id,
    });

    Ok(StatusCode::NO_CONTENT)
}

async fn conversation_participants(
    pool: &PgPool,
    conversation_id: i64,
) -> Result<Vec<i64>, AppError> {
    let participants: Vec<i64> = sqlx::query_scalar(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = $1",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    if participants.is_empty() {
        return Err(AppError::NotFound("Conversation not found".to_string()));
    }

    Ok(participants)
}
