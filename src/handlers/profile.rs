use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        message::REDACTION_MARKER,
        user::{MeResponse, UpdateProfileRequest, UserProfileResponse},
    },
    utils::{
        jwt::Claims,
        upload::{public_url, save_image},
    },
};

const ME_QUERY: &str = r#"
    SELECT
        u.id, u.username, u.email, u.avatar, u.description,
        u.gender, u.age, u.studies, u.theme, u.created_at,
        (SELECT COUNT(*) FROM posts WHERE user_id = u.id) AS posts_count,
        (SELECT COUNT(*) FROM follows WHERE followee_id = u.id) AS followers_count,
        (SELECT COUNT(*) FROM follows WHERE follower_id = u.id) AS following_count
    FROM users u
    WHERE u.id = $1
"#;

async fn fetch_me(pool: &PgPool, user_id: i64, headers: &HeaderMap) -> Result<MeResponse, AppError> {
    let mut me = sqlx::query_as::<_, MeResponse>(ME_QUERY)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    me.avatar = me.avatar.map(|path| public_url(headers, &path));
    Ok(me)
}

/// Get current user's profile and statistics.
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    Ok(Json(fetch_me(&pool, user_id, &headers).await?))
}

/// Partial profile update. Absent fields keep their current value.
pub async fn update_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;

    sqlx::query(
        r#"
        UPDATE users SET
            description = COALESCE($2, description),
            gender = COALESCE($3, gender),
            age = COALESCE($4, age),
            studies = COALESCE($5, studies),
            theme = COALESCE($6, theme)
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(&payload.description)
    .bind(&payload.gender)
    .bind(payload.age)
    .bind(&payload.studies)
    .bind(&payload.theme)
    .execute(&pool)
    .await?;

    Ok(Json(fetch_me(&pool, user_id, &headers).await?))
}

/// Upload a new profile picture (multipart field 'avatar').
pub async fn upload_avatar(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut avatar: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("avatar") {
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            avatar = Some(save_image(&config.upload_dir, content_type.as_deref(), &data).await?);
        }
    }

    let avatar = avatar.ok_or(AppError::BadRequest("Missing 'avatar' field".to_string()))?;

    sqlx::query("UPDATE users SET avatar = $1 WHERE id = $2")
        .bind(&avatar)
        .bind(user_id)
        .execute(&pool)
        .await?;

    Ok(Json(json!({ "avatar": public_url(&headers, &avatar) })))
}

/// Delete the current user's account and everything hanging off it.
///
/// Runs as one transaction: like counters on other users' posts are
/// restored, two-party conversations are torn down entirely (messages
/// included), larger conversations keep their history with this user's
/// messages redacted, and the user row goes last so the remaining
/// relations cascade.
pub async fn delete_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    // Give back the likes this user handed out.
    sqlx::query(
        r#"
        UPDATE posts SET likes_count = GREATEST(0, likes_count - 1)
        WHERE id IN (SELECT post_id FROM post_likes WHERE user_id = $1)
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let conversations: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT c.id,
               (SELECT COUNT(*) FROM conversation_participants p
                WHERE p.conversation_id = c.id) AS participants
        FROM conversations c
        JOIN conversation_participants cp
          ON cp.conversation_id = c.id AND cp.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    for (conversation_id, participants) in conversations {
        if participants == 2 {
            // Two-party conversation: the whole thread goes, messages cascade.
            sqlx::query("DELETE FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query(
                "DELETE FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2",
            )
            .bind(conversation_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE messages SET content = $1 WHERE conversation_id = $2 AND sender_id = $3",
            )
            .bind(REDACTION_MARKER)
            .bind(conversation_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    // Follows, likes and posts cascade; message sender references null out.
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("account {} deleted", user_id);

    Ok(StatusCode::NO_CONTENT)
}

/// Public profile of another user, looked up by handle.
pub async fn get_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let requester_id = claims.user_id()?;

    let mut profile = sqlx::query_as::<_, UserProfileResponse>(
        r#"
        SELECT
            u.id, u.username, u.avatar, u.description, u.gender, u.studies, u.created_at,
            (SELECT COUNT(*) FROM posts WHERE user_id = u.id) AS posts_count,
            (SELECT COUNT(*) FROM follows WHERE followee_id = u.id) AS followers_count,
            (SELECT COUNT(*) FROM follows WHERE follower_id = u.id) AS following_count,
            EXISTS(
                SELECT 1 FROM follows
                WHERE follower_id = $2 AND followee_id = u.id
            ) AS is_following
        FROM users u
        WHERE u.username = $1
        "#,
    )
    .bind(&username)
    .bind(requester_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    profile.avatar = profile.avatar.map(|path| public_url(&headers, &path));

    Ok(Json(profile))
}
