use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::{AppError, is_unique_violation},
    realtime::{events::ChatEvent, notifier::Notifier},
    utils::jwt::Claims,
};

async fn post_exists(pool: &PgPool, post_id: i64) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
        .bind(post_id)
        .fetch_one(pool)
        .await?;

    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound("Post not found".to_string()))
    }
}

/// Like a post.
///
/// The like row and the counter move in one transaction; the composite
/// primary key turns a second like into a 409 instead of a double count.
pub async fn like_post(
    State(pool): State<PgPool>,
    State(notifier): State<Notifier>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    post_exists(&pool, post_id).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO post_likes (user_id, post_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Already liked".to_string())
            } else {
                AppError::from(e)
            }
        })?;

    let likes_count: i32 = sqlx::query_scalar(
        "UPDATE posts SET likes_count = likes_count + 1 WHERE id = $1 RETURNING likes_count",
    )
    .bind(post_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    notifier.emit(ChatEvent::PostLiked {
        post_id,
        user_id,
        likes_count,
    });

    Ok(Json(serde_json::json!({ "liked": true, "likes_count": likes_count })))
}

/// Withdraw a like.
///
/// Unliking a post that was never liked is a 409, and the counter is
/// floored at zero.
pub async fn unlike_post(
    State(pool): State<PgPool>,
    State(notifier): State<Notifier>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    post_exists(&pool, post_id).await?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM post_likes WHERE user_id = $1 AND post_id = $2")
        .bind(user_id)
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Not liked".to_string()));
    }

    let likes_count: i32 = sqlx::query_scalar(
        "UPDATE posts SET likes_count = GREATEST(0, likes_count - 1) WHERE id = $1 RETURNING likes_count",
    )
    .bind(post_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    notifier.emit(ChatEvent::PostUnliked {
        post_id,
        user_id,
        likes_count,
    });

    Ok(Json(serde_json::json!({ "liked": false, "likes_count": likes_count })))
}
