use axum::{
    Extension, Json,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::{AppError, is_unique_violation},
    models::user::PublicUser,
    utils::{jwt::Claims, upload::public_url},
};

async fn resolve_user_id(pool: &PgPool, username: &str) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// Start following a user.
pub async fn follow_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let follower_id = claims.user_id()?;
    let followee_id = resolve_user_id(&pool, &username).await?;

    if follower_id == followee_id {
        return Err(AppError::BadRequest("You cannot follow yourself".to_string()));
    }

    sqlx::query("INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2)")
        .bind(follower_id)
        .bind(followee_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Already following {}", username))
            } else {
                AppError::from(e)
            }
        })?;

    Ok(Json(json!({ "following": true })))
}

/// Stop following a user.
pub async fn unfollow_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let follower_id = claims.user_id()?;
    let followee_id = resolve_user_id(&pool, &username).await?;

    let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
        .bind(follower_id)
        .bind(followee_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(format!("Not following {}", username)));
    }

    Ok(Json(json!({ "following": false })))
}

/// List the users following the given user.
pub async fn list_followers(
    State(pool): State<PgPool>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = resolve_user_id(&pool, &username).await?;

    let followers = sqlx::query_as::<_, PublicUser>(
        r#"
        SELECT u.id, u.username, u.avatar, u.description, u.gender, u.studies
        FROM follows f
        JOIN users u ON u.id = f.follower_id
        WHERE f.followee_id = $1
        ORDER BY f.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(with_absolute_avatars(followers, &headers)))
}

/// List the users the given user follows.
pub async fn list_following(
    State(pool): State<PgPool>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = resolve_user_id(&pool, &username).await?;

    let following = sqlx::query_as::<_, PublicUser>(
        r#"
        SELECT u.id, u.username, u.avatar, u.description, u.gender, u.studies
        FROM follows f
        JOIN users u ON u.id = f.followee_id
        WHERE f.follower_id = $1
        ORDER BY f.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(with_absolute_avatars(following, &headers)))
}

fn with_absolute_avatars(mut users: Vec<PublicUser>, headers: &HeaderMap) -> Vec<PublicUser> {
    for user in &mut users {
        user.avatar = user.avatar.take().map(|path| public_url(headers, &path));
    }
    users
}
