use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    config::Config,
    error::AppError,
    models::post::{MAX_POST_LEN, PostListParams, PostResponse},
    realtime::{events::ChatEvent, notifier::Notifier},
    utils::{
        html::clean_html,
        jwt::Claims,
        upload::{public_url, save_image},
    },
};

/// Create a new post.
///
/// Multipart form: `content` (required), `is_rich` (optional flag),
/// `image` (optional file). Rich bodies are sanitized before storage.
/// Broadcasts `new_post` to every connected session.
pub async fn create_post(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(notifier): State<Notifier>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut content: Option<String> = None;
    let mut is_rich = false;
    let mut image_upload: Option<(Option<String>, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("content") => {
                content = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?,
                );
            }
            Some("is_rich") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                is_rich = value == "true" || value == "1";
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

    let content = content
        .filter(|c| !c.trim().is_empty())
        .ok_or(AppError::BadRequest("Post content is required".to_string()))?;

    if content.chars().count() > MAX_POST_LEN {
        return Err(AppError::BadRequest(format!(
            "Post content must be at most {} characters",
            MAX_POST_LEN
        )));
    }

    let content = if is_rich { clean_html(&content) } else { content };

    let image = match image_upload {
        Some((content_type, data)) => {
            Some(save_image(&config.upload_dir, content_type.as_deref(), &data).await?)
        }
        None => None,
    };

    let (post_id, created_at): (i64, chrono::DateTime<chrono::Utc>) = sqlx::query_as(
        r#"
        INSERT INTO posts (user_id, content, is_rich, image)
        VALUES ($1, $2, $3, $4)
        RETURNING id, created_at
        "#,
    )
    .bind(user_id)
    .bind(&content)
    .bind(is_rich)
    .bind(&image)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create post: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let image = image.map(|path| public_url(&headers, &path));

    notifier.emit(ChatEvent::NewPost {
        id: post_id,
        user_id,
        username: claims.username.clone(),
        content: content.clone(),
        image: image.clone(),
        created_at,
    });

    let post = PostResponse {
        id: post_id,
        user_id,
        username: claims.username,
        content,
        is_rich,
        image,
        likes_count: 0,
        is_liked: false,
        created_at,
    };

    Ok((StatusCode::CREATED, Json(post)))
}

/// List posts (Recent first).
/// Supports cursor-based pagination and carries the requester's like state.
pub async fn list_posts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<PostListParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let limit = params.limit.unwrap_or(20).min(100); // Default 20, max 100

    let mut posts = sqlx::query_as::<_, PostResponse>(
        r#"
        SELECT
            p.id, p.user_id, u.username, p.content, p.is_rich, p.image,
            p.likes_count,
            (pl.user_id IS NOT NULL) AS is_liked,
            p.created_at
        FROM posts p
        JOIN users u ON u.id = p.user_id
        LEFT JOIN post_likes pl ON pl.post_id = p.id AND pl.user_id = $1
        WHERE ($2::TIMESTAMPTZ IS NULL OR p.created_at < $2)
        ORDER BY p.created_at DESC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(params.cursor)
    .bind(limit)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list posts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    for post in &mut posts {
        post.image = post.image.take().map(|path| public_url(&headers, &path));
    }

    Ok(Json(posts))
}

/// Get a single post by ID.
pub async fn get_post(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut post = sqlx::query_as::<_, PostResponse>(
        r#"
        SELECT
            p.id, p.user_id, u.username, p.content, p.is_rich, p.image,
            p.likes_count,
            (pl.user_id IS NOT NULL) AS is_liked,
            p.created_at
        FROM posts p
        JOIN users u ON u.id = p.user_id
        LEFT JOIN post_likes pl ON pl.post_id = p.id AND pl.user_id = $1
        WHERE p.id = $2
        "#,
    )
    .bind(user_id)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Post not found".to_string()))?;

    post.image = post.image.take().map(|path| public_url(&headers, &path));

    Ok(Json(post))
}

/// Delete a post. Author-only; the record and its likes are removed for
/// good, and every connected session hears `post_deleted`.
pub async fn delete_post(
    State(pool): State<PgPool>,
    State(notifier): State<Notifier>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let author_id: Option<i64> = sqlx::query_scalar("SELECT user_id FROM posts WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;

    let author_id = author_id.ok_or(AppError::NotFound("Post not found".to_string()))?;

    if author_id != user_id {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this post".to_string(),
        ));
    }

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete post: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    notifier.emit(ChatEvent::PostDeleted { post_id: id });

    Ok(StatusCode::NO_CONTENT)
}
