// src/utils/upload.rs

use axum::http::{HeaderMap, header};
use std::path::Path;
use uuid::Uuid;

use crate::error::AppError;

/// Accepted image content types and the extension each is stored under.
const ALLOWED_IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Persists an uploaded image under the upload directory with a random
/// filename and returns the stored reference ("uploads/<name>").
pub async fn save_image(
    upload_dir: &str,
    content_type: Option<&str>,
    data: &[u8],
) -> Result<String, AppError> {
    let ext = content_type
        .and_then(|ct| ALLOWED_IMAGE_TYPES.iter().find(|(mime, _)| *mime == ct))
        .map(|(_, ext)| *ext)
        .ok_or_else(|| AppError::BadRequest("Unsupported image type".to_string()))?;

    if data.is_empty() {
        return Err(AppError::BadRequest("Empty image upload".to_string()));
    }

    let filename = format!("{}.{}", Uuid::new_v4(), ext);

    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    tokio::fs::write(Path::new(upload_dir).join(&filename), data)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(format!("uploads/{}", filename))
}

/// Rewrites a stored reference into an absolute URL using the request's
/// own host and scheme, so clients behind any hostname or proxy resolve it.
pub fn public_url(headers: &HeaderMap, stored: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:3000");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");

    match url::Url::parse(&format!("{}://{}", scheme, host)).and_then(|base| base.join(stored)) {
        Ok(absolute) => absolute.to_string(),
        Err(_) => stored.to_string(),
    }
}
