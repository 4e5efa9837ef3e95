// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{CreateUserRequest, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, User},
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&hashed_password)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            let field = e
                .as_database_error()
                .and_then(|db| db.constraint())
                .map(|c| if c.contains("email") { "email" } else { "username" })
                .unwrap_or("username");
            AppError::Conflict(format!("That {} is already taken", field))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// Verifies the username and password against the database.
/// If valid, signs a JWT token with the user's ID and handle.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let user = user.ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    let is_valid = verify_password(&payload.password, &user.password)?;

    if !is_valid {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let token = sign_jwt(
        user.id,
        &user.username,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user_id": user.id,
        "username": user.username,
    })))
}

/// Mints a password-reset token valid for one hour.
///
/// The response never reveals whether the email exists.
/// TODO: deliver the token by email once a mailer is configured.
pub async fn forgot_password(
    State(pool): State<PgPool>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let token = uuid::Uuid::new_v4().simple().to_string();
    let expires = chrono::Utc::now() + chrono::Duration::hours(1);

    let result = sqlx::query(
        "UPDATE users SET reset_token = $1, reset_token_expires = $2 WHERE email = $3",
    )
    .bind(&token)
    .bind(expires)
    .bind(&payload.email)
    .execute(&pool)
    .await?;

    if result.rows_affected() > 0 {
        tracing::debug!("issued password reset token for {}", payload.email);
    }

    Ok(Json(json!({
        "message": "If that email is registered, a reset token has been issued."
    })))
}

/// Consumes a non-expired reset token and sets the new password.
pub async fn reset_password(
    State(pool): State<PgPool>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM users WHERE reset_token = $1 AND reset_token_expires > NOW()",
    )
    .bind(&payload.token)
    .fetch_optional(&pool)
    .await?;

    let user_id =
        user_id.ok_or(AppError::BadRequest("Invalid or expired reset token".to_string()))?;

    let hashed_password = hash_password(&payload.new_password)?;

    sqlx::query(
        "UPDATE users SET password = $1, reset_token = NULL, reset_token_expires = NULL WHERE id = $2",
    )
    .bind(&hashed_password)
    .bind(user_id)
    .execute(&pool)
    .await?;

    Ok(Json(json!({ "message": "Password updated" })))
}
