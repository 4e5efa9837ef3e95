// src/models/user.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username regex"));

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique handle, 3-20 chars, alphanumeric plus underscore.
    pub username: String,

    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// Stored upload path of the profile picture, if any.
    pub avatar: Option<String>,

    pub description: String,
    pub gender: String,
    pub age: Option<i32>,
    pub studies: String,
    pub theme: String,

    #[serde(skip)]
    pub reset_token: Option<String>,
    #[serde(skip)]
    pub reset_token_expires: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Public-facing subset of a user record. Safe to embed in any response.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
    pub description: String,
    pub gender: String,
    pub studies: String,
}

/// Aggregated profile data for the current user.
#[derive(Debug, FromRow, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub description: String,
    pub gender: String,
    pub age: Option<i32>,
    pub studies: String,
    pub theme: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub posts_count: i64,
    pub followers_count: i64,
    pub following_count: i64,
}

/// Public profile of another user, with follow state for the requester.
#[derive(Debug, FromRow, Serialize)]
pub struct UserProfileResponse {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
    pub description: String,
    pub gender: String,
    pub studies: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub posts_count: i64,
    pub followers_count: i64,
    pub following_count: i64,
    pub is_following: bool,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(
        length(
            min = 3,
            max = 20,
            message = "Username length must be between 3 and 20 characters."
        ),
        regex(
            path = *USERNAME_RE,
            message = "Username may only contain letters, digits and underscores."
        )
    )]
    pub username: String,

    #[validate(email(message = "Invalid email address."))]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for partial profile updates. Absent fields are left untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 500, message = "Description must be at most 500 characters."))]
    pub description: Option<String>,

    #[validate(custom(function = validate_gender))]
    pub gender: Option<String>,

    #[validate(range(min = 13, max = 120, message = "Age must be between 13 and 120."))]
    pub age: Option<i32>,

    #[validate(length(max = 200, message = "Studies must be at most 200 characters."))]
    pub studies: Option<String>,

    #[validate(custom(function = validate_theme))]
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub new_password: String,
}

fn validate_gender(value: &str) -> Result<(), ValidationError> {
    match value {
        "male" | "female" | "other" | "unspecified" => Ok(()),
        _ => Err(ValidationError::new("invalid_gender")),
    }
}

fn validate_theme(value: &str) -> Result<(), ValidationError> {
    match value {
        "light" | "dark" => Ok(()),
        _ => Err(ValidationError::new("invalid_theme")),
    }
}
