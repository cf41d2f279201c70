// src/models/user.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique login identity.
    pub email: String,

    /// Display name. Equal to the email until the user updates it.
    pub name: String,

    /// Used as the second factor on the candidate portal.
    pub birth_date: Option<NaiveDate>,

    /// Coin balance. Only the ledger writes this column.
    pub coins: i64,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

/// DTO for updating the current user's profile.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

/// DTO for requesting a magic login link.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
}

/// DTO for redeeming a magic login link.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyLoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub token: String,
}

/// Canonical form of an email identity, used for lookups and token keys.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
