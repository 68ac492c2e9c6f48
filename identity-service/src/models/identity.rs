//! Identity model - a registered principal.

use chrono::Utc;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::validation::{validate_email, validate_username, ValidationError};

/// Validated email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        validate_email(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        validate_username(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque, non-empty password digest.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(digest: impl Into<String>) -> Result<Self, ValidationError> {
        let digest = digest.into();
        if digest.is_empty() {
            return Err(ValidationError::InvalidPassword);
        }
        Ok(Self(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash(***)")
    }
}

/// Identity entity. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Email,
    pub username: Username,
    #[serde(skip_serializing)]
    pub password_hash: PasswordHash,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Identity {
    /// Create a new identity with a fresh id and timestamps.
    pub fn new(email: &str, username: &str, password_hash: &str) -> Result<Self, ValidationError> {
        let now = Utc::now().timestamp_millis();
        Ok(Self {
            id: Uuid::new_v4(),
            email: Email::parse(email)?,
            username: Username::parse(username)?,
            password_hash: PasswordHash::new(password_hash)?,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Raw `identities` row.
#[derive(Debug, Clone, FromRow)]
pub struct IdentityRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = ValidationError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            email: Email::parse(row.email)?,
            username: Username::parse(row.username)?,
            password_hash: PasswordHash::new(row.password_hash)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
