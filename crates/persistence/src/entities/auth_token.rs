//! Login and reset token entities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the login_tokens table.
#[derive(Debug, Clone, FromRow)]
pub struct LoginTokenEntity {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl LoginTokenEntity {
    /// A login token is live until it expires or the user logs out.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }
}

/// Database row mapping for the reset_tokens table.
#[derive(Debug, Clone, FromRow)]
pub struct ResetTokenEntity {
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl ResetTokenEntity {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }
}
