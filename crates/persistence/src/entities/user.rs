//! User entity (database row mapping).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use std::str::FromStr;

use domain::models::Role;

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: i64,
    pub utorid: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub points: i64,
    pub suspicious: bool,
    pub verified: bool,
    pub birthday: Option<NaiveDate>,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<UserEntity> for domain::models::User {
    fn from(entity: UserEntity) -> Self {
        Self {
            id: entity.id,
            utorid: entity.utorid,
            name: entity.name,
            email: entity.email,
            // The column is constrained to known roles.
            role: Role::from_str(&entity.role).unwrap_or(Role::Regular),
            points: entity.points,
            suspicious: entity.suspicious,
            verified: entity.verified,
            birthday: entity.birthday,
            password_hash: entity.password_hash,
            created_at: entity.created_at,
            last_login: entity.last_login,
        }
    }
}
