//! User repository for database operations.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use domain::models::user::UserChanges;
use domain::models::Role;

use crate::entities::UserEntity;
use crate::metrics::QueryTimer;

const USER_COLUMNS: &str = "id, utorid, name, email, role, points, suspicious, verified, birthday, \
     password_hash, created_at, last_login";

/// Filters for the manager user listing.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Substring of the utorid or the name.
    pub name: Option<String>,
    pub role: Option<Role>,
    pub verified: Option<bool>,
    pub activated: Option<bool>,
}

/// Repository for user-related database operations.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new UserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_id");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find a user by utorid.
    pub async fn find_by_utorid(&self, utorid: &str) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_utorid");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE utorid = $1"
        ))
        .bind(utorid)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Register a regular, unverified user without a password.
    pub async fn create(&self, utorid: &str, name: &str, email: &str) -> Result<UserEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_user");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            INSERT INTO users (utorid, name, email)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(utorid)
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Create a verified account with a role and password; used to seed the
    /// first superuser.
    pub async fn create_with_role(
        &self,
        utorid: &str,
        name: &str,
        email: &str,
        role: Role,
        password_hash: &str,
    ) -> Result<UserEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_user_with_role");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            INSERT INTO users (utorid, name, email, role, password_hash, verified)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(utorid)
        .bind(name)
        .bind(email)
        .bind(role.as_str())
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Whether any user holds the given role.
    pub async fn exists_with_role(&self, role: Role) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("exists_user_with_role");
        let result: Result<(bool,), sqlx::Error> =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE role = $1)")
                .bind(role.as_str())
                .fetch_one(&self.pool)
                .await;
        timer.record();
        result.map(|(exists,)| exists)
    }

    /// List users matching the filter, newest first.
    pub async fn list(
        &self,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_users");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE ($1::text IS NULL OR utorid ILIKE '%' || $1 || '%' OR name ILIKE '%' || $1 || '%')
              AND ($2::text IS NULL OR role = $2)
              AND ($3::bool IS NULL OR verified = $3)
              AND ($4::bool IS NULL OR (last_login IS NOT NULL) = $4)
            ORDER BY id
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.name.as_deref())
        .bind(filter.role.map(|r| r.as_str()))
        .bind(filter.verified)
        .bind(filter.activated)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Count users matching the filter.
    pub async fn count(&self, filter: &UserFilter) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_users");
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE ($1::text IS NULL OR utorid ILIKE '%' || $1 || '%' OR name ILIKE '%' || $1 || '%')
              AND ($2::text IS NULL OR role = $2)
              AND ($3::bool IS NULL OR verified = $3)
              AND ($4::bool IS NULL OR (last_login IS NOT NULL) = $4)
            "#,
        )
        .bind(filter.name.as_deref())
        .bind(filter.role.map(|r| r.as_str()))
        .bind(filter.verified)
        .bind(filter.activated)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(|(count,)| count)
    }

    /// Update the caller's own profile fields.
    pub async fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        email: Option<&str>,
        birthday: Option<NaiveDate>,
    ) -> Result<UserEntity, sqlx::Error> {
        let timer = QueryTimer::new("update_user_profile");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                birthday = COALESCE($4, birthday)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(birthday)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Apply a manager's changes to another user.
    pub async fn apply_changes(&self, id: i64, changes: &UserChanges) -> Result<UserEntity, sqlx::Error> {
        let timer = QueryTimer::new("update_user_admin");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                verified = COALESCE($3, verified),
                suspicious = COALESCE($4, suspicious),
                role = COALESCE($5, role)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email.as_deref())
        .bind(changes.verified)
        .bind(changes.suspicious)
        .bind(changes.role.map(|r| r.as_str()))
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Replace the stored password hash.
    pub async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("set_user_password");
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(())
    }

    /// Update user's last login timestamp.
    pub async fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("update_user_last_login");
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(())
    }
}
