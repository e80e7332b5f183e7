//! Login and reset token storage.
//!
//! Each user holds at most one of each; issuing a new token replaces the
//! previous row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::entities::{LoginTokenEntity, ResetTokenEntity};
use crate::metrics::QueryTimer;

#[derive(Clone)]
pub struct AuthTokenRepository {
    pool: PgPool,
}

impl AuthTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record the hash of a freshly issued login token, replacing any older one.
    pub async fn upsert_login_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_login_token");
        sqlx::query(
            r#"
            INSERT INTO login_tokens (user_id, token_hash, expires_at, used)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (user_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                expires_at = EXCLUDED.expires_at,
                used = FALSE,
                created_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(())
    }

    pub async fn find_login_token(&self, user_id: i64) -> Result<Option<LoginTokenEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_login_token");
        let result = sqlx::query_as::<_, LoginTokenEntity>(
            r#"
            SELECT user_id, token_hash, expires_at, used, created_at
            FROM login_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Mark the user's login token used so it no longer authenticates.
    pub async fn revoke_login_token(&self, user_id: i64) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("revoke_login_token");
        let result = sqlx::query("UPDATE login_tokens SET used = TRUE WHERE user_id = $1 AND used = FALSE")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }

    /// Store a new activation/reset token for the user.
    pub async fn upsert_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ResetTokenEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_reset_token");
        let result = sqlx::query_as::<_, ResetTokenEntity>(
            r#"
            INSERT INTO reset_tokens (user_id, token, expires_at, used)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (user_id) DO UPDATE
            SET token = EXCLUDED.token,
                expires_at = EXCLUDED.expires_at,
                used = FALSE,
                created_at = NOW()
            RETURNING user_id, token, expires_at, used, created_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_reset_token(&self, token: &str) -> Result<Option<ResetTokenEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_reset_token");
        let result = sqlx::query_as::<_, ResetTokenEntity>(
            r#"
            SELECT user_id, token, expires_at, used, created_at
            FROM reset_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Consume a reset token and set the new password in one transaction.
    ///
    /// Returns `false` when the token was used concurrently.
    pub async fn complete_reset(
        &self,
        user_id: i64,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("complete_password_reset");
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            r#"
            UPDATE reset_tokens
            SET used = TRUE
            WHERE user_id = $1 AND token = $2 AND used = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            timer.record();
            return Ok(false);
        }

        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;

        // Existing sessions end with a password change.
        sqlx::query("UPDATE login_tokens SET used = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        timer.record();
        Ok(true)
    }
}
