//! Authentication service: login tokens, activation and password resets.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use thiserror::Error;

use domain::models::auth::{LoginResponse, ResetResponse};
use domain::models::User;
use persistence::repositories::{AuthTokenRepository, UserRepository};
use shared::crypto::{generate_reset_token, sha256_hex};
use shared::jwt::{extract_user_id, JwtConfig, JwtError};
use shared::password::{hash_password, verify_password, PasswordError};

use crate::config::LedgerConfig;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Reset token not found")]
    ResetTokenNotFound,

    #[error("Reset token has expired or was already used")]
    ResetTokenExpired,

    #[error("Reset token does not belong to this utorid")]
    UtoridMismatch,

    #[error("Current password is incorrect")]
    WrongPassword,

    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::UtoridMismatch => ApiError::Unauthorized(err.to_string()),
            AuthError::UserNotFound | AuthError::ResetTokenNotFound => {
                ApiError::NotFound(err.to_string())
            }
            AuthError::ResetTokenExpired => ApiError::Gone(err.to_string()),
            AuthError::WrongPassword => ApiError::Forbidden(err.to_string()),
            AuthError::Token(e) => ApiError::Internal(format!("Token error: {}", e)),
            AuthError::Password(e) => e.into(),
            AuthError::Database(e) => e.into(),
        }
    }
}

/// Result of issuing a reset or activation token.
#[derive(Debug, Clone)]
pub struct IssuedReset {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedReset> for ResetResponse {
    fn from(issued: IssuedReset) -> Self {
        ResetResponse {
            expires_at: issued.expires_at,
            reset_token: issued.token,
        }
    }
}

pub struct AuthService {
    users: UserRepository,
    tokens: AuthTokenRepository,
    jwt: JwtConfig,
    reset_expiry: Duration,
    activation_expiry: Duration,
}

impl AuthService {
    pub fn new(pool: PgPool, jwt: JwtConfig, ledger: &LedgerConfig) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            tokens: AuthTokenRepository::new(pool),
            jwt,
            reset_expiry: Duration::seconds(ledger.reset_token_expiry_secs),
            activation_expiry: Duration::days(ledger.activation_token_expiry_days),
        }
    }

    /// Checks credentials and issues a fresh login token, replacing any
    /// previous one.
    pub async fn login(&self, utorid: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let user: User = self
            .users
            .find_by_utorid(utorid)
            .await?
            .ok_or(AuthError::InvalidCredentials)?
            .into();

        // Accounts without a password have not been activated yet.
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.jwt.issue_token(user.id)?;
        self.tokens
            .upsert_login_token(user.id, &sha256_hex(&issued.jti), issued.expires_at)
            .await?;
        self.users.update_last_login(user.id, Utc::now()).await?;

        tracing::info!(user_id = user.id, "User logged in");

        Ok(LoginResponse {
            token: issued.token,
            expires_at: issued.expires_at,
        })
    }

    /// Resolves a bearer token to its user.
    ///
    /// The token must verify, and its `jti` must match the user's current
    /// live login token.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let claims = self
            .jwt
            .validate_token(token)
            .map_err(|_| AuthError::InvalidToken)?;
        let user_id = extract_user_id(&claims).map_err(|_| AuthError::InvalidToken)?;

        let stored = self
            .tokens
            .find_login_token(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !stored.is_live(Utc::now()) || stored.token_hash != sha256_hex(&claims.jti) {
            return Err(AuthError::InvalidToken);
        }

        self.users
            .find_by_id(user_id)
            .await?
            .map(User::from)
            .ok_or(AuthError::InvalidToken)
    }

    pub async fn logout(&self, user_id: i64) -> Result<(), AuthError> {
        self.tokens.revoke_login_token(user_id).await?;
        tracing::info!(user_id, "User logged out");
        Ok(())
    }

    /// Issues a password reset token for the utorid.
    pub async fn request_reset(&self, utorid: &str) -> Result<IssuedReset, AuthError> {
        let user: User = self
            .users
            .find_by_utorid(utorid)
            .await?
            .ok_or(AuthError::UserNotFound)?
            .into();
        self.issue_reset(user, self.reset_expiry).await
    }

    /// Issues the activation token for a freshly registered user.
    pub async fn issue_activation(&self, user: User) -> Result<IssuedReset, AuthError> {
        self.issue_reset(user, self.activation_expiry).await
    }

    async fn issue_reset(&self, user: User, lifetime: Duration) -> Result<IssuedReset, AuthError> {
        let token = generate_reset_token();
        let expires_at = Utc::now() + lifetime;
        let stored = self
            .tokens
            .upsert_reset_token(user.id, &token, expires_at)
            .await?;
        Ok(IssuedReset {
            user,
            token: stored.token,
            expires_at: stored.expires_at,
        })
    }

    /// Completes a reset (or activation) and ends existing sessions.
    pub async fn reset_password(
        &self,
        token: &str,
        utorid: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let stored = self
            .tokens
            .find_reset_token(token)
            .await?
            .ok_or(AuthError::ResetTokenNotFound)?;

        let user = self
            .users
            .find_by_id(stored.user_id)
            .await?
            .ok_or(AuthError::ResetTokenNotFound)?;
        if user.utorid != utorid {
            return Err(AuthError::UtoridMismatch);
        }

        if !stored.is_live(Utc::now()) {
            return Err(AuthError::ResetTokenExpired);
        }

        let hash = hash_password(new_password)?;
        if !self
            .tokens
            .complete_reset(user.id, token, &hash)
            .await?
        {
            return Err(AuthError::ResetTokenExpired);
        }

        tracing::info!(user_id = user.id, "Password reset completed");
        Ok(())
    }

    /// Changes the password of a logged-in user after checking the old one.
    pub async fn change_password(
        &self,
        user: &User,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let current = user.password_hash.as_deref().ok_or(AuthError::WrongPassword)?;
        if !verify_password(old_password, current)? {
            return Err(AuthError::WrongPassword);
        }

        let hash = hash_password(new_password)?;
        self.users.set_password(user.id, &hash).await?;
        Ok(())
    }
}
