//! Superuser bootstrap for initial setup.
//!
//! Creates the first superuser on startup when configured. Does nothing once
//! any superuser exists.

use domain::models::Role;
use persistence::repositories::UserRepository;
use shared::password::{hash_password, PasswordError};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::BootstrapConfig;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] PasswordError),
}

/// Returns `true` when a superuser was created.
pub async fn bootstrap_superuser(
    pool: &PgPool,
    config: &BootstrapConfig,
) -> Result<bool, BootstrapError> {
    if config.superuser_utorid.is_empty() {
        return Ok(false);
    }

    if !config.is_configured() {
        warn!(
            "AURA__BOOTSTRAP__SUPERUSER_UTORID is set but AURA__BOOTSTRAP__SUPERUSER_PASSWORD is empty - skipping bootstrap"
        );
        return Ok(false);
    }

    let users = UserRepository::new(pool.clone());
    if users.exists_with_role(Role::Superuser).await? {
        info!("Superuser already exists - skipping bootstrap");
        return Ok(false);
    }

    let password_hash = hash_password(&config.superuser_password)?;
    let name = if config.superuser_name.is_empty() {
        "Superuser"
    } else {
        &config.superuser_name
    };
    let email = if config.superuser_email.is_empty() {
        format!("{}@mail.utoronto.ca", config.superuser_utorid)
    } else {
        config.superuser_email.clone()
    };

    let user = users
        .create_with_role(
            &config.superuser_utorid,
            name,
            &email,
            Role::Superuser,
            &password_hash,
        )
        .await?;

    info!(utorid = %user.utorid, user_id = user.id, "Bootstrap superuser created");
    warn!("SECURITY: remove AURA__BOOTSTRAP__SUPERUSER_PASSWORD from the environment now that the superuser exists");

    Ok(true)
}
