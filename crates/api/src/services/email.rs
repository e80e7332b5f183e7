//! Email service for activation and password reset emails.
//!
//! Providers:
//! - `console`: logs emails through tracing (development and tests)

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::EmailConfig;

/// Errors that can occur during email operations.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service not configured")]
    NotConfigured,

    #[error("Failed to send email: {0}")]
    SendFailed(String),
}

/// Email message to be sent.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body_text: String,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Send an email message. A disabled service drops the message.
    pub async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        if !self.config.enabled {
            debug!(
                to = %message.to,
                subject = %message.subject,
                "Email service disabled, skipping send"
            );
            return Ok(());
        }

        match self.config.provider.as_str() {
            "console" => self.send_console(message).await,
            provider => {
                error!(provider = %provider, "Unknown email provider");
                Err(EmailError::NotConfigured)
            }
        }
    }

    /// Sends the activation link handed out when staff register a user.
    pub async fn send_activation_email(
        &self,
        to_email: &str,
        to_name: &str,
        utorid: &str,
        reset_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), EmailError> {
        let url = format!("{}/activate/{}", self.config.base_url, reset_token);
        let body_text = format!(
            "Hi {to_name},\n\n\
             An AuraClub account was created for {utorid}. Set your password here:\n\n\
             {url}\n\n\
             This link expires at {expires}.\n\n\
             The AuraClub Team",
            expires = expires_at.to_rfc3339(),
        );

        self.send(EmailMessage {
            to: to_email.to_string(),
            to_name: Some(to_name.to_string()),
            subject: "Activate your AuraClub account".to_string(),
            body_text,
        })
        .await
    }

    /// Sends a password reset link.
    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        to_name: &str,
        reset_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), EmailError> {
        let url = format!("{}/reset-password/{}", self.config.base_url, reset_token);
        let body_text = format!(
            "Hi {to_name},\n\n\
             We received a request to reset your password:\n\n\
             {url}\n\n\
             This link expires at {expires}. If you didn't ask for a reset, ignore this email.\n\n\
             The AuraClub Team",
            expires = expires_at.to_rfc3339(),
        );

        self.send(EmailMessage {
            to: to_email.to_string(),
            to_name: Some(to_name.to_string()),
            subject: "Reset your AuraClub password".to_string(),
            body_text,
        })
        .await
    }

    async fn send_console(&self, message: EmailMessage) -> Result<(), EmailError> {
        if message.to.is_empty() {
            return Err(EmailError::SendFailed("empty recipient".to_string()));
        }

        info!(
            to = %message.to,
            to_name = ?message.to_name,
            subject = %message.subject,
            from = %self.config.sender_email,
            from_name = %self.config.sender_name,
            "Email (console provider)"
        );
        info!(body_text = %message.body_text, "Email body");

        Ok(())
    }
}
