//! Authentication DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request payload for `POST /auth/tokens`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "utorid is required"))]
    pub utorid: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Request payload for `POST /auth/resets`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetRequest {
    #[validate(custom(function = "shared::validation::validate_utorid"))]
    pub utorid: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub expires_at: DateTime<Utc>,
    pub reset_token: String,
}

/// Request payload for `POST /auth/resets/:resetToken`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CompleteResetRequest {
    #[validate(custom(function = "shared::validation::validate_utorid"))]
    pub utorid: String,

    #[validate(custom(function = "shared::validation::validate_password"))]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_requires_fields() {
        let req = LoginRequest {
            utorid: String::new(),
            password: "x".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_complete_reset_rejects_weak_password() {
        let req = CompleteResetRequest {
            utorid: "johndoe1".to_string(),
            password: "password".to_string(),
        };
        assert!(req.validate().is_err());

        let req = CompleteResetRequest {
            utorid: "johndoe1".to_string(),
            password: "Str0ng!pass".to_string(),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_reset_response_is_camel_case() {
        let json = serde_json::to_value(ResetResponse {
            expires_at: Utc::now(),
            reset_token: "abc".to_string(),
        })
        .unwrap();
        assert!(json.get("resetToken").is_some());
        assert!(json.get("expiresAt").is_some());
    }
}
