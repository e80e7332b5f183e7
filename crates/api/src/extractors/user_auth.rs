//! Bearer token authentication extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use domain::models::{Role, User};

use crate::app::AppState;
use crate::error::ApiError;

/// The authenticated caller, loaded fresh from the database per request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    /// Rejects the request with 403 unless the caller has at least `role`.
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.0.role.has_at_least(role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "This action requires the {} role or higher",
                role
            )))
        }
    }

    /// Rejects unverified accounts with 403.
    pub fn require_verified(&self) -> Result<(), ApiError> {
        if self.0.verified {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Account is not verified".to_string()))
        }
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(parts)?;
        let user = state.auth_service().authenticate(token).await?;

        let current = CurrentUser(user);
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::Utc;

    fn user(role: Role, verified: bool) -> CurrentUser {
        CurrentUser(User {
            id: 5,
            utorid: "cashier1".to_string(),
            name: "Cash".to_string(),
            email: "cash@mail.utoronto.ca".to_string(),
            role,
            points: 0,
            suspicious: false,
            verified,
            birthday: None,
            password_hash: None,
            created_at: Utc::now(),
            last_login: None,
        })
    }

    fn parts(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/users/me");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_require_role() {
        let cashier = user(Role::Cashier, true);
        assert!(cashier.require(Role::Regular).is_ok());
        assert!(cashier.require(Role::Cashier).is_ok());
        assert!(matches!(
            cashier.require(Role::Manager),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn test_require_verified() {
        assert!(user(Role::Regular, true).require_verified().is_ok());
        assert!(user(Role::Regular, false).require_verified().is_err());
    }

    #[test]
    fn test_bearer_token() {
        let p = parts(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&p).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_missing_or_malformed() {
        assert!(matches!(bearer_token(&parts(None)), Err(ApiError::Unauthorized(_))));
        assert!(matches!(
            bearer_token(&parts(Some("Basic dXNlcjpwYXNz"))),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            bearer_token(&parts(Some("Bearer "))),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
