//! User domain model and request/response DTOs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::DomainError;
use crate::models::role::Role;

/// A loyalty-program member.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub utorid: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub points: i64,
    pub suspicious: bool,
    pub verified: bool,
    pub birthday: Option<NaiveDate>,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Request payload for registering a user (cashier or above).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(custom(function = "shared::validation::validate_utorid"))]
    pub utorid: String,

    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,

    #[validate(custom(function = "shared::validation::validate_uoft_email"))]
    pub email: String,
}

/// Request payload for updating the caller's own profile.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: Option<String>,

    #[validate(custom(function = "shared::validation::validate_uoft_email"))]
    pub email: Option<String>,

    pub birthday: Option<NaiveDate>,
}

impl UpdateMeRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.birthday.is_none()
    }
}

/// Request payload for changing the caller's password.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub old: String,

    #[validate(custom(function = "shared::validation::validate_password"))]
    pub new: String,
}

/// Request payload for a manager updating another user.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(custom(function = "shared::validation::validate_uoft_email"))]
    pub email: Option<String>,

    pub verified: Option<bool>,

    pub suspicious: Option<bool>,

    pub role: Option<Role>,
}

/// Field changes produced by [`plan_user_update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub email: Option<String>,
    pub verified: Option<bool>,
    pub suspicious: Option<bool>,
    pub role: Option<Role>,
}

/// Checks a manager's update of another user against the role rules.
///
/// - `verified` can only be set to `true`
/// - the caller must be allowed to assign the requested role
/// - promoting to cashier clears the suspicious flag
pub fn plan_user_update(
    actor: Role,
    target: &User,
    req: UpdateUserRequest,
) -> Result<UserChanges, DomainError> {
    if req.email.is_none() && req.verified.is_none() && req.suspicious.is_none() && req.role.is_none()
    {
        return Err(DomainError::invalid("No fields to update"));
    }

    if req.verified == Some(false) {
        return Err(DomainError::invalid("verified can only be set to true"));
    }

    let mut suspicious = req.suspicious;

    if let Some(role) = req.role {
        if !actor.can_assign(role) {
            return Err(DomainError::forbidden(format!(
                "A {} cannot assign the {} role",
                actor, role
            )));
        }
        if role == Role::Cashier && target.role != Role::Cashier {
            if suspicious == Some(true) {
                return Err(DomainError::invalid(
                    "A suspicious user cannot be promoted to cashier",
                ));
            }
            suspicious = Some(false);
        }
    }

    Ok(UserChanges {
        email: req.email,
        verified: req.verified,
        suspicious,
        role: req.role,
    })
}

/// Full user representation (self and manager views).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub utorid: String,
    pub name: String,
    pub email: String,
    pub birthday: Option<NaiveDate>,
    pub role: Role,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub verified: bool,
    pub suspicious: bool,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            utorid: u.utorid,
            name: u.name,
            email: u.email,
            birthday: u.birthday,
            role: u.role,
            points: u.points,
            created_at: u.created_at,
            last_login: u.last_login,
            verified: u.verified,
            suspicious: u.suspicious,
        }
    }
}

/// Limited user representation returned to cashiers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitedUserResponse {
    pub id: i64,
    pub utorid: String,
    pub name: String,
    pub points: i64,
    pub verified: bool,
}

impl From<User> for LimitedUserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            utorid: u.utorid,
            name: u.name,
            points: u.points,
            verified: u.verified,
        }
    }
}

/// Response for a newly registered user, carrying the activation token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUserResponse {
    pub id: i64,
    pub utorid: String,
    pub name: String,
    pub email: String,
    pub verified: bool,
    pub expires_at: DateTime<Utc>,
    pub reset_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: 1,
            utorid: "johndoe1".to_string(),
            name: "John Doe".to_string(),
            email: "john.doe@mail.utoronto.ca".to_string(),
            role,
            points: 0,
            suspicious: false,
            verified: false,
            birthday: None,
            password_hash: None,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_create_user_request_validation() {
        let req = CreateUserRequest {
            utorid: "johndoe1".to_string(),
            name: "John Doe".to_string(),
            email: "john.doe@mail.utoronto.ca".to_string(),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_create_user_request_accepts_generated_names() {
        use fake::{faker::name::en::Name, Fake};

        for _ in 0..20 {
            let name: String = Name().fake();
            let req = CreateUserRequest {
                utorid: "johndoe1".to_string(),
                name: name.chars().take(50).collect(),
                email: "john.doe@mail.utoronto.ca".to_string(),
            };
            assert!(req.validate().is_ok(), "rejected {}", name);
        }
    }

    #[test]
    fn test_create_user_request_bad_email() {
        let req = CreateUserRequest {
            utorid: "johndoe1".to_string(),
            name: "John Doe".to_string(),
            email: "john@gmail.com".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_user_request_long_name() {
        let req = CreateUserRequest {
            utorid: "johndoe1".to_string(),
            name: "x".repeat(51),
            email: "john.doe@mail.utoronto.ca".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_change_password_requires_strong_password() {
        let req = ChangePasswordRequest {
            old: "Old#pass1".to_string(),
            new: "weak".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_me_is_empty() {
        assert!(UpdateMeRequest::default().is_empty());
        let req = UpdateMeRequest {
            name: Some("New".to_string()),
            ..Default::default()
        };
        assert!(!req.is_empty());
    }

    #[test]
    fn test_plan_user_update_empty() {
        let result = plan_user_update(Role::Manager, &user(Role::Regular), Default::default());
        assert!(matches!(result, Err(DomainError::Invalid(_))));
    }

    #[test]
    fn test_plan_user_update_verified_false_rejected() {
        let req = UpdateUserRequest {
            verified: Some(false),
            ..Default::default()
        };
        let result = plan_user_update(Role::Manager, &user(Role::Regular), req);
        assert_eq!(
            result,
            Err(DomainError::invalid("verified can only be set to true"))
        );
    }

    #[test]
    fn test_plan_user_update_manager_cannot_make_manager() {
        let req = UpdateUserRequest {
            role: Some(Role::Manager),
            ..Default::default()
        };
        let result = plan_user_update(Role::Manager, &user(Role::Regular), req);
        assert!(matches!(result, Err(DomainError::Forbidden(_))));
    }

    #[test]
    fn test_plan_user_update_promote_to_cashier_clears_suspicious() {
        let mut target = user(Role::Regular);
        target.suspicious = true;
        let req = UpdateUserRequest {
            role: Some(Role::Cashier),
            ..Default::default()
        };
        let changes = plan_user_update(Role::Manager, &target, req).unwrap();
        assert_eq!(changes.role, Some(Role::Cashier));
        assert_eq!(changes.suspicious, Some(false));
    }

    #[test]
    fn test_plan_user_update_superuser_any_role() {
        let req = UpdateUserRequest {
            role: Some(Role::Superuser),
            ..Default::default()
        };
        let changes = plan_user_update(Role::Superuser, &user(Role::Manager), req).unwrap();
        assert_eq!(changes.role, Some(Role::Superuser));
        assert_eq!(changes.suspicious, None);
    }

    #[test]
    fn test_limited_response_hides_email() {
        let json = serde_json::to_value(LimitedUserResponse::from(user(Role::Regular))).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["utorid"], "johndoe1");
    }
}
