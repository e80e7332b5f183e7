//! User registration, profile and per-user transaction routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use domain::models::transaction::{expect_kind, RedemptionRequest, TransactionResponse, TransferRequest};
use domain::models::user::{
    plan_user_update, ChangePasswordRequest, CreateUserRequest, CreatedUserResponse,
    LimitedUserResponse, UpdateMeRequest, UpdateUserRequest, UserResponse,
};
use domain::models::{Role, TransactionType, User};
use persistence::repositories::{TransactionFilter, TransactionRepository, UserFilter, UserRepository};
use shared::pagination::Paginated;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::routes::{amount_filter, page, parse_optional};

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub name: Option<String>,
    pub role: Option<String>,
    pub verified: Option<bool>,
    pub activated: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyTransactionsQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub related_id: Option<i64>,
    pub promotion_id: Option<i64>,
    pub amount: Option<i64>,
    pub operator: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// A user as seen by the caller: cashiers get the limited view.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UserView {
    Full(UserResponse),
    Limited(LimitedUserResponse),
}

async fn load_user(users: &UserRepository, id: i64) -> Result<User, ApiError> {
    users
        .find_by_id(id)
        .await?
        .map(User::from)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

fn unique_violation(err: sqlx::Error, message: &str) -> ApiError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict(message.to_string())
        }
        _ => err.into(),
    }
}

/// POST /users
///
/// Registers an inactive account and hands back its activation token.
pub async fn register_user(
    State(state): State<AppState>,
    actor: CurrentUser,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), ApiError> {
    actor.require(Role::Cashier)?;
    request.validate()?;

    let users = UserRepository::new(state.pool.clone());
    let user: User = users
        .create(&request.utorid, &request.name, &request.email)
        .await
        .map_err(|e| unique_violation(e, "A user with this utorid or email already exists"))?
        .into();

    let issued = state.auth_service().issue_activation(user).await?;
    if let Err(e) = state
        .email
        .send_activation_email(
            &issued.user.email,
            &issued.user.name,
            &issued.user.utorid,
            &issued.token,
            issued.expires_at,
        )
        .await
    {
        tracing::error!(user_id = issued.user.id, error = %e, "Failed to send activation email");
    }

    tracing::info!(user_id = issued.user.id, created_by = actor.id(), "User registered");

    Ok((
        StatusCode::CREATED,
        Json(CreatedUserResponse {
            id: issued.user.id,
            utorid: issued.user.utorid,
            name: issued.user.name,
            email: issued.user.email,
            verified: issued.user.verified,
            expires_at: issued.expires_at,
            reset_token: issued.token,
        }),
    ))
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    actor: CurrentUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Paginated<UserResponse>>, ApiError> {
    actor.require(Role::Manager)?;
    let page = page(query.page, query.limit)?;
    let filter = UserFilter {
        name: query.name,
        role: parse_optional(query.role.as_deref(), "role")?,
        verified: query.verified,
        activated: query.activated,
    };

    let users = UserRepository::new(state.pool.clone());
    let count = users.count(&filter).await?;
    let results = users
        .list(&filter, page.limit, page.offset())
        .await?
        .into_iter()
        .map(|e| UserResponse::from(User::from(e)))
        .collect();

    Ok(Json(Paginated::new(count, results)))
}

/// GET /users/me
pub async fn get_me(user: CurrentUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PATCH /users/me
pub async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    request.validate()?;
    if request.is_empty() {
        return Err(ApiError::Validation("No fields to update".to_string()));
    }

    let updated = UserRepository::new(state.pool.clone())
        .update_profile(
            user.id(),
            request.name.as_deref(),
            request.email.as_deref(),
            request.birthday,
        )
        .await
        .map_err(|e| unique_violation(e, "Email is already in use"))?;

    Ok(Json(User::from(updated).into()))
}

/// PATCH /users/me/password
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    request.validate()?;
    state
        .auth_service()
        .change_password(&user.0, &request.old, &request.new)
        .await?;
    Ok(StatusCode::OK)
}

/// GET /users/:user_id
pub async fn get_user(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<Json<UserView>, ApiError> {
    actor.require(Role::Cashier)?;
    let user = load_user(&UserRepository::new(state.pool.clone()), user_id).await?;

    let view = if actor.role().has_at_least(Role::Manager) {
        UserView::Full(user.into())
    } else {
        UserView::Limited(user.into())
    };
    Ok(Json(view))
}

/// PATCH /users/:user_id
pub async fn update_user(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(user_id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    actor.require(Role::Manager)?;
    request.validate()?;

    let users = UserRepository::new(state.pool.clone());
    let target = load_user(&users, user_id).await?;
    let changes = plan_user_update(actor.role(), &target, request)?;

    let updated = users
        .apply_changes(user_id, &changes)
        .await
        .map_err(|e| unique_violation(e, "Email is already in use"))?;

    tracing::info!(user_id, updated_by = actor.id(), "User updated");
    Ok(Json(User::from(updated).into()))
}

/// POST /users/me/transactions
pub async fn create_redemption(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<RedemptionRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    request.validate()?;
    expect_kind(&request.kind, TransactionType::Redemption)?;

    let entity = TransactionRepository::new(state.pool.clone())
        .create_redemption(
            user.id(),
            request.amount,
            request.remark.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(domain::models::Transaction::from(entity).into())))
}

/// GET /users/me/transactions
pub async fn list_my_transactions(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<MyTransactionsQuery>,
) -> Result<Json<Paginated<TransactionResponse>>, ApiError> {
    let page = page(query.page, query.limit)?;
    let filter = TransactionFilter {
        user_id: Some(user.id()),
        kind: parse_optional(query.kind.as_deref(), "type")?,
        related_id: query.related_id,
        promotion_id: query.promotion_id,
        amount: amount_filter(query.amount, query.operator.as_deref())?,
        ..Default::default()
    };

    let repo = TransactionRepository::new(state.pool.clone());
    let count = repo.count(&filter).await?;
    let results = repo
        .list(&filter, page.limit, page.offset())
        .await?
        .into_iter()
        .map(|e| TransactionResponse::from(domain::models::Transaction::from(e)))
        .collect();

    Ok(Json(Paginated::new(count, results)))
}

/// POST /users/:user_id/transactions
pub async fn create_transfer(
    State(state): State<AppState>,
    sender: CurrentUser,
    Path(recipient_id): Path<i64>,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    request.validate()?;
    expect_kind(&request.kind, TransactionType::Transfer)?;
    sender.require_verified()?;

    let entity = TransactionRepository::new(state.pool.clone())
        .create_transfer(
            sender.id(),
            recipient_id,
            request.amount,
            request.remark.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(domain::models::Transaction::from(entity).into())))
}
