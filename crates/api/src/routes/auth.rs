//! Login, logout and password reset routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use validator::Validate;

use domain::models::auth::{
    CompleteResetRequest, LoginRequest, LoginResponse, ResetRequest, ResetResponse,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /auth/tokens
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    request.validate()?;
    let response = state
        .auth_service()
        .login(&request.utorid, &request.password)
        .await?;
    Ok(Json(response))
}

/// DELETE /auth/tokens
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<StatusCode, ApiError> {
    state.auth_service().logout(user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/resets
///
/// Issues a reset token and emails it. The token is also returned so that
/// deployments without email can complete the flow.
pub async fn request_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> Result<(StatusCode, Json<ResetResponse>), ApiError> {
    request.validate()?;
    let issued = state.auth_service().request_reset(&request.utorid).await?;

    if let Err(e) = state
        .email
        .send_password_reset_email(
            &issued.user.email,
            &issued.user.name,
            &issued.token,
            issued.expires_at,
        )
        .await
    {
        tracing::error!(user_id = issued.user.id, error = %e, "Failed to send password reset email");
    }

    Ok((StatusCode::ACCEPTED, Json(issued.into())))
}

/// POST /auth/resets/:reset_token
pub async fn complete_reset(
    State(state): State<AppState>,
    Path(reset_token): Path<String>,
    Json(request): Json<CompleteResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    request.validate()?;
    state
        .auth_service()
        .reset_password(&reset_token, &request.utorid, &request.password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password has been reset",
    }))
}
