//! Promotion routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use domain::models::promotion::{
    check_promotion_delete, plan_promotion_update, CreatePromotionRequest, PromotionResponse,
    UpdatePromotionRequest,
};
use domain::models::{Promotion, Role};
use persistence::repositories::{PromotionFilter, PromotionRepository};
use shared::pagination::Paginated;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::routes::{check_time_filters, page, parse_optional};

#[derive(Debug, Deserialize)]
pub struct ListPromotionsQuery {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub started: Option<bool>,
    pub ended: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListPromotionsQuery {
    /// Managers see every promotion and may filter by window; everyone else
    /// sees active promotions they can still use.
    fn filter(self, actor_id: i64, role: Role) -> Result<PromotionFilter, ApiError> {
        let kind = parse_optional(self.kind.as_deref(), "type")?;
        if role.has_at_least(Role::Manager) {
            check_time_filters(self.started, self.ended)?;
            Ok(PromotionFilter {
                name: self.name,
                kind,
                started: self.started,
                ended: self.ended,
                active_only: false,
                unused_by: None,
            })
        } else {
            Ok(PromotionFilter {
                name: self.name,
                kind,
                active_only: true,
                unused_by: Some(actor_id),
                ..Default::default()
            })
        }
    }
}

async fn load_promotion(repo: &PromotionRepository, id: i64) -> Result<Promotion, ApiError> {
    repo.find_by_id(id)
        .await?
        .map(Promotion::from)
        .ok_or_else(|| ApiError::NotFound("Promotion not found".to_string()))
}

/// Whether a non-manager may see the promotion at `now`.
fn visible_to_members(promotion: &Promotion, now: DateTime<Utc>) -> bool {
    promotion.window().is_active(now)
}

/// POST /promotions
pub async fn create_promotion(
    State(state): State<AppState>,
    actor: CurrentUser,
    Json(request): Json<CreatePromotionRequest>,
) -> Result<(StatusCode, Json<PromotionResponse>), ApiError> {
    actor.require(Role::Manager)?;
    request.validate()?;
    request.check_window(Utc::now())?;

    let promotion = Promotion::from(
        PromotionRepository::new(state.pool.clone())
            .create(&request)
            .await?,
    );

    tracing::info!(
        promotion_id = promotion.id,
        kind = promotion.kind.as_str(),
        created_by = actor.id(),
        "Promotion created"
    );
    Ok((StatusCode::CREATED, Json(promotion.into())))
}

/// GET /promotions
pub async fn list_promotions(
    State(state): State<AppState>,
    actor: CurrentUser,
    Query(query): Query<ListPromotionsQuery>,
) -> Result<Json<Paginated<PromotionResponse>>, ApiError> {
    let page = page(query.page, query.limit)?;
    let filter = query.filter(actor.id(), actor.role())?;
    let now = Utc::now();

    let repo = PromotionRepository::new(state.pool.clone());
    let count = repo.count(&filter, now).await?;
    let results = repo
        .list(&filter, now, page.limit, page.offset())
        .await?
        .into_iter()
        .map(|e| PromotionResponse::from(Promotion::from(e)))
        .collect();

    Ok(Json(Paginated::new(count, results)))
}

/// GET /promotions/:id
pub async fn get_promotion(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<PromotionResponse>, ApiError> {
    let promotion = load_promotion(&PromotionRepository::new(state.pool.clone()), id).await?;

    if !actor.role().has_at_least(Role::Manager) && !visible_to_members(&promotion, Utc::now()) {
        return Err(ApiError::NotFound("Promotion not found".to_string()));
    }
    Ok(Json(promotion.into()))
}

/// PATCH /promotions/:id
pub async fn update_promotion(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePromotionRequest>,
) -> Result<Json<PromotionResponse>, ApiError> {
    actor.require(Role::Manager)?;
    request.validate()?;

    let repo = PromotionRepository::new(state.pool.clone());
    let current = load_promotion(&repo, id).await?;
    let changes = plan_promotion_update(&current, request, Utc::now())?;

    if changes.is_empty() {
        return Ok(Json(current.into()));
    }

    let updated = Promotion::from(repo.update(id, &changes).await?);
    tracing::info!(promotion_id = id, updated_by = actor.id(), "Promotion updated");
    Ok(Json(updated.into()))
}

/// DELETE /promotions/:id
pub async fn delete_promotion(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    actor.require(Role::Manager)?;

    let repo = PromotionRepository::new(state.pool.clone());
    let current = load_promotion(&repo, id).await?;
    let now = Utc::now();
    check_promotion_delete(&current, now)?;

    // The promotion may have started between the check and the delete.
    if !repo.delete_unstarted(id, now).await? {
        return Err(ApiError::Forbidden(
            "Cannot delete a promotion that has already started".to_string(),
        ));
    }

    tracing::info!(promotion_id = id, deleted_by = actor.id(), "Promotion deleted");
    Ok(StatusCode::NO_CONTENT)
}
