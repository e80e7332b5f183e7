//! Staff transaction routes: purchases, adjustments, review and processing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use domain::models::transaction::{
    CreateTransactionRequest, ProcessedRequest, SuspiciousRequest, TransactionResponse,
};
use domain::models::{Role, Transaction, TransactionCommand};
use persistence::repositories::{
    Actor, NewAdjustment, NewPurchase, TransactionFilter, TransactionRepository,
};
use shared::pagination::Paginated;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::routes::{amount_filter, page, parse_optional};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTransactionsQuery {
    pub name: Option<String>,
    pub created_by: Option<String>,
    pub suspicious: Option<bool>,
    pub promotion_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub related_id: Option<i64>,
    pub amount: Option<i64>,
    pub operator: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListTransactionsQuery {
    fn filter(&self) -> Result<TransactionFilter, ApiError> {
        let kind = parse_optional(self.kind.as_deref(), "type")?;
        if self.related_id.is_some() && kind.is_none() {
            return Err(ApiError::Validation(
                "relatedId must be used together with type".to_string(),
            ));
        }
        Ok(TransactionFilter {
            user_id: None,
            name: self.name.clone(),
            created_by: self.created_by.clone(),
            suspicious: self.suspicious,
            promotion_id: self.promotion_id,
            kind,
            related_id: self.related_id,
            amount: amount_filter(self.amount, self.operator.as_deref())?,
        })
    }
}

/// POST /transactions
///
/// Cashiers record purchases; managers may also record adjustments.
pub async fn create_transaction(
    State(state): State<AppState>,
    actor: CurrentUser,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    actor.require(Role::Cashier)?;
    request.validate()?;

    let repo = TransactionRepository::new(state.pool.clone());
    let entity = match request.into_command()? {
        TransactionCommand::Purchase {
            utorid,
            spent,
            promotion_ids,
            remark,
        } => {
            let cashier = Actor {
                id: actor.id(),
                suspicious: actor.0.suspicious,
            };
            repo.create_purchase(
                cashier,
                NewPurchase {
                    customer_utorid: &utorid,
                    spent,
                    promotion_ids: &promotion_ids,
                    remark: &remark,
                },
                state.config.ledger.earn_rate()?,
                Utc::now(),
            )
            .await?
        }
        TransactionCommand::Adjustment {
            utorid,
            amount,
            related_id,
            promotion_ids,
            remark,
        } => {
            actor.require(Role::Manager)?;
            repo.create_adjustment(
                actor.id(),
                NewAdjustment {
                    utorid: &utorid,
                    amount,
                    related_id,
                    promotion_ids: &promotion_ids,
                    remark: &remark,
                },
            )
            .await?
        }
    };

    let transaction = Transaction::from(entity);
    tracing::info!(
        transaction_id = transaction.id,
        kind = %transaction.kind,
        amount = transaction.amount,
        created_by = actor.id(),
        "Transaction created"
    );
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// GET /transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    actor: CurrentUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Paginated<TransactionResponse>>, ApiError> {
    actor.require(Role::Manager)?;
    let page = page(query.page, query.limit)?;
    let filter = query.filter()?;

    let repo = TransactionRepository::new(state.pool.clone());
    let count = repo.count(&filter).await?;
    let results = repo
        .list(&filter, page.limit, page.offset())
        .await?
        .into_iter()
        .map(|e| TransactionResponse::from(Transaction::from(e)))
        .collect();

    Ok(Json(Paginated::new(count, results)))
}

/// GET /transactions/:id
pub async fn get_transaction(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<TransactionResponse>, ApiError> {
    actor.require(Role::Manager)?;
    let entity = TransactionRepository::new(state.pool.clone())
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transaction not found".to_string()))?;
    Ok(Json(Transaction::from(entity).into()))
}

/// PATCH /transactions/:id/suspicious
pub async fn set_suspicious(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<SuspiciousRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    actor.require(Role::Manager)?;
    let entity = TransactionRepository::new(state.pool.clone())
        .set_suspicious(id, request.suspicious)
        .await?;

    tracing::info!(
        transaction_id = id,
        suspicious = request.suspicious,
        updated_by = actor.id(),
        "Transaction suspicious flag changed"
    );
    Ok(Json(Transaction::from(entity).into()))
}

/// PATCH /transactions/:id/processed
pub async fn set_processed(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<ProcessedRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    actor.require(Role::Cashier)?;
    if !request.processed {
        return Err(ApiError::Validation("processed can only be true".to_string()));
    }

    let entity = TransactionRepository::new(state.pool.clone())
        .process_redemption(id, actor.id())
        .await?;

    tracing::info!(transaction_id = id, processed_by = actor.id(), "Redemption processed");
    Ok(Json(Transaction::from(entity).into()))
}
