//! Transaction entity (row of the transaction_details view).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;

use domain::models::TransactionType;

#[derive(Debug, Clone, FromRow)]
pub struct TransactionEntity {
    pub id: i64,
    pub user_id: i64,
    pub utorid: String,
    pub owner_name: String,
    pub kind: String,
    pub amount: i64,
    pub spent: Option<f64>,
    pub related_id: Option<i64>,
    pub suspicious: bool,
    pub processed: bool,
    pub remark: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub promotion_ids: Vec<i64>,
}

impl From<TransactionEntity> for domain::models::Transaction {
    fn from(entity: TransactionEntity) -> Self {
        Self {
            id: entity.id,
            utorid: entity.utorid,
            kind: TransactionType::from_str(&entity.kind).unwrap_or(TransactionType::Adjustment),
            amount: entity.amount,
            spent: entity.spent,
            related_id: entity.related_id,
            promotion_ids: entity.promotion_ids,
            suspicious: entity.suspicious,
            processed: entity.processed,
            remark: entity.remark,
            created_by: entity.created_by,
            created_at: entity.created_at,
        }
    }
}
