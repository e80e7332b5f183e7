//! Promotion entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;

use domain::models::PromotionType;

#[derive(Debug, Clone, FromRow)]
pub struct PromotionEntity {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min_spending: Option<f64>,
    pub rate: Option<f64>,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

impl From<PromotionEntity> for domain::models::Promotion {
    fn from(entity: PromotionEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            description: entity.description,
            kind: PromotionType::from_str(&entity.kind).unwrap_or(PromotionType::OneTime),
            start_time: entity.start_time,
            end_time: entity.end_time,
            min_spending: entity.min_spending,
            rate: entity.rate,
            points: entity.points,
        }
    }
}
