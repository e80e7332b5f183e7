//! Promotion repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use domain::models::promotion::{CreatePromotionRequest, UpdatePromotionRequest};
use domain::models::PromotionType;

use crate::entities::PromotionEntity;
use crate::metrics::QueryTimer;

const PROMOTION_COLUMNS: &str =
    "id, name, description, kind, start_time, end_time, min_spending, rate, points, created_at";

const PROMOTION_FILTER: &str = r#"
    ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
    AND ($2::text IS NULL OR kind = $2)
    AND ($3::bool IS NULL OR (start_time <= $7) = $3)
    AND ($4::bool IS NULL OR (end_time <= $7) = $4)
    AND (NOT $5 OR (start_time <= $7 AND end_time > $7))
    AND ($6::bigint IS NULL OR kind <> 'onetime' OR NOT EXISTS (
        SELECT 1 FROM user_promotions up
        WHERE up.promotion_id = promotions.id AND up.user_id = $6
    ))
"#;

/// Filters for the promotion listing.
#[derive(Debug, Clone, Default)]
pub struct PromotionFilter {
    pub name: Option<String>,
    pub kind: Option<PromotionType>,
    pub started: Option<bool>,
    pub ended: Option<bool>,
    /// Restrict to promotions whose window contains `now`.
    pub active_only: bool,
    /// Hide one-time promotions this user already consumed.
    pub unused_by: Option<i64>,
}

#[derive(Clone)]
pub struct PromotionRepository {
    pool: PgPool,
}

impl PromotionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, req: &CreatePromotionRequest) -> Result<PromotionEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_promotion");
        let result = sqlx::query_as::<_, PromotionEntity>(&format!(
            r#"
            INSERT INTO promotions (name, description, kind, start_time, end_time, min_spending, rate, points)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PROMOTION_COLUMNS}
            "#
        ))
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.kind.as_str())
        .bind(req.start_time)
        .bind(req.end_time)
        .bind(req.min_spending)
        .bind(req.rate)
        .bind(req.points.unwrap_or(0))
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<PromotionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_promotion_by_id");
        let result = sqlx::query_as::<_, PromotionEntity>(&format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// One page of promotions matching `filter`, ordered by start time then id.
    pub async fn list(
        &self,
        filter: &PromotionFilter,
        now: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PromotionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_promotions");
        let result = sqlx::query_as::<_, PromotionEntity>(&format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions WHERE {PROMOTION_FILTER} \
             ORDER BY start_time, id LIMIT $8 OFFSET $9"
        ))
        .bind(filter.name.as_deref())
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.started)
        .bind(filter.ended)
        .bind(filter.active_only)
        .bind(filter.unused_by)
        .bind(now)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn count(&self, filter: &PromotionFilter, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_promotions");
        let result: Result<(i64,), sqlx::Error> =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM promotions WHERE {PROMOTION_FILTER}"))
                .bind(filter.name.as_deref())
                .bind(filter.kind.map(|k| k.as_str()))
                .bind(filter.started)
                .bind(filter.ended)
                .bind(filter.active_only)
                .bind(filter.unused_by)
                .bind(now)
                .fetch_one(&self.pool)
                .await;
        timer.record();
        result.map(|(count,)| count)
    }

    /// Apply already-checked changes.
    pub async fn update(&self, id: i64, changes: &UpdatePromotionRequest) -> Result<PromotionEntity, sqlx::Error> {
        let timer = QueryTimer::new("update_promotion");
        let result = sqlx::query_as::<_, PromotionEntity>(&format!(
            r#"
            UPDATE promotions
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                kind = COALESCE($4, kind),
                start_time = COALESCE($5, start_time),
                end_time = COALESCE($6, end_time),
                min_spending = COALESCE($7, min_spending),
                rate = COALESCE($8, rate),
                points = COALESCE($9, points)
            WHERE id = $1
            RETURNING {PROMOTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.kind.map(|k| k.as_str()))
        .bind(changes.start_time)
        .bind(changes.end_time)
        .bind(changes.min_spending)
        .bind(changes.rate)
        .bind(changes.points)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Delete a promotion that has not started yet.
    ///
    /// Returns `false` when nothing was deleted.
    pub async fn delete_unstarted(&self, id: i64, now: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_promotion");
        let result = sqlx::query("DELETE FROM promotions WHERE id = $1 AND start_time > $2")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }
}
