//! Transaction repository: the point ledger.
//!
//! Every write that moves points runs in one database transaction and locks
//! the affected user (and event) rows before checking balances, so the
//! checked value is the value written.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as DbTransaction};

use domain::models::promotion::Promotion;
use domain::models::TransactionType;
use domain::services::ledger::{self, EarnRate};
use domain::DomainError;

use crate::entities::{PromotionEntity, TransactionEntity, UserEntity};
use crate::error::RepositoryError;
use crate::metrics::{record_points_awarded, record_transaction_created, QueryTimer};

const DETAIL_COLUMNS: &str = "id, user_id, utorid, owner_name, kind, amount, spent, related_id, \
     suspicious, processed, remark, created_by, created_at, promotion_ids";

const TRANSACTION_FILTER: &str = r#"
    ($1::bigint IS NULL OR user_id = $1)
    AND ($2::text IS NULL OR utorid ILIKE '%' || $2 || '%' OR owner_name ILIKE '%' || $2 || '%')
    AND ($3::text IS NULL OR created_by = $3)
    AND ($4::bool IS NULL OR suspicious = $4)
    AND ($5::bigint IS NULL OR $5 = ANY(promotion_ids))
    AND ($6::text IS NULL OR kind = $6)
    AND ($7::bigint IS NULL OR related_id = $7)
    AND ($8::bigint IS NULL OR ($9 = 'gte' AND amount >= $8) OR ($9 = 'lte' AND amount <= $8))
"#;

/// Comparison applied to the `amount` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountOperator {
    Gte,
    Lte,
}

impl AmountOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountOperator::Gte => "gte",
            AmountOperator::Lte => "lte",
        }
    }
}

/// Filters for transaction listings.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Restrict to one owner (used by `/users/me/transactions`).
    pub user_id: Option<i64>,
    /// Substring of the owner's utorid or name.
    pub name: Option<String>,
    /// Utorid of the creator.
    pub created_by: Option<String>,
    pub suspicious: Option<bool>,
    pub promotion_id: Option<i64>,
    pub kind: Option<TransactionType>,
    pub related_id: Option<i64>,
    pub amount: Option<(AmountOperator, i64)>,
}

/// Staff member performing a ledger write.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: i64,
    pub suspicious: bool,
}

/// Inputs for a cashier purchase.
#[derive(Debug, Clone)]
pub struct NewPurchase<'a> {
    pub customer_utorid: &'a str,
    pub spent: f64,
    pub promotion_ids: &'a [i64],
    pub remark: &'a str,
}

/// Inputs for a manager adjustment.
#[derive(Debug, Clone)]
pub struct NewAdjustment<'a> {
    pub utorid: &'a str,
    pub amount: i64,
    pub related_id: i64,
    pub promotion_ids: &'a [i64],
    pub remark: &'a str,
}

#[derive(Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<TransactionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_transaction_by_id");
        let result = sqlx::query_as::<_, TransactionEntity>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM transaction_details WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn list(
        &self,
        filter: &TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_transactions");
        let (operator, amount) = split_amount(filter);
        let result = sqlx::query_as::<_, TransactionEntity>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM transaction_details WHERE {TRANSACTION_FILTER} \
             ORDER BY id DESC LIMIT $10 OFFSET $11"
        ))
        .bind(filter.user_id)
        .bind(filter.name.as_deref())
        .bind(filter.created_by.as_deref())
        .bind(filter.suspicious)
        .bind(filter.promotion_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.related_id)
        .bind(amount)
        .bind(operator)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn count(&self, filter: &TransactionFilter) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_transactions");
        let (operator, amount) = split_amount(filter);
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM transaction_details WHERE {TRANSACTION_FILTER}"
        ))
        .bind(filter.user_id)
        .bind(filter.name.as_deref())
        .bind(filter.created_by.as_deref())
        .bind(filter.suspicious)
        .bind(filter.promotion_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.related_id)
        .bind(amount)
        .bind(operator)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(|(count,)| count)
    }

    /// Record a purchase and credit the customer.
    ///
    /// A suspicious cashier's purchase is stored flagged and the balance is
    /// left untouched.
    pub async fn create_purchase(
        &self,
        cashier: Actor,
        purchase: NewPurchase<'_>,
        rate: EarnRate,
        now: DateTime<Utc>,
    ) -> Result<TransactionEntity, RepositoryError> {
        let timer = QueryTimer::new("create_purchase");
        let mut tx = self.pool.begin().await?;

        let customer = lock_user_by_utorid(&mut tx, purchase.customer_utorid).await?;

        let automatic: Vec<Promotion> = sqlx::query_as::<_, PromotionEntity>(
            r#"
            SELECT id, name, description, kind, start_time, end_time, min_spending, rate, points, created_at
            FROM promotions
            WHERE kind = 'automatic' AND start_time <= $1 AND end_time > $1
            "#,
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

        let (requested, used_ids) =
            load_requested_promotions(&mut tx, customer.id, purchase.promotion_ids).await?;

        let quote = ledger::quote_purchase(
            rate,
            purchase.spent,
            &automatic,
            purchase.promotion_ids,
            &requested,
            &used_ids,
            now,
        )?;
        let earned = quote.total()?;

        let id = insert_transaction(
            &mut tx,
            InsertRow {
                user_id: customer.id,
                kind: TransactionType::Purchase,
                amount: earned,
                spent: Some(purchase.spent),
                related_id: None,
                suspicious: cashier.suspicious,
                processed: false,
                remark: purchase.remark,
                created_by: cashier.id,
            },
        )
        .await?;

        link_promotions(&mut tx, id, &quote.promotion_ids).await?;
        for promotion_id in &quote.consumed_ids {
            sqlx::query("INSERT INTO user_promotions (user_id, promotion_id) VALUES ($1, $2)")
                .bind(customer.id)
                .bind(promotion_id)
                .execute(&mut *tx)
                .await?;
        }

        if !cashier.suspicious {
            set_points(&mut tx, customer.id, ledger::apply_delta(customer.points, earned)?).await?;
        }

        let entity = fetch_detail(&mut tx, id).await?;
        tx.commit().await?;
        timer.record();

        record_transaction_created(TransactionType::Purchase.as_str());
        if !cashier.suspicious {
            record_points_awarded(earned);
        }
        Ok(entity)
    }

    /// Record a signed correction against an earlier transaction of the
    /// same user.
    pub async fn create_adjustment(
        &self,
        manager_id: i64,
        adjustment: NewAdjustment<'_>,
    ) -> Result<TransactionEntity, RepositoryError> {
        let timer = QueryTimer::new("create_adjustment");
        let mut tx = self.pool.begin().await?;

        let user = lock_user_by_utorid(&mut tx, adjustment.utorid).await?;

        let related_owner: Option<(i64,)> =
            sqlx::query_as("SELECT user_id FROM transactions WHERE id = $1")
                .bind(adjustment.related_id)
                .fetch_optional(&mut *tx)
                .await?;
        match related_owner {
            None => return Err(RepositoryError::NotFound("Related transaction")),
            Some((owner,)) if owner != user.id => {
                return Err(DomainError::invalid(
                    "Related transaction does not belong to this user",
                )
                .into())
            }
            Some(_) => {}
        }

        let balance = ledger::apply_delta(user.points, adjustment.amount)?;

        let id = insert_transaction(
            &mut tx,
            InsertRow {
                user_id: user.id,
                kind: TransactionType::Adjustment,
                amount: adjustment.amount,
                spent: None,
                related_id: Some(adjustment.related_id),
                suspicious: false,
                processed: false,
                remark: adjustment.remark,
                created_by: manager_id,
            },
        )
        .await?;
        link_promotions(&mut tx, id, adjustment.promotion_ids).await?;
        set_points(&mut tx, user.id, balance).await?;

        let entity = fetch_detail(&mut tx, id).await?;
        tx.commit().await?;
        timer.record();

        record_transaction_created(TransactionType::Adjustment.as_str());
        record_points_awarded(adjustment.amount);
        Ok(entity)
    }

    /// Move points between two users.
    ///
    /// Writes one row per side and returns the sender's row.
    pub async fn create_transfer(
        &self,
        sender_id: i64,
        recipient_id: i64,
        amount: i64,
        remark: &str,
    ) -> Result<TransactionEntity, RepositoryError> {
        if sender_id == recipient_id {
            return Err(DomainError::invalid("Cannot transfer points to yourself").into());
        }

        let timer = QueryTimer::new("create_transfer");
        let mut tx = self.pool.begin().await?;

        // Lock in id order so two opposite transfers cannot deadlock.
        let (first, second) = if sender_id < recipient_id {
            (sender_id, recipient_id)
        } else {
            (recipient_id, sender_id)
        };
        let first = lock_user_by_id(&mut tx, first).await?;
        let second = lock_user_by_id(&mut tx, second).await?;
        let (sender, recipient) = if first.id == sender_id {
            (first, second)
        } else {
            (second, first)
        };

        if !sender.verified {
            return Err(DomainError::forbidden("Only verified users can transfer points").into());
        }
        let sender_balance = ledger::debit_balance(sender.points, amount)?;
        let recipient_balance = ledger::apply_delta(recipient.points, amount)?;

        let sent_id = insert_transaction(
            &mut tx,
            InsertRow {
                user_id: sender.id,
                kind: TransactionType::Transfer,
                amount: -amount,
                spent: None,
                related_id: Some(recipient.id),
                suspicious: false,
                processed: false,
                remark,
                created_by: sender.id,
            },
        )
        .await?;
        insert_transaction(
            &mut tx,
            InsertRow {
                user_id: recipient.id,
                kind: TransactionType::Transfer,
                amount,
                spent: None,
                related_id: Some(sender.id),
                suspicious: false,
                processed: false,
                remark,
                created_by: sender.id,
            },
        )
        .await?;

        set_points(&mut tx, sender.id, sender_balance).await?;
        set_points(&mut tx, recipient.id, recipient_balance).await?;

        let entity = fetch_detail(&mut tx, sent_id).await?;
        tx.commit().await?;
        timer.record();

        record_transaction_created(TransactionType::Transfer.as_str());
        Ok(entity)
    }

    /// File a redemption request. Points are deducted when a cashier
    /// processes it.
    pub async fn create_redemption(
        &self,
        user_id: i64,
        amount: i64,
        remark: &str,
    ) -> Result<TransactionEntity, RepositoryError> {
        let timer = QueryTimer::new("create_redemption");
        let mut tx = self.pool.begin().await?;

        let user = lock_user_by_id(&mut tx, user_id).await?;
        if !user.verified {
            return Err(DomainError::forbidden("Only verified users can redeem points").into());
        }
        ledger::debit_balance(user.points, amount)?;

        let id = insert_transaction(
            &mut tx,
            InsertRow {
                user_id: user.id,
                kind: TransactionType::Redemption,
                amount: -amount,
                spent: None,
                related_id: None,
                suspicious: false,
                processed: false,
                remark,
                created_by: user.id,
            },
        )
        .await?;

        let entity = fetch_detail(&mut tx, id).await?;
        tx.commit().await?;
        timer.record();

        record_transaction_created(TransactionType::Redemption.as_str());
        Ok(entity)
    }

    /// Mark a redemption processed and deduct its points.
    pub async fn process_redemption(&self, id: i64, cashier_id: i64) -> Result<TransactionEntity, RepositoryError> {
        let timer = QueryTimer::new("process_redemption");
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64, String, i64, bool)> = sqlx::query_as(
            "SELECT user_id, kind, amount, processed FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let (user_id, kind, amount, processed) = row.ok_or(RepositoryError::NotFound("Transaction"))?;

        if kind != TransactionType::Redemption.as_str() {
            return Err(DomainError::invalid("Transaction is not a redemption").into());
        }
        if processed {
            return Err(DomainError::invalid("Redemption has already been processed").into());
        }

        let user = lock_user_by_id(&mut tx, user_id).await?;
        // Redemptions store the negated amount.
        let balance = ledger::debit_balance(user.points, -amount)?;

        sqlx::query("UPDATE transactions SET processed = TRUE, related_id = $2 WHERE id = $1")
            .bind(id)
            .bind(cashier_id)
            .execute(&mut *tx)
            .await?;
        set_points(&mut tx, user.id, balance).await?;

        let entity = fetch_detail(&mut tx, id).await?;
        tx.commit().await?;
        timer.record();
        Ok(entity)
    }

    /// Flip a transaction's suspicious flag and move the owner's balance
    /// accordingly.
    pub async fn set_suspicious(&self, id: i64, suspicious: bool) -> Result<TransactionEntity, RepositoryError> {
        let timer = QueryTimer::new("set_transaction_suspicious");
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64, String, i64, bool)> = sqlx::query_as(
            "SELECT user_id, kind, amount, suspicious FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let (user_id, kind, amount, was_suspicious) =
            row.ok_or(RepositoryError::NotFound("Transaction"))?;

        if kind == TransactionType::Redemption.as_str() {
            return Err(DomainError::invalid("Redemptions cannot be flagged suspicious").into());
        }

        let delta = ledger::suspicious_delta(amount, was_suspicious, suspicious);
        if delta != 0 {
            let user = lock_user_by_id(&mut tx, user_id).await?;
            let balance = ledger::apply_delta(user.points, delta)?;
            set_points(&mut tx, user.id, balance).await?;
        }

        sqlx::query("UPDATE transactions SET suspicious = $2 WHERE id = $1")
            .bind(id)
            .bind(suspicious)
            .execute(&mut *tx)
            .await?;

        let entity = fetch_detail(&mut tx, id).await?;
        tx.commit().await?;
        timer.record();
        Ok(entity)
    }

    /// Award event points to one guest, or to every attended guest when
    /// `utorid` is `None`. Recipients are marked attended.
    pub async fn award_event_points(
        &self,
        event_id: i64,
        actor_id: i64,
        utorid: Option<&str>,
        amount: i64,
        remark: &str,
    ) -> Result<Vec<TransactionEntity>, RepositoryError> {
        let timer = QueryTimer::new("award_event_points");
        let mut tx = self.pool.begin().await?;

        let pool_row: Option<(i64,)> =
            sqlx::query_as("SELECT points_remain FROM events WHERE id = $1 FOR UPDATE")
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (remain,) = pool_row.ok_or(RepositoryError::NotFound("Event"))?;

        let recipients: Vec<i64> = match utorid {
            Some(utorid) => {
                let guest: Option<(i64,)> = sqlx::query_as(
                    r#"
                    SELECT u.id
                    FROM event_guests g
                    JOIN users u ON u.id = g.user_id
                    WHERE g.event_id = $1 AND u.utorid = $2
                    "#,
                )
                .bind(event_id)
                .bind(utorid)
                .fetch_optional(&mut *tx)
                .await?;
                match guest {
                    Some((id,)) => vec![id],
                    None => {
                        return Err(DomainError::invalid("User is not a guest of this event").into())
                    }
                }
            }
            None => sqlx::query_as::<_, (i64,)>(
                "SELECT user_id FROM event_guests WHERE event_id = $1 AND attended = TRUE ORDER BY user_id",
            )
            .bind(event_id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|(id,)| id)
            .collect(),
        };

        let remain = ledger::debit_event_pool(remain, amount, recipients.len())?;
        sqlx::query("UPDATE events SET points_remain = $2 WHERE id = $1")
            .bind(event_id)
            .bind(remain)
            .execute(&mut *tx)
            .await?;

        let mut entities = Vec::with_capacity(recipients.len());
        for user_id in &recipients {
            let user = lock_user_by_id(&mut tx, *user_id).await?;
            let id = insert_transaction(
                &mut tx,
                InsertRow {
                    user_id: user.id,
                    kind: TransactionType::Event,
                    amount,
                    spent: None,
                    related_id: Some(event_id),
                    suspicious: false,
                    processed: false,
                    remark,
                    created_by: actor_id,
                },
            )
            .await?;
            set_points(&mut tx, user.id, ledger::apply_delta(user.points, amount)?).await?;
            sqlx::query("UPDATE event_guests SET attended = TRUE WHERE event_id = $1 AND user_id = $2")
                .bind(event_id)
                .bind(user.id)
                .execute(&mut *tx)
                .await?;
            entities.push(fetch_detail(&mut tx, id).await?);
        }

        tx.commit().await?;
        timer.record();

        for _ in &entities {
            record_transaction_created(TransactionType::Event.as_str());
        }
        record_points_awarded(amount * entities.len() as i64);
        Ok(entities)
    }
}

fn split_amount(filter: &TransactionFilter) -> (Option<&'static str>, Option<i64>) {
    match filter.amount {
        Some((operator, amount)) => (Some(operator.as_str()), Some(amount)),
        None => (None, None),
    }
}

struct InsertRow<'a> {
    user_id: i64,
    kind: TransactionType,
    amount: i64,
    spent: Option<f64>,
    related_id: Option<i64>,
    suspicious: bool,
    processed: bool,
    remark: &'a str,
    created_by: i64,
}

async fn insert_transaction(
    tx: &mut DbTransaction<'_, Postgres>,
    row: InsertRow<'_>,
) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO transactions (user_id, kind, amount, spent, related_id, suspicious, processed, remark, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(row.user_id)
    .bind(row.kind.as_str())
    .bind(row.amount)
    .bind(row.spent)
    .bind(row.related_id)
    .bind(row.suspicious)
    .bind(row.processed)
    .bind(row.remark)
    .bind(row.created_by)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

async fn link_promotions(
    tx: &mut DbTransaction<'_, Postgres>,
    transaction_id: i64,
    promotion_ids: &[i64],
) -> Result<(), sqlx::Error> {
    for promotion_id in promotion_ids {
        sqlx::query(
            "INSERT INTO transaction_promotions (transaction_id, promotion_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(transaction_id)
        .bind(promotion_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn load_requested_promotions(
    tx: &mut DbTransaction<'_, Postgres>,
    user_id: i64,
    promotion_ids: &[i64],
) -> Result<(Vec<Promotion>, Vec<i64>), sqlx::Error> {
    if promotion_ids.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let requested = sqlx::query_as::<_, PromotionEntity>(
        r#"
        SELECT id, name, description, kind, start_time, end_time, min_spending, rate, points, created_at
        FROM promotions
        WHERE id = ANY($1)
        "#,
    )
    .bind(promotion_ids)
    .fetch_all(&mut **tx)
    .await?
    .into_iter()
    .map(Into::into)
    .collect();

    let used = sqlx::query_as::<_, (i64,)>(
        "SELECT promotion_id FROM user_promotions WHERE user_id = $1 AND promotion_id = ANY($2)",
    )
    .bind(user_id)
    .bind(promotion_ids)
    .fetch_all(&mut **tx)
    .await?
    .into_iter()
    .map(|(id,)| id)
    .collect();

    Ok((requested, used))
}

async fn lock_user_by_utorid(
    tx: &mut DbTransaction<'_, Postgres>,
    utorid: &str,
) -> Result<UserEntity, RepositoryError> {
    sqlx::query_as::<_, UserEntity>(
        r#"
        SELECT id, utorid, name, email, role, points, suspicious, verified, birthday,
               password_hash, created_at, last_login
        FROM users
        WHERE utorid = $1
        FOR UPDATE
        "#,
    )
    .bind(utorid)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(RepositoryError::NotFound("User"))
}

async fn lock_user_by_id(
    tx: &mut DbTransaction<'_, Postgres>,
    id: i64,
) -> Result<UserEntity, RepositoryError> {
    sqlx::query_as::<_, UserEntity>(
        r#"
        SELECT id, utorid, name, email, role, points, suspicious, verified, birthday,
               password_hash, created_at, last_login
        FROM users
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(RepositoryError::NotFound("User"))
}

async fn set_points(
    tx: &mut DbTransaction<'_, Postgres>,
    user_id: i64,
    points: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET points = $2 WHERE id = $1")
        .bind(user_id)
        .bind(points)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn fetch_detail(
    tx: &mut DbTransaction<'_, Postgres>,
    id: i64,
) -> Result<TransactionEntity, sqlx::Error> {
    sqlx::query_as::<_, TransactionEntity>(&format!(
        "SELECT {DETAIL_COLUMNS} FROM transaction_details WHERE id = $1"
    ))
    .bind(id)
    .fetch_one(&mut **tx)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_amount() {
        let mut filter = TransactionFilter::default();
        assert_eq!(split_amount(&filter), (None, None));
        filter.amount = Some((AmountOperator::Gte, 100));
        assert_eq!(split_amount(&filter), (Some("gte"), Some(100)));
    }

    #[test]
    fn test_amount_operator_str() {
        assert_eq!(AmountOperator::Lte.as_str(), "lte");
    }
}
