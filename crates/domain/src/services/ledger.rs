//! Point-ledger arithmetic.
//!
//! Pure functions over balances and event pools. Repositories call these
//! while holding row locks so that the checked value is the value written.

use chrono::{DateTime, Utc};
use shared::validation::MAX_SPENT;

use crate::error::DomainError;
use crate::models::promotion::{Promotion, PromotionType};

/// Points earned per currency unit, as a ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarnRate {
    numerator: i64,
    denominator: i64,
}

impl Default for EarnRate {
    /// 100 points for every 25 currency units.
    fn default() -> Self {
        Self {
            numerator: 100,
            denominator: 25,
        }
    }
}

impl EarnRate {
    pub fn new(numerator: i64, denominator: i64) -> Result<Self, DomainError> {
        if numerator < 0 || denominator <= 0 {
            return Err(DomainError::invalid("Invalid earn rate"));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// `round(spent * numerator / denominator)`, half away from zero.
    pub fn points_for(&self, spent: f64) -> i64 {
        (spent * self.numerator as f64 / self.denominator as f64).round() as i64
    }
}

/// Points a purchase will award, split into base and promotion bonus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseQuote {
    pub base: i64,
    pub bonus: i64,
    /// Promotions applied, sorted by id.
    pub promotion_ids: Vec<i64>,
    /// One-time promotions consumed by this purchase.
    pub consumed_ids: Vec<i64>,
}

impl PurchaseQuote {
    pub fn total(&self) -> Result<i64, DomainError> {
        self.base
            .checked_add(self.bonus)
            .ok_or_else(|| DomainError::invalid("amount is too large"))
    }
}

/// Prices a purchase.
///
/// `automatic` holds the automatic promotions the store knows about and
/// `requested` the promotions the cashier named by id. Every active,
/// qualifying automatic promotion applies. Each requested id must resolve to
/// an active promotion the customer can use, else the purchase is rejected.
pub fn quote_purchase(
    rate: EarnRate,
    spent: f64,
    automatic: &[Promotion],
    requested_ids: &[i64],
    requested: &[Promotion],
    used_ids: &[i64],
    now: DateTime<Utc>,
) -> Result<PurchaseQuote, DomainError> {
    if !spent.is_finite() || !(0.0..=MAX_SPENT).contains(&spent) {
        return Err(DomainError::invalid(format!(
            "Spent must be between 0 and {}",
            MAX_SPENT
        )));
    }

    let mut applied: Vec<&Promotion> = automatic
        .iter()
        .filter(|p| {
            p.kind == PromotionType::Automatic && p.window().is_active(now) && p.qualifies(spent)
        })
        .collect();
    let mut consumed_ids = Vec::new();

    for id in requested_ids {
        let promotion = requested
            .iter()
            .find(|p| p.id == *id)
            .ok_or_else(|| DomainError::invalid(format!("Promotion {} does not exist", id)))?;

        if !promotion.window().is_active(now) {
            return Err(DomainError::invalid(format!(
                "Promotion {} is not active",
                id
            )));
        }
        if !promotion.qualifies(spent) {
            return Err(DomainError::invalid(format!(
                "Purchase does not meet the minimum spending of promotion {}",
                id
            )));
        }
        if promotion.kind == PromotionType::OneTime {
            if used_ids.contains(id) {
                return Err(DomainError::invalid(format!(
                    "Promotion {} has already been used",
                    id
                )));
            }
            consumed_ids.push(*id);
        }
        if !applied.iter().any(|p| p.id == *id) {
            applied.push(promotion);
        }
    }

    applied.sort_by_key(|p| p.id);
    consumed_ids.sort_unstable();

    let bonus = applied
        .iter()
        .try_fold(0i64, |sum, p| sum.checked_add(p.bonus_for(spent)))
        .ok_or_else(|| DomainError::invalid("amount is too large"))?;

    Ok(PurchaseQuote {
        base: rate.points_for(spent),
        bonus,
        promotion_ids: applied.iter().map(|p| p.id).collect(),
        consumed_ids,
    })
}

/// New `points_remain` after changing an event's total.
///
/// Rejects a total below the points already awarded.
pub fn adjust_event_pool(total_old: i64, remain_old: i64, total_new: i64) -> Result<i64, DomainError> {
    let awarded = total_old - remain_old;
    if total_new < awarded {
        return Err(DomainError::invalid(format!(
            "Total points cannot be less than the {} points already awarded",
            awarded
        )));
    }
    Ok(remain_old + (total_new - total_old))
}

/// Remaining pool after awarding `amount` to each of `recipients` guests.
pub fn debit_event_pool(remain: i64, amount: i64, recipients: usize) -> Result<i64, DomainError> {
    if amount <= 0 {
        return Err(DomainError::invalid("amount must be a positive integer"));
    }
    if recipients == 0 {
        return Err(DomainError::invalid("No guests to award points to"));
    }
    let needed = amount
        .checked_mul(recipients as i64)
        .ok_or_else(|| DomainError::invalid("amount is too large"))?;
    if needed > remain {
        return Err(DomainError::invalid(format!(
            "Event has only {} points remaining",
            remain
        )));
    }
    Ok(remain - needed)
}

/// Balance after spending `amount` (transfer or redemption).
pub fn debit_balance(balance: i64, amount: i64) -> Result<i64, DomainError> {
    if amount <= 0 {
        return Err(DomainError::invalid("amount must be a positive integer"));
    }
    if amount > balance {
        return Err(DomainError::invalid("Insufficient points"));
    }
    Ok(balance - amount)
}

/// Balance after applying a signed delta; the result may not go negative.
pub fn apply_delta(balance: i64, delta: i64) -> Result<i64, DomainError> {
    let next = balance
        .checked_add(delta)
        .ok_or_else(|| DomainError::invalid("amount is too large"))?;
    if next < 0 {
        return Err(DomainError::invalid("Insufficient points"));
    }
    Ok(next)
}

/// Balance delta for flipping a transaction's suspicious flag.
///
/// Marking suspicious takes the points back; clearing the flag grants them.
pub fn suspicious_delta(amount: i64, was_suspicious: bool, now_suspicious: bool) -> i64 {
    match (was_suspicious, now_suspicious) {
        (false, true) => -amount,
        (true, false) => amount,
        _ => 0,
    }
}
