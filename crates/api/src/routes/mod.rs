//! HTTP route handlers.

pub mod auth;
pub mod events;
pub mod health;
pub mod promotions;
pub mod transactions;
pub mod users;

use std::str::FromStr;

use persistence::repositories::AmountOperator;
use shared::pagination::{Page, PageParams};

use crate::error::ApiError;

/// Validates `page`/`limit` query values.
pub(crate) fn page(page: Option<i64>, limit: Option<i64>) -> Result<Page, ApiError> {
    Ok(Page::from_params(PageParams { page, limit })?)
}

/// Parses an optional enum-like query value, naming the field on failure.
pub(crate) fn parse_optional<T: FromStr>(
    value: Option<&str>,
    field: &str,
) -> Result<Option<T>, ApiError> {
    value
        .map(|v| {
            T::from_str(v).map_err(|_| ApiError::Validation(format!("Invalid {}: {}", field, v)))
        })
        .transpose()
}

/// Combines the `amount` and `operator` query values.
///
/// Both must be given together.
pub(crate) fn amount_filter(
    amount: Option<i64>,
    operator: Option<&str>,
) -> Result<Option<(AmountOperator, i64)>, ApiError> {
    match (amount, operator) {
        (None, None) => Ok(None),
        (Some(amount), Some("gte")) => Ok(Some((AmountOperator::Gte, amount))),
        (Some(amount), Some("lte")) => Ok(Some((AmountOperator::Lte, amount))),
        (Some(_), Some(op)) => Err(ApiError::Validation(format!(
            "operator must be \"gte\" or \"lte\", got \"{}\"",
            op
        ))),
        _ => Err(ApiError::Validation(
            "amount and operator must be given together".to_string(),
        )),
    }
}

/// `started` and `ended` filters are mutually exclusive.
pub(crate) fn check_time_filters(started: Option<bool>, ended: Option<bool>) -> Result<(), ApiError> {
    if started.is_some() && ended.is_some() {
        Err(ApiError::Validation(
            "started and ended cannot be used together".to_string(),
        ))
    } else {
        Ok(())
    }
}
