//! Page/limit pagination utilities.
//!
//! List endpoints take `page` (1-based) and `limit` query parameters and
//! answer with `{ "count": total, "results": [...] }`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Error type for pagination parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page must be a positive integer")]
    InvalidPage,
    #[error("limit must be between 1 and 100")]
    InvalidLimit,
}

/// Raw pagination query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    /// Validates raw parameters, applying defaults for missing values.
    pub fn from_params(params: PageParams) -> Result<Self, PageError> {
        let page = params.page.unwrap_or(DEFAULT_PAGE);
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

        if page < 1 {
            return Err(PageError::InvalidPage);
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(PageError::InvalidLimit);
        }

        Ok(Self { page, limit })
    }

    /// Row offset for SQL `OFFSET`.
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Paginated list response.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(count: i64, results: Vec<T>) -> Self {
        Self { count, results }
    }

    /// Converts every result into another type.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            count: self.count,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
