//! Promotion domain model, active window and edit rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use validator::Validate;

use crate::error::DomainError;

/// How a promotion is applied to purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionType {
    /// Applied once per user when the cashier names it.
    #[serde(rename = "onetime")]
    OneTime,
    /// Applied to every qualifying purchase inside the window.
    Automatic,
}

impl PromotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionType::OneTime => "onetime",
            PromotionType::Automatic => "automatic",
        }
    }
}

impl FromStr for PromotionType {
    type Err = String;

    /// Accepts both `onetime` and the `one-time` spelling used by clients.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onetime" | "one-time" => Ok(PromotionType::OneTime),
            "automatic" => Ok(PromotionType::Automatic),
            _ => Err(format!("Unknown promotion type: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for PromotionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PromotionType::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// Half-open `[start, end)` interval during which a promotion is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PromotionWindow {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.has_started(now) && !self.has_ended(now)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub kind: PromotionType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min_spending: Option<f64>,
    pub rate: Option<f64>,
    pub points: i64,
}

impl Promotion {
    pub fn window(&self) -> PromotionWindow {
        PromotionWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Whether a purchase of `spent` meets the minimum spending.
    pub fn qualifies(&self, spent: f64) -> bool {
        self.min_spending.map_or(true, |min| spent >= min)
    }

    /// Bonus points this promotion adds to a purchase of `spent`.
    ///
    /// `rate` is extra points per cent spent; `points` is a flat bonus.
    pub fn bonus_for(&self, spent: f64) -> i64 {
        let rate_bonus = self
            .rate
            .map_or(0, |rate| (spent * rate * 100.0).round() as i64);
        rate_bonus.saturating_add(self.points)
    }
}

/// Request payload for creating a promotion.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromotionRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: String,

    #[serde(rename = "type")]
    pub kind: PromotionType,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    #[validate(range(exclusive_min = 0.0, message = "minSpending must be positive"))]
    pub min_spending: Option<f64>,

    #[validate(range(exclusive_min = 0.0, message = "rate must be positive"))]
    pub rate: Option<f64>,

    #[validate(range(min = 0, message = "points must be non-negative"))]
    pub points: Option<i64>,
}

impl CreatePromotionRequest {
    /// Checks the window against the clock.
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.start_time < now {
            return Err(DomainError::invalid("Start time cannot be in the past"));
        }
        if self.end_time <= self.start_time {
            return Err(DomainError::invalid("End time must be after start time"));
        }
        Ok(())
    }
}

/// Request payload for updating a promotion (partial update).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePromotionRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,

    #[serde(rename = "type")]
    pub kind: Option<PromotionType>,

    pub start_time: Option<DateTime<Utc>>,

    pub end_time: Option<DateTime<Utc>>,

    #[validate(range(exclusive_min = 0.0, message = "minSpending must be positive"))]
    pub min_spending: Option<f64>,

    #[validate(range(exclusive_min = 0.0, message = "rate must be positive"))]
    pub rate: Option<f64>,

    #[validate(range(min = 0, message = "points must be non-negative"))]
    pub points: Option<i64>,
}

impl UpdatePromotionRequest {
    /// Drops fields equal to the stored value so they do not count as edits.
    fn without_unchanged(mut self, current: &Promotion) -> Self {
        if self.name.as_deref() == Some(current.name.as_str()) {
            self.name = None;
        }
        if self.description.as_deref() == Some(current.description.as_str()) {
            self.description = None;
        }
        if self.kind == Some(current.kind) {
            self.kind = None;
        }
        if self.start_time == Some(current.start_time) {
            self.start_time = None;
        }
        if self.end_time == Some(current.end_time) {
            self.end_time = None;
        }
        if self.min_spending.is_some() && self.min_spending == current.min_spending {
            self.min_spending = None;
        }
        if self.rate.is_some() && self.rate == current.rate {
            self.rate = None;
        }
        if self.points == Some(current.points) {
            self.points = None;
        }
        self
    }

    fn touches_more_than_end_time(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.kind.is_some()
            || self.start_time.is_some()
            || self.min_spending.is_some()
            || self.rate.is_some()
            || self.points.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_more_than_end_time() && self.end_time.is_none()
    }
}

/// Checks an update against the promotion's window and returns the
/// effective changes.
///
/// - ended promotions cannot be edited at all
/// - started promotions only accept an `endTime` change
/// - a new start cannot be in the past, a new end must be strictly in the
///   future, and end must follow start
///
/// Moving `endTime` earlier is allowed, so a running promotion can be cut
/// short as long as it stays open past `now`.
pub fn plan_promotion_update(
    current: &Promotion,
    req: UpdatePromotionRequest,
    now: DateTime<Utc>,
) -> Result<UpdatePromotionRequest, DomainError> {
    let window = current.window();
    let changes = req.without_unchanged(current);

    if changes.is_empty() {
        return Ok(changes);
    }

    if window.has_ended(now) {
        return Err(DomainError::invalid("Cannot update ended promotions"));
    }

    if window.has_started(now) && changes.touches_more_than_end_time() {
        return Err(DomainError::invalid("Cannot update ongoing promotions"));
    }

    if let Some(start) = changes.start_time {
        if start < now {
            return Err(DomainError::invalid("Start time cannot be in the past"));
        }
    }
    if let Some(end) = changes.end_time {
        if end <= now {
            return Err(DomainError::invalid("End time cannot be in the past"));
        }
    }

    let start = changes.start_time.unwrap_or(current.start_time);
    let end = changes.end_time.unwrap_or(current.end_time);
    if end <= start {
        return Err(DomainError::invalid("End time must be after start time"));
    }

    Ok(changes)
}

/// A promotion that has started can no longer be deleted.
pub fn check_promotion_delete(current: &Promotion, now: DateTime<Utc>) -> Result<(), DomainError> {
    if current.window().has_started(now) {
        Err(DomainError::forbidden(
            "Cannot delete a promotion that has already started",
        ))
    } else {
        Ok(())
    }
}

/// Promotion representation in API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: PromotionType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min_spending: Option<f64>,
    pub rate: Option<f64>,
    pub points: i64,
}

impl From<Promotion> for PromotionResponse {
    fn from(p: Promotion) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            kind: p.kind,
            start_time: p.start_time,
            end_time: p.end_time,
            min_spending: p.min_spending,
            rate: p.rate,
            points: p.points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promotion(start_offset_hours: i64, end_offset_hours: i64, now: DateTime<Utc>) -> Promotion {
        Promotion {
            id: 1,
            name: "Spring Bonus".to_string(),
            description: "Extra points in spring".to_string(),
            kind: PromotionType::Automatic,
            start_time: now + Duration::hours(start_offset_hours),
            end_time: now + Duration::hours(end_offset_hours),
            min_spending: Some(50.0),
            rate: Some(0.01),
            points: 10,
        }
    }

    #[test]
    fn test_promotion_type_accepts_both_spellings() {
        let a: PromotionType = serde_json::from_str("\"one-time\"").unwrap();
        let b: PromotionType = serde_json::from_str("\"onetime\"").unwrap();
        let c: PromotionType = serde_json::from_str("\"automatic\"").unwrap();
        assert_eq!(a, PromotionType::OneTime);
        assert_eq!(b, PromotionType::OneTime);
        assert_eq!(c, PromotionType::Automatic);
        assert!(serde_json::from_str::<PromotionType>("\"weekly\"").is_err());
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"onetime\"");
    }

    #[test]
    fn test_window_is_half_open() {
        let now = Utc::now();
        let window = PromotionWindow {
            start: now,
            end: now + Duration::hours(1),
        };
        assert!(window.is_active(now));
        assert!(!window.is_active(now - Duration::seconds(1)));
        assert!(!window.is_active(now + Duration::hours(1)));
    }

    #[test]
    fn test_bonus_for() {
        let now = Utc::now();
        let p = promotion(-1, 1, now);
        // 100.00 * 0.01 * 100 = 100 rate points + 10 flat
        assert_eq!(p.bonus_for(100.0), 110);
        assert!(p.qualifies(50.0));
        assert!(!p.qualifies(49.99));
    }

    #[test]
    fn test_create_window_checks() {
        let now = Utc::now();
        let mut req = CreatePromotionRequest {
            name: "Launch".to_string(),
            description: String::new(),
            kind: PromotionType::OneTime,
            start_time: now - Duration::minutes(1),
            end_time: now + Duration::days(1),
            min_spending: None,
            rate: None,
            points: Some(50),
        };
        assert_eq!(
            req.check_window(now),
            Err(DomainError::invalid("Start time cannot be in the past"))
        );

        req.start_time = now + Duration::days(2);
        assert_eq!(
            req.check_window(now),
            Err(DomainError::invalid("End time must be after start time"))
        );

        req.end_time = now + Duration::days(3);
        assert!(req.check_window(now).is_ok());
    }

    #[test]
    fn test_create_rejects_non_positive_rate() {
        let now = Utc::now();
        let req = CreatePromotionRequest {
            name: "Launch".to_string(),
            description: String::new(),
            kind: PromotionType::Automatic,
            start_time: now + Duration::hours(1),
            end_time: now + Duration::hours(2),
            min_spending: Some(0.0),
            rate: Some(-0.5),
            points: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_started_promotion_rejects_name_change() {
        let now = Utc::now();
        let current = promotion(-1, 5, now);
        let req = UpdatePromotionRequest {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert_eq!(
            plan_promotion_update(&current, req, now),
            Err(DomainError::invalid("Cannot update ongoing promotions"))
        );
    }

    #[test]
    fn test_started_promotion_accepts_end_time_extension() {
        let now = Utc::now();
        let current = promotion(-1, 5, now);
        let new_end = now + Duration::hours(48);
        let req = UpdatePromotionRequest {
            end_time: Some(new_end),
            ..Default::default()
        };
        let changes = plan_promotion_update(&current, req, now).unwrap();
        assert_eq!(changes.end_time, Some(new_end));
    }

    #[test]
    fn test_started_promotion_rejects_end_time_now() {
        let now = Utc::now();
        let current = promotion(-1, 5, now);
        let req = UpdatePromotionRequest {
            end_time: Some(now),
            ..Default::default()
        };
        assert_eq!(
            plan_promotion_update(&current, req, now),
            Err(DomainError::invalid("End time cannot be in the past"))
        );
    }

    #[test]
    fn test_started_promotion_can_be_cut_short() {
        let now = Utc::now();
        let current = promotion(-1, 5, now);
        let new_end = now + Duration::hours(1);
        let req = UpdatePromotionRequest {
            end_time: Some(new_end),
            ..Default::default()
        };
        let changes = plan_promotion_update(&current, req, now).unwrap();
        assert_eq!(changes.end_time, Some(new_end));
    }

    #[test]
    fn test_started_promotion_ignores_unchanged_fields() {
        let now = Utc::now();
        let current = promotion(-1, 5, now);
        let req = UpdatePromotionRequest {
            name: Some(current.name.clone()),
            end_time: Some(now + Duration::hours(10)),
            ..Default::default()
        };
        assert!(plan_promotion_update(&current, req, now).is_ok());
    }

    #[test]
    fn test_ended_promotion_rejects_everything() {
        let now = Utc::now();
        let current = promotion(-5, -1, now);
        let req = UpdatePromotionRequest {
            end_time: Some(now + Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(
            plan_promotion_update(&current, req, now),
            Err(DomainError::invalid("Cannot update ended promotions"))
        );
    }

    #[test]
    fn test_upcoming_promotion_rejects_end_before_start() {
        let now = Utc::now();
        let current = promotion(2, 5, now);
        let req = UpdatePromotionRequest {
            end_time: Some(now + Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(
            plan_promotion_update(&current, req, now),
            Err(DomainError::invalid("End time must be after start time"))
        );
    }

    #[test]
    fn test_upcoming_promotion_rejects_start_in_past() {
        let now = Utc::now();
        let current = promotion(2, 5, now);
        let req = UpdatePromotionRequest {
            start_time: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(plan_promotion_update(&current, req, now).is_err());
    }

    #[test]
    fn test_upcoming_promotion_accepts_full_edit() {
        let now = Utc::now();
        let current = promotion(2, 5, now);
        let req = UpdatePromotionRequest {
            name: Some("Summer Bonus".to_string()),
            kind: Some(PromotionType::OneTime),
            points: Some(25),
            ..Default::default()
        };
        let changes = plan_promotion_update(&current, req, now).unwrap();
        assert_eq!(changes.name.as_deref(), Some("Summer Bonus"));
        assert_eq!(changes.points, Some(25));
    }

    #[test]
    fn test_delete_rules() {
        let now = Utc::now();
        assert!(check_promotion_delete(&promotion(1, 2, now), now).is_ok());
        assert!(matches!(
            check_promotion_delete(&promotion(-1, 2, now), now),
            Err(DomainError::Forbidden(_))
        ));
    }
}
