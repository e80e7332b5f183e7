//! Point-ledger transaction model and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use crate::error::DomainError;

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Redemption,
    Transfer,
    Event,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Redemption => "redemption",
            TransactionType::Transfer => "transfer",
            TransactionType::Event => "event",
            TransactionType::Adjustment => "adjustment",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "redemption" => Ok(TransactionType::Redemption),
            "transfer" => Ok(TransactionType::Transfer),
            "event" => Ok(TransactionType::Event),
            "adjustment" => Ok(TransactionType::Adjustment),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger entry. `amount` is the signed point delta for `utorid`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub utorid: String,
    pub kind: TransactionType,
    pub amount: i64,
    pub spent: Option<f64>,
    pub related_id: Option<i64>,
    pub promotion_ids: Vec<i64>,
    pub suspicious: bool,
    pub processed: bool,
    pub remark: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /transactions`.
///
/// One payload shape serves both cashier purchases and manager adjustments;
/// [`CreateTransactionRequest::into_command`] sorts out which fields apply.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    #[validate(custom(function = "shared::validation::validate_utorid"))]
    pub utorid: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[validate(custom(function = "crate::models::transaction::validate_optional_spent"))]
    pub spent: Option<f64>,

    pub amount: Option<i64>,

    pub related_id: Option<i64>,

    #[serde(default)]
    pub promotion_ids: Vec<i64>,

    #[validate(length(max = 500, message = "Remark must be at most 500 characters"))]
    pub remark: Option<String>,
}

/// Validates optional spent amount.
pub fn validate_optional_spent(spent: f64) -> Result<(), validator::ValidationError> {
    shared::validation::validate_spent(spent)
}

/// A validated cashier/manager ledger command.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionCommand {
    Purchase {
        utorid: String,
        spent: f64,
        promotion_ids: Vec<i64>,
        remark: String,
    },
    Adjustment {
        utorid: String,
        amount: i64,
        related_id: i64,
        promotion_ids: Vec<i64>,
        remark: String,
    },
}

impl CreateTransactionRequest {
    /// Resolves the request into a command for its `type`.
    ///
    /// Only purchases and adjustments are created here; redemptions,
    /// transfers and event awards have their own endpoints.
    pub fn into_command(self) -> Result<TransactionCommand, DomainError> {
        let remark = self.remark.unwrap_or_default();
        let mut promotion_ids = self.promotion_ids;
        promotion_ids.sort_unstable();
        promotion_ids.dedup();

        match TransactionType::from_str(&self.kind) {
            Ok(TransactionType::Purchase) => {
                let spent = self
                    .spent
                    .ok_or_else(|| DomainError::invalid("spent is required for purchases"))?;
                Ok(TransactionCommand::Purchase {
                    utorid: self.utorid,
                    spent,
                    promotion_ids,
                    remark,
                })
            }
            Ok(TransactionType::Adjustment) => {
                let amount = match self.amount {
                    Some(0) | None => {
                        return Err(DomainError::invalid(
                            "amount must be a non-zero integer for adjustments",
                        ))
                    }
                    Some(amount) => amount,
                };
                let related_id = self
                    .related_id
                    .ok_or_else(|| DomainError::invalid("relatedId is required for adjustments"))?;
                Ok(TransactionCommand::Adjustment {
                    utorid: self.utorid,
                    amount,
                    related_id,
                    promotion_ids,
                    remark,
                })
            }
            _ => Err(DomainError::invalid("Invalid transaction type")),
        }
    }
}

fn default_redemption() -> String {
    TransactionType::Redemption.as_str().to_string()
}

fn default_transfer() -> String {
    TransactionType::Transfer.as_str().to_string()
}

fn default_event() -> String {
    TransactionType::Event.as_str().to_string()
}

/// Body of `POST /users/me/transactions`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    #[serde(rename = "type", default = "default_redemption")]
    pub kind: String,

    #[validate(range(min = 1, message = "amount must be a positive integer"))]
    pub amount: i64,

    #[validate(length(max = 500, message = "Remark must be at most 500 characters"))]
    pub remark: Option<String>,
}

/// Body of `POST /users/:userId/transactions`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(rename = "type", default = "default_transfer")]
    pub kind: String,

    #[validate(range(min = 1, message = "amount must be a positive integer"))]
    pub amount: i64,

    #[validate(length(max = 500, message = "Remark must be at most 500 characters"))]
    pub remark: Option<String>,
}

/// Body of `POST /events/:eventId/transactions`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventAwardRequest {
    #[serde(rename = "type", default = "default_event")]
    pub kind: String,

    /// Single recipient; when absent every attended guest is rewarded.
    pub utorid: Option<String>,

    #[validate(range(min = 1, message = "amount must be a positive integer"))]
    pub amount: i64,

    #[validate(length(max = 500, message = "Remark must be at most 500 characters"))]
    pub remark: Option<String>,
}

/// Ensures a typed body carries the type its endpoint serves.
pub fn expect_kind(kind: &str, expected: TransactionType) -> Result<(), DomainError> {
    if kind == expected.as_str() {
        Ok(())
    } else {
        Err(DomainError::invalid(format!(
            "type must be \"{}\"",
            expected
        )))
    }
}

/// Body of `PATCH /transactions/:id/suspicious`.
#[derive(Debug, Clone, Deserialize)]
pub struct SuspiciousRequest {
    pub suspicious: bool,
}

/// Body of `PATCH /transactions/:id/processed`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessedRequest {
    pub processed: bool,
}

/// Transaction representation in API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: i64,
    pub utorid: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_id: Option<i64>,
    pub promotion_ids: Vec<i64>,
    pub suspicious: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
    pub remark: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            utorid: t.utorid,
            kind: t.kind,
            amount: t.amount,
            spent: t.spent,
            related_id: t.related_id,
            promotion_ids: t.promotion_ids,
            suspicious: t.suspicious,
            processed: (t.kind == TransactionType::Redemption).then_some(t.processed),
            remark: t.remark,
            created_by: t.created_by,
            created_at: t.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str) -> CreateTransactionRequest {
        CreateTransactionRequest {
            utorid: "johndoe1".to_string(),
            kind: kind.to_string(),
            spent: Some(25.0),
            amount: Some(-40),
            related_id: Some(7),
            promotion_ids: vec![3, 1, 3],
            remark: None,
        }
    }

    #[test]
    fn test_purchase_command() {
        let cmd = request("purchase").into_command().unwrap();
        assert_eq!(
            cmd,
            TransactionCommand::Purchase {
                utorid: "johndoe1".to_string(),
                spent: 25.0,
                promotion_ids: vec![1, 3],
                remark: String::new(),
            }
        );
    }

    #[test]
    fn test_purchase_requires_spent() {
        let mut req = request("purchase");
        req.spent = None;
        assert!(matches!(req.into_command(), Err(DomainError::Invalid(_))));
    }

    #[test]
    fn test_adjustment_command() {
        match request("adjustment").into_command().unwrap() {
            TransactionCommand::Adjustment {
                amount, related_id, ..
            } => {
                assert_eq!(amount, -40);
                assert_eq!(related_id, 7);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_adjustment_rejects_zero_amount() {
        let mut req = request("adjustment");
        req.amount = Some(0);
        assert!(req.into_command().is_err());
    }

    #[test]
    fn test_other_types_rejected() {
        for kind in ["transfer", "redemption", "event", "refund", ""] {
            assert_eq!(
                request(kind).into_command(),
                Err(DomainError::invalid("Invalid transaction type"))
            );
        }
    }

    #[test]
    fn test_negative_spent_fails_validation() {
        let mut req = request("purchase");
        req.spent = Some(-1.0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_redemption_request_defaults_type() {
        let req: RedemptionRequest = serde_json::from_str(r#"{"amount": 100}"#).unwrap();
        assert_eq!(req.kind, "redemption");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_transfer_request_rejects_non_positive() {
        let req: TransferRequest =
            serde_json::from_str(r#"{"type": "transfer", "amount": 0}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_expect_kind() {
        assert!(expect_kind("transfer", TransactionType::Transfer).is_ok());
        assert!(expect_kind("purchase", TransactionType::Transfer).is_err());
    }

    #[test]
    fn test_response_processed_only_for_redemptions() {
        let tx = Transaction {
            id: 1,
            utorid: "johndoe1".to_string(),
            kind: TransactionType::Purchase,
            amount: 100,
            spent: Some(25.0),
            related_id: None,
            promotion_ids: vec![],
            suspicious: false,
            processed: false,
            remark: String::new(),
            created_by: "cashier1".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(TransactionResponse::from(tx.clone())).unwrap();
        assert_eq!(json["type"], "purchase");
        assert!(json.get("processed").is_none());

        let redemption = Transaction {
            kind: TransactionType::Redemption,
            amount: -100,
            spent: None,
            ..tx
        };
        let json = serde_json::to_value(TransactionResponse::from(redemption)).unwrap();
        assert_eq!(json["processed"], false);
        assert!(json.get("spent").is_none());
    }
}
