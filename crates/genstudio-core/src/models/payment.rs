use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "payment_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Result of applying a review decision to a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status changed; approval credits must be granted exactly now.
    Applied(PaymentStatus),
    /// Same decision repeated; nothing to do.
    Unchanged(PaymentStatus),
}

impl PaymentStatus {
    /// Pending moves once to Approved or Rejected. Repeating the same decision
    /// is a no-op; the opposite decision on a resolved request is a conflict.
    pub fn apply(self, decision: ReviewDecision) -> Result<Transition, AppError> {
        match (self, decision) {
            (PaymentStatus::Pending, ReviewDecision::Approve) => {
                Ok(Transition::Applied(PaymentStatus::Approved))
            }
            (PaymentStatus::Pending, ReviewDecision::Reject) => {
                Ok(Transition::Applied(PaymentStatus::Rejected))
            }
            (PaymentStatus::Approved, ReviewDecision::Approve)
            | (PaymentStatus::Rejected, ReviewDecision::Reject) => Ok(Transition::Unchanged(self)),
            (current, _) => Err(AppError::Conflict(format!(
                "Payment request is already {}",
                current
            ))),
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Approved => write!(f, "approved"),
            PaymentStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "approved" => Ok(PaymentStatus::Approved),
            "rejected" => Ok(PaymentStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid payment status: {}", s)),
        }
    }
}

/// A credit bundle users can pay for offline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CreditPackage {
    pub id: String,
    pub name: String,
    pub image_credits: i32,
    pub video_credits: i32,
    pub price_cents: i64,
    pub currency: String,
}

impl CreditPackage {
    pub fn default_catalog() -> Vec<CreditPackage> {
        vec![
            CreditPackage {
                id: "starter".to_string(),
                name: "Starter".to_string(),
                image_credits: 50,
                video_credits: 10,
                price_cents: 999,
                currency: "USD".to_string(),
            },
            CreditPackage {
                id: "creator".to_string(),
                name: "Creator".to_string(),
                image_credits: 200,
                video_credits: 40,
                price_cents: 2999,
                currency: "USD".to_string(),
            },
            CreditPackage {
                id: "studio".to_string(),
                name: "Studio".to_string(),
                image_credits: 1000,
                video_credits: 200,
                price_cents: 9999,
                currency: "USD".to_string(),
            },
        ]
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".to_string());
        }
        if self.image_credits < 0 || self.video_credits < 0 {
            return Err("credits must not be negative".to_string());
        }
        if self.price_cents < 0 {
            return Err("price must not be negative".to_string());
        }
        Ok(())
    }
}

/// An offline payment claim awaiting admin review.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: String,
    pub image_credits: i32,
    pub video_credits: i32,
    pub amount_cents: i64,
    pub currency: String,
    pub contact_name: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub payment_reference: String,
    pub status: PaymentStatus,
    pub admin_note: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a payment request; credits are copied from the package.
#[derive(Debug, Clone)]
pub struct NewPaymentRequest {
    pub user_id: Uuid,
    pub package: CreditPackage,
    pub contact_name: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub payment_reference: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitPaymentRequest {
    #[validate(length(min = 1, max = 64))]
    pub package_id: String,
    #[validate(length(min = 1, max = 120))]
    pub contact_name: String,
    #[validate(length(max = 40))]
    pub contact_phone: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    /// Transfer receipt number or similar proof.
    #[validate(length(min = 1, max = 200))]
    pub payment_reference: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ReviewPaymentRequest {
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// Response to approve/reject: the row plus whether this call changed it.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentReviewResponse {
    pub payment: PaymentRequest,
    pub applied: bool,
    /// Localized outcome text.
    pub message: String,
}

/// Response to `POST /payments`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentSubmitted {
    pub payment: PaymentRequest,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_resolves_once() {
        assert_eq!(
            PaymentStatus::Pending.apply(ReviewDecision::Approve).unwrap(),
            Transition::Applied(PaymentStatus::Approved)
        );
        assert_eq!(
            PaymentStatus::Pending.apply(ReviewDecision::Reject).unwrap(),
            Transition::Applied(PaymentStatus::Rejected)
        );
    }

    #[test]
    fn test_repeated_decision_is_noop() {
        assert_eq!(
            PaymentStatus::Approved
                .apply(ReviewDecision::Approve)
                .unwrap(),
            Transition::Unchanged(PaymentStatus::Approved)
        );
        assert_eq!(
            PaymentStatus::Rejected.apply(ReviewDecision::Reject).unwrap(),
            Transition::Unchanged(PaymentStatus::Rejected)
        );
    }

    #[test]
    fn test_opposite_decision_conflicts() {
        let err = PaymentStatus::Approved
            .apply(ReviewDecision::Reject)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(PaymentStatus::Rejected
            .apply(ReviewDecision::Approve)
            .is_err());
    }

    #[test]
    fn test_default_catalog_is_valid() {
        for package in CreditPackage::default_catalog() {
            assert!(package.validate().is_ok());
        }
    }

    #[test]
    fn test_package_rejects_negative_credits() {
        let mut package = CreditPackage::default_catalog().remove(0);
        package.video_credits = -5;
        assert!(package.validate().is_err());
    }
}
