//! Payout models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Method recorded on every payout sent through the mobile-money provider
pub const PAYOUT_METHOD: &str = "mobile_money";

/// `providerStatus` set on a loan whose payout timed out at the provider
pub const PROVIDER_STATUS_UNCONFIRMED: &str = "UNCONFIRMED";

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Success,
    Failed,
    Timeout,
}

impl PayoutStatus {
    /// A result callback may still settle the payout
    pub fn accepts_result(self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Timeout)
    }

    pub fn is_final(self) -> bool {
        matches!(self, PayoutStatus::Success | PayoutStatus::Failed)
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanPayout {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub status: PayoutStatus,
    pub originator_conversation_id: String,
    pub conversation_id: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub result_code: Option<String>,
    pub result_desc: Option<String>,
    pub approved_by_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned once the provider has acknowledged a payout request
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct DisbursementResult {
    pub payout_id: Uuid,
    pub provider_conversation_id: String,
}

/// What a result or timeout callback did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The payout moved to `status`
    Applied { payout_id: Uuid, status: PayoutStatus },
    /// The payout was already settled; nothing changed
    AlreadyResolved { payout_id: Uuid, status: PayoutStatus },
    /// No payout carries the callback's correlation ids
    Unmatched,
}
