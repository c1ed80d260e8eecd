//! Balance snapshot models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Outbound balance inquiry awaiting its result callback
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct BalanceInquiry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub conversation_id: String,
    pub originator_conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of provider-held funds
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct AccountBalanceSnapshot {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub result_type: i32,
    pub result_code: String,
    pub result_desc: String,
    pub originator_conversation_id: String,
    pub conversation_id: String,
    pub provider_transaction_id: Option<String>,
    pub working_account_balance: Decimal,
    pub utility_account_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// What happened to a balance result callback
#[derive(Debug, Clone)]
pub enum BalanceOutcome {
    Recorded(AccountBalanceSnapshot),
    /// Same conversation id delivered again; the stored snapshot is returned
    Duplicate(AccountBalanceSnapshot),
    /// The provider could not produce a balance
    ProviderFailed { result_code: String, result_desc: String },
    /// No inquiry of ours matches the correlation ids
    Unmatched,
}
