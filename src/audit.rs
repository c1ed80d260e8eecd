//! Loan audit trail
//!
//! Entries are written on the caller's connection so they commit or roll back
//! together with the transition they describe.

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    LoanRequested,
    LoanApproved,
    LoanFullyApproved,
    LoanRejected,
    DisbursementInitiated,
    DisbursementRejected,
    PayoutSucceeded,
    PayoutFailed,
    PayoutTimedOut,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoanRequested => "loan_requested",
            AuditAction::LoanApproved => "loan_approved",
            AuditAction::LoanFullyApproved => "loan_fully_approved",
            AuditAction::LoanRejected => "loan_rejected",
            AuditAction::DisbursementInitiated => "disbursement_initiated",
            AuditAction::DisbursementRejected => "disbursement_rejected",
            AuditAction::PayoutSucceeded => "payout_succeeded",
            AuditAction::PayoutFailed => "payout_failed",
            AuditAction::PayoutTimedOut => "payout_timed_out",
        }
    }
}

/// Actor recorded for provider-driven transitions
pub const PROVIDER_ACTOR: &str = "payment-provider";

#[derive(Debug)]
pub struct AuditEntry {
    pub tenant_id: Uuid,
    pub loan_id: Uuid,
    pub payout_id: Option<Uuid>,
    pub action: AuditAction,
    pub actor: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanAuditLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub loan_id: Uuid,
    pub payout_id: Option<Uuid>,
    pub action: String,
    pub actor: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

pub async fn record(conn: &mut PgConnection, entry: AuditEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO loan_audit_logs (id, tenant_id, loan_id, payout_id, action, actor, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.tenant_id)
    .bind(entry.loan_id)
    .bind(entry.payout_id)
    .bind(entry.action.as_str())
    .bind(&entry.actor)
    .bind(&entry.details)
    .execute(conn)
    .await?;

    tracing::info!(
        action = entry.action.as_str(),
        actor = %entry.actor,
        loan_id = %entry.loan_id,
        payout_id = ?entry.payout_id,
        "Loan audit log recorded"
    );

    Ok(())
}

pub async fn list_for_loan(pool: &PgPool, loan_id: Uuid) -> Result<Vec<LoanAuditLog>, sqlx::Error> {
    sqlx::query_as::<_, LoanAuditLog>(
        "SELECT * FROM loan_audit_logs WHERE loan_id = $1 ORDER BY created_at, id",
    )
    .bind(loan_id)
    .fetch_all(pool)
    .await
}
