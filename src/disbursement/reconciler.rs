//! Callback reconciler
//!
//! Applies provider result and timeout callbacks to payouts and loans. Every
//! callback takes the payout row lock first and then the loan row lock, and
//! decides from the locked payout status, so duplicate or reordered
//! deliveries settle to the same state.

use serde_json::json;
use sqlx::{PgConnection, PgPool};

use super::model::{LoanPayout, PayoutStatus, ReconcileOutcome, PROVIDER_STATUS_UNCONFIRMED};
use crate::audit::{self, AuditAction, AuditEntry, PROVIDER_ACTOR};
use crate::error::LendingError;
use crate::provider::{ResultPayload, TimeoutPayload};

const PROVIDER_STATUS_COMPLETED: &str = "COMPLETED";
const PROVIDER_STATUS_FAILED: &str = "FAILED";

pub struct CallbackReconciler {
    db_pool: PgPool,
}

impl CallbackReconciler {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn on_result(&self, payload: &ResultPayload) -> Result<ReconcileOutcome, LendingError> {
        let mut tx = self.db_pool.begin().await?;

        let Some(payout) = lock_payout(
            &mut *tx,
            &payload.originator_conversation_id,
            payload.conversation_id.as_deref(),
        )
        .await?
        else {
            tracing::warn!(
                originator_conversation_id = %payload.originator_conversation_id,
                conversation_id = ?payload.conversation_id,
                "Result callback does not match any payout"
            );
            return Ok(ReconcileOutcome::Unmatched);
        };

        if !payout.status.accepts_result() {
            tracing::info!(
                payout_id = %payout.id,
                status = ?payout.status,
                "Duplicate result callback ignored"
            );
            return Ok(ReconcileOutcome::AlreadyResolved {
                payout_id: payout.id,
                status: payout.status,
            });
        }

        sqlx::query("SELECT id FROM loans WHERE id = $1 FOR UPDATE")
            .bind(payout.loan_id)
            .execute(&mut *tx)
            .await?;

        let transaction_id = payload
            .transaction_id
            .as_deref()
            .filter(|id| !id.trim().is_empty());

        let status = if payload.is_success() {
            PayoutStatus::Success
        } else {
            PayoutStatus::Failed
        };

        sqlx::query(
            r#"
            UPDATE loan_payouts
            SET status = $2,
                provider_transaction_id = COALESCE($3, provider_transaction_id),
                result_code = $4,
                result_desc = $5,
                conversation_id = COALESCE(conversation_id, $6),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(payout.id)
        .bind(status)
        .bind(transaction_id)
        .bind(&payload.result_code)
        .bind(&payload.result_desc)
        .bind(&payload.conversation_id)
        .execute(&mut *tx)
        .await?;

        let loan_update = if status == PayoutStatus::Success {
            sqlx::query(
                r#"
                UPDATE loans
                SET status = 'disbursed',
                    disbursed_at = NOW(),
                    provider_transaction_id = $2,
                    provider_status = $3,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'disbursement_pending'
                "#,
            )
            .bind(payout.loan_id)
            .bind(transaction_id)
            .bind(PROVIDER_STATUS_COMPLETED)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE loans
                SET status = 'disbursement_failed',
                    provider_status = $2,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'disbursement_pending'
                "#,
            )
            .bind(payout.loan_id)
            .bind(PROVIDER_STATUS_FAILED)
            .execute(&mut *tx)
            .await?
        };

        if loan_update.rows_affected() == 0 {
            tracing::warn!(
                loan_id = %payout.loan_id,
                payout_id = %payout.id,
                "Loan was not awaiting disbursement; payout updated alone"
            );
        }

        let action = if status == PayoutStatus::Success {
            AuditAction::PayoutSucceeded
        } else {
            AuditAction::PayoutFailed
        };

        audit::record(
            &mut *tx,
            AuditEntry {
                tenant_id: payout.tenant_id,
                loan_id: payout.loan_id,
                payout_id: Some(payout.id),
                action,
                actor: PROVIDER_ACTOR.to_string(),
                details: json!({
                    "result_code": payload.result_code,
                    "result_desc": payload.result_desc,
                    "transaction_id": transaction_id,
                    "previous_status": payout.status,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %payout.loan_id,
            payout_id = %payout.id,
            status = ?status,
            result_code = %payload.result_code,
            "Payout result applied"
        );

        Ok(ReconcileOutcome::Applied {
            payout_id: payout.id,
            status,
        })
    }

    pub async fn on_timeout(
        &self,
        payload: &TimeoutPayload,
    ) -> Result<ReconcileOutcome, LendingError> {
        let mut tx = self.db_pool.begin().await?;

        let Some(payout) = lock_payout(
            &mut *tx,
            &payload.originator_conversation_id,
            payload.conversation_id.as_deref(),
        )
        .await?
        else {
            tracing::warn!(
                originator_conversation_id = %payload.originator_conversation_id,
                conversation_id = ?payload.conversation_id,
                "Timeout callback does not match any payout"
            );
            return Ok(ReconcileOutcome::Unmatched);
        };

        if payout.status != PayoutStatus::Pending {
            tracing::info!(
                payout_id = %payout.id,
                status = ?payout.status,
                "Timeout callback for settled payout ignored"
            );
            return Ok(ReconcileOutcome::AlreadyResolved {
                payout_id: payout.id,
                status: payout.status,
            });
        }

        sqlx::query("SELECT id FROM loans WHERE id = $1 FOR UPDATE")
            .bind(payout.loan_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE loan_payouts SET status = 'timeout', updated_at = NOW() WHERE id = $1",
        )
        .bind(payout.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE loans
            SET provider_status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'disbursement_pending'
            "#,
        )
        .bind(payout.loan_id)
        .bind(PROVIDER_STATUS_UNCONFIRMED)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            AuditEntry {
                tenant_id: payout.tenant_id,
                loan_id: payout.loan_id,
                payout_id: Some(payout.id),
                action: AuditAction::PayoutTimedOut,
                actor: PROVIDER_ACTOR.to_string(),
                details: json!({
                    "originator_conversation_id": payload.originator_conversation_id,
                    "conversation_id": payload.conversation_id,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::warn!(
            loan_id = %payout.loan_id,
            payout_id = %payout.id,
            "Payout timed out at provider; outcome unconfirmed"
        );

        Ok(ReconcileOutcome::Applied {
            payout_id: payout.id,
            status: PayoutStatus::Timeout,
        })
    }
}

/// Payout a callback refers to, locked for update
///
/// Retries share the originator id, so an exact `ConversationID` match picks
/// the attempt the callback belongs to. Without one, the most recent payout
/// for the originator id is taken; its conversation id may not be stored yet.
async fn lock_payout(
    conn: &mut PgConnection,
    originator_conversation_id: &str,
    conversation_id: Option<&str>,
) -> Result<Option<LoanPayout>, sqlx::Error> {
    sqlx::query_as::<_, LoanPayout>(
        r#"
        SELECT * FROM loan_payouts
        WHERE originator_conversation_id = $1
           OR ($2::text IS NOT NULL AND conversation_id = $2)
        ORDER BY COALESCE(conversation_id = $2, FALSE) DESC, created_at DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(originator_conversation_id)
    .bind(conversation_id)
    .fetch_optional(conn)
    .await
}
