//! Disbursement initiator
//!
//! A payout row is committed as PENDING before the provider is called, so a
//! crash mid-call leaves a record the callbacks can still settle.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{DisbursementResult, LoanPayout, PayoutStatus, PAYOUT_METHOD};
use crate::audit::{self, AuditAction, AuditEntry};
use crate::auth::Identity;
use crate::config::ProviderConfig;
use crate::error::LendingError;
use crate::loan::{Loan, LoanStatus};
use crate::models::Employee;
use crate::provider::{B2cRequest, ProviderTransport, TransportError};

const UNIQUE_VIOLATION: &str = "23505";

pub struct DisbursementService {
    db_pool: PgPool,
    transport: Arc<dyn ProviderTransport>,
    provider: ProviderConfig,
}

impl DisbursementService {
    pub fn new(
        db_pool: PgPool,
        transport: Arc<dyn ProviderTransport>,
        provider: ProviderConfig,
    ) -> Self {
        Self {
            db_pool,
            transport,
            provider,
        }
    }

    /// Send the approved loan's amount to the borrower.
    ///
    /// Valid from APPROVED, or from DISBURSEMENT_FAILED as an operator retry.
    /// Returns once the provider acknowledges; settlement arrives by callback.
    pub async fn disburse(
        &self,
        actor: &Identity,
        loan_id: Uuid,
    ) -> Result<DisbursementResult, LendingError> {
        let (payout, request) = self.reserve_payout(actor, loan_id).await?;

        tracing::info!(
            loan_id = %loan_id,
            payout_id = %payout.id,
            originator_conversation_id = %payout.originator_conversation_id,
            amount = %payout.amount,
            "Submitting payout to provider"
        );

        let ack = match self.transport.initiate_b2c(&request).await {
            Ok(ack) if ack.is_accepted() => ack,
            Ok(ack) => {
                let err = TransportError::Rejected {
                    code: ack.response_code,
                    description: ack.response_description,
                };
                return Err(self.release_payout(&payout, err).await);
            }
            Err(err) => return Err(self.release_payout(&payout, err).await),
        };

        sqlx::query("UPDATE loan_payouts SET conversation_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(payout.id)
            .bind(&ack.conversation_id)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(
            loan_id = %loan_id,
            payout_id = %payout.id,
            conversation_id = %ack.conversation_id,
            "Payout accepted by provider"
        );

        Ok(DisbursementResult {
            payout_id: payout.id,
            provider_conversation_id: ack.conversation_id,
        })
    }

    /// Lock the loan, check preconditions, and commit a PENDING payout
    async fn reserve_payout(
        &self,
        actor: &Identity,
        loan_id: Uuid,
    ) -> Result<(LoanPayout, B2cRequest), LendingError> {
        let mut tx = self.db_pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| LendingError::not_found(format!("loan {}", loan_id)))?;

        loan.ensure_visible_to(actor)?;

        if !loan.status.can_transition_to(LoanStatus::DisbursementPending) {
            return Err(LendingError::invalid_transition(format!(
                "loan {} cannot be disbursed from {:?}",
                loan.id, loan.status
            )));
        }

        let in_flight: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM loan_payouts WHERE loan_id = $1 AND status = 'pending'",
        )
        .bind(loan.id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(payout_id) = in_flight {
            return Err(LendingError::invalid_transition(format!(
                "loan {} already has payout {} in flight",
                loan.id, payout_id
            )));
        }

        let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE user_id = $1")
            .bind(loan.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LendingError::NotLinked(loan.user_id))?;

        // Retries reuse the key so the provider can recognize a repeat
        let originator_conversation_id = loan
            .originator_conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let payout = sqlx::query_as::<_, LoanPayout>(
            r#"
            INSERT INTO loan_payouts (
                id, tenant_id, loan_id, amount, method, status,
                originator_conversation_id, approved_by_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(loan.tenant_id)
        .bind(loan.id)
        .bind(loan.amount)
        .bind(PAYOUT_METHOD)
        .bind(PayoutStatus::Pending)
        .bind(&originator_conversation_id)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LendingError::invalid_transition(format!(
                    "loan {} already has a payout in flight",
                    loan.id
                ))
            } else {
                LendingError::Database(e)
            }
        })?;

        sqlx::query(
            r#"
            UPDATE loans
            SET status = $2, originator_conversation_id = $3, provider_status = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(loan.id)
        .bind(LoanStatus::DisbursementPending)
        .bind(&originator_conversation_id)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            AuditEntry {
                tenant_id: loan.tenant_id,
                loan_id: loan.id,
                payout_id: Some(payout.id),
                action: AuditAction::DisbursementInitiated,
                actor: actor.user_id.to_string(),
                details: json!({
                    "amount": loan.amount,
                    "previous_status": loan.status,
                    "originator_conversation_id": originator_conversation_id,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        let request = B2cRequest {
            originator_conversation_id,
            amount: loan.amount,
            payee_msisdn: employee.phone_number,
            short_code: self.provider.short_code.clone(),
            initiator_name: self.provider.initiator_name.clone(),
            security_credential: self.provider.security_credential.clone(),
            result_callback_url: self.provider.b2c_result_url(),
            timeout_callback_url: self.provider.b2c_timeout_url(),
            remarks: format!("Salary advance {}", loan.id),
        };

        Ok((payout, request))
    }

    /// Undo the reservation after a synchronous provider failure and hand
    /// back the error to return to the caller
    async fn release_payout(&self, payout: &LoanPayout, err: TransportError) -> LendingError {
        tracing::warn!(
            loan_id = %payout.loan_id,
            payout_id = %payout.id,
            error = %err,
            "Payout request failed; reverting loan to approved"
        );

        if let Err(db_err) = self.mark_rejected(payout, &err).await {
            tracing::error!(
                payout_id = %payout.id,
                error = %db_err,
                "Failed to release payout after transport error"
            );
            return LendingError::Database(db_err);
        }

        LendingError::Transport(err)
    }

    async fn mark_rejected(
        &self,
        payout: &LoanPayout,
        err: &TransportError,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.db_pool.begin().await?;

        let (result_code, description) = match err {
            TransportError::Rejected { code, description } => (Some(code.clone()), description.clone()),
            other => (None, other.to_string()),
        };

        // A callback may have settled the payout while the call was in flight
        let released = sqlx::query(
            r#"
            UPDATE loan_payouts
            SET status = 'failed', result_code = $2, result_desc = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(payout.id)
        .bind(&result_code)
        .bind(&description)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if released == 1 {
            sqlx::query(
                r#"
                UPDATE loans
                SET status = 'approved', updated_at = NOW()
                WHERE id = $1 AND status = 'disbursement_pending'
                "#,
            )
            .bind(payout.loan_id)
            .execute(&mut *tx)
            .await?;

            audit::record(
                &mut *tx,
                AuditEntry {
                    tenant_id: payout.tenant_id,
                    loan_id: payout.loan_id,
                    payout_id: Some(payout.id),
                    action: AuditAction::DisbursementRejected,
                    actor: payout.approved_by_id.to_string(),
                    details: json!({
                        "result_code": result_code,
                        "reason": description,
                    }),
                },
            )
            .await?;
        }

        tx.commit().await
    }

    pub async fn list_for_loan(
        &self,
        actor: &Identity,
        loan_id: Uuid,
    ) -> Result<Vec<LoanPayout>, LendingError> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(loan_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| LendingError::not_found(format!("loan {}", loan_id)))?;
        loan.ensure_visible_to(actor)?;

        let payouts = sqlx::query_as::<_, LoanPayout>(
            "SELECT * FROM loan_payouts WHERE loan_id = $1 ORDER BY created_at DESC",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(payouts)
    }

    /// Payouts the provider timed out on, awaiting reconciliation
    pub async fn list_unconfirmed(
        &self,
        actor: &Identity,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LoanPayout>, LendingError> {
        let payouts = sqlx::query_as::<_, LoanPayout>(
            r#"
            SELECT p.* FROM loan_payouts p
            JOIN loans l ON l.id = p.loan_id
            WHERE p.tenant_id = $1
              AND p.status = 'timeout'
              AND ($2::uuid IS NULL OR l.organization_id = $2)
            ORDER BY p.created_at
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(actor.tenant_id)
        .bind(actor.organization_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(payouts)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|d| d.code())
        .map_or(false, |code| code == UNIQUE_VIOLATION)
}
