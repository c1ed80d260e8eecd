//! Loan service layer - request, approval, and rejection of salary advances

use std::sync::Arc;

use chrono::{Months, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::capacity::{load_capacity, CapacityGuard};
use super::model::{
    approver_column, total_repayable, ApprovalOutcome, BorrowCapacity, CreateLoanRequest,
    ListLoansQuery, Loan, LoanStatus,
};
use crate::audit::{self, AuditAction, AuditEntry, LoanAuditLog};
use crate::auth::Identity;
use crate::disbursement::DisbursementService;
use crate::error::LendingError;
use crate::models::{Organization, PageQuery};

/// Loan service for managing the approval lifecycle
#[derive(Clone)]
pub struct LoanService {
    db_pool: PgPool,
    capacity: CapacityGuard,
    disbursement: Arc<DisbursementService>,
}

impl LoanService {
    pub fn new(db_pool: PgPool, disbursement: Arc<DisbursementService>) -> Self {
        Self {
            capacity: CapacityGuard::new(db_pool.clone()),
            db_pool,
            disbursement,
        }
    }

    pub async fn capacity(&self, user_id: Uuid) -> Result<BorrowCapacity, LendingError> {
        self.capacity.compute(user_id).await
    }

    /// Create a PENDING loan for the calling borrower
    pub async fn request_loan(
        &self,
        borrower: &Identity,
        request: CreateLoanRequest,
    ) -> Result<Loan, LendingError> {
        validate_amount(request.amount)?;

        let mut tx = self.db_pool.begin().await?;
        let now = Utc::now();

        let context = load_capacity(&mut *tx, borrower.user_id, false, now).await?;
        if context.employee.tenant_id != borrower.tenant_id {
            return Err(LendingError::Forbidden(
                "employee profile belongs to another tenant".to_string(),
            ));
        }
        if !context.capacity.allows(request.amount) {
            return Err(LendingError::CapacityExceeded {
                requested: request.amount,
                remaining: context.capacity.remaining_amount,
            });
        }

        let organization = &context.organization;
        let months = u32::try_from(request.duration_months)
            .map_err(|_| LendingError::Validation("duration must be positive".to_string()))?;
        let due_date = now.checked_add_months(Months::new(months)).ok_or_else(|| {
            LendingError::Validation(format!("due date out of range for {} months", months))
        })?;
        let total = total_repayable(
            request.amount,
            organization.interest_rate,
            request.duration_months,
        );

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                id, tenant_id, organization_id, user_id, amount, interest_rate,
                duration_months, due_date, total_repayable, status, approval_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(organization.tenant_id)
        .bind(organization.id)
        .bind(borrower.user_id)
        .bind(request.amount)
        .bind(organization.interest_rate)
        .bind(request.duration_months)
        .bind(due_date)
        .bind(total)
        .bind(LoanStatus::Pending)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            AuditEntry {
                tenant_id: loan.tenant_id,
                loan_id: loan.id,
                payout_id: None,
                action: AuditAction::LoanRequested,
                actor: borrower.user_id.to_string(),
                details: json!({
                    "amount": loan.amount,
                    "duration_months": loan.duration_months,
                    "total_repayable": loan.total_repayable,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %loan.id,
            user_id = %borrower.user_id,
            amount = %loan.amount,
            "Loan requested"
        );

        Ok(loan)
    }

    /// Record one approval. The approval that completes the organization's
    /// quorum moves the loan to APPROVED and starts disbursement.
    pub async fn approve(
        &self,
        approver: &Identity,
        loan_id: Uuid,
    ) -> Result<ApprovalOutcome, LendingError> {
        let (loan, crossed) = self.record_approval(approver, loan_id).await?;

        if !crossed {
            return Ok(ApprovalOutcome {
                loan,
                handed_off: false,
                disbursement: None,
                disbursement_error: None,
            });
        }

        // Outside the approval transaction: the provider call must not hold row locks
        let (disbursement, disbursement_error) =
            match self.disbursement.disburse(approver, loan_id).await {
                Ok(result) => (Some(result), None),
                Err(LendingError::Transport(err)) => (None, Some(err.to_string())),
                Err(err) => {
                    tracing::error!(
                        loan_id = %loan_id,
                        error = %err,
                        "Disbursement hand-off failed"
                    );
                    (None, Some(err.to_string()))
                }
            };

        let loan = self.fetch_loan(loan_id).await?;
        Ok(ApprovalOutcome {
            loan,
            handed_off: true,
            disbursement,
            disbursement_error,
        })
    }

    /// Returns the updated loan and whether this approval reached the threshold
    async fn record_approval(
        &self,
        approver: &Identity,
        loan_id: Uuid,
    ) -> Result<(Loan, bool), LendingError> {
        let mut tx = self.db_pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| LendingError::not_found(format!("loan {}", loan_id)))?;

        loan.ensure_visible_to(approver)?;

        if loan.user_id == approver.user_id {
            return Err(LendingError::Forbidden(
                "borrowers cannot approve their own loan".to_string(),
            ));
        }
        if loan.status != LoanStatus::Pending {
            return Err(LendingError::invalid_transition(format!(
                "loan {} is {:?}, not awaiting approval",
                loan.id, loan.status
            )));
        }
        if loan.has_approved(approver.user_id) {
            return Err(LendingError::invalid_transition(format!(
                "approver {} already approved loan {}",
                approver.user_id, loan.id
            )));
        }

        let organization =
            sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
                .bind(loan.organization_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    LendingError::not_found(format!("organization {}", loan.organization_id))
                })?;

        let required = organization.approval_steps;
        if loan.approval_count >= required {
            return Err(LendingError::invalid_transition(format!(
                "loan {} already has {} of {} approvals",
                loan.id, loan.approval_count, required
            )));
        }

        let column = approver_column(loan.approval_count).ok_or_else(|| {
            LendingError::invalid_transition(format!("loan {} has no free approver slot", loan.id))
        })?;
        let next_count = loan.approval_count + 1;
        let crossed = next_count == required;

        if crossed {
            // Serialize against other loans of the same borrower reaching approval
            let context = load_capacity(&mut *tx, loan.user_id, true, loan.created_at).await?;
            if !context.capacity.allows(loan.amount) {
                return Err(LendingError::CapacityExceeded {
                    requested: loan.amount,
                    remaining: context.capacity.remaining_amount,
                });
            }
        }

        let next_status = if crossed {
            LoanStatus::Approved
        } else {
            LoanStatus::Pending
        };

        let sql = format!(
            r#"
            UPDATE loans
            SET {column} = $2, approval_count = $3, status = $4, updated_at = NOW()
            WHERE id = $1 AND approval_count = $5 AND status = 'pending'
            RETURNING *
            "#
        );
        let updated = sqlx::query_as::<_, Loan>(&sql)
            .bind(loan.id)
            .bind(approver.user_id)
            .bind(next_count)
            .bind(next_status)
            .bind(loan.approval_count)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                LendingError::invalid_transition(format!(
                    "loan {} changed during approval",
                    loan.id
                ))
            })?;

        audit::record(
            &mut *tx,
            AuditEntry {
                tenant_id: updated.tenant_id,
                loan_id: updated.id,
                payout_id: None,
                action: if crossed {
                    AuditAction::LoanFullyApproved
                } else {
                    AuditAction::LoanApproved
                },
                actor: approver.user_id.to_string(),
                details: json!({
                    "approval_count": next_count,
                    "approval_steps": required,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %updated.id,
            approver_id = %approver.user_id,
            approvals = next_count,
            required = required,
            "Loan approval recorded"
        );

        Ok((updated, crossed))
    }

    pub async fn reject(
        &self,
        approver: &Identity,
        loan_id: Uuid,
        reason: String,
    ) -> Result<Loan, LendingError> {
        let mut tx = self.db_pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| LendingError::not_found(format!("loan {}", loan_id)))?;

        loan.ensure_visible_to(approver)?;

        if !loan.status.can_transition_to(LoanStatus::Rejected) {
            return Err(LendingError::invalid_transition(format!(
                "loan {} cannot be rejected from {:?}",
                loan.id, loan.status
            )));
        }

        let rejected = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = 'rejected', rejected_by_id = $2, rejection_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(approver.user_id)
        .bind(&reason)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            AuditEntry {
                tenant_id: rejected.tenant_id,
                loan_id: rejected.id,
                payout_id: None,
                action: AuditAction::LoanRejected,
                actor: approver.user_id.to_string(),
                details: json!({ "reason": reason }),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %rejected.id,
            approver_id = %approver.user_id,
            "Loan rejected"
        );

        Ok(rejected)
    }

    pub async fn get_loan(&self, actor: &Identity, loan_id: Uuid) -> Result<Loan, LendingError> {
        let loan = self.fetch_loan(loan_id).await?;
        loan.ensure_visible_to(actor)?;
        Ok(loan)
    }

    /// List loans in the caller's tenant, narrowed to their organization when scoped
    pub async fn list_loans(
        &self,
        actor: &Identity,
        query: &ListLoansQuery,
    ) -> Result<Vec<Loan>, LendingError> {
        let (limit, offset) = PageQuery {
            page: query.page,
            limit: query.limit,
        }
        .limit_offset();

        let organization_id = actor.organization_id.or(query.organization_id);

        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR organization_id = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
              AND ($4::loan_status IS NULL OR status = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(actor.tenant_id)
        .bind(organization_id)
        .bind(query.user_id)
        .bind(query.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(loans)
    }

    pub async fn audit_trail(
        &self,
        actor: &Identity,
        loan_id: Uuid,
    ) -> Result<Vec<LoanAuditLog>, LendingError> {
        self.get_loan(actor, loan_id).await?;
        Ok(audit::list_for_loan(&self.db_pool, loan_id).await?)
    }

    async fn fetch_loan(&self, loan_id: Uuid) -> Result<Loan, LendingError> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(loan_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| LendingError::not_found(format!("loan {}", loan_id)))
    }
}

/// Payouts move whole currency units only
fn validate_amount(amount: Decimal) -> Result<(), LendingError> {
    if amount <= Decimal::ZERO {
        return Err(LendingError::Validation(
            "amount must be positive".to_string(),
        ));
    }
    if !amount.fract().is_zero() {
        return Err(LendingError::Validation(
            "amount must be a whole number of currency units".to_string(),
        ));
    }
    Ok(())
}
