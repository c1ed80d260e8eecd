//! Loan models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Identity;
use crate::disbursement::DisbursementResult;
use crate::error::LendingError;

/// Loan lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Pending,
    Approved,
    DisbursementPending,
    Disbursed,
    Rejected,
    DisbursementFailed,
}

impl LoanStatus {
    /// Edges of the loan state machine.
    ///
    /// `DisbursementPending -> Approved` is taken only when the outbound
    /// payment request fails synchronously; `DisbursementFailed ->
    /// DisbursementPending` is an operator retry.
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, DisbursementPending)
                | (DisbursementPending, Disbursed)
                | (DisbursementPending, DisbursementFailed)
                | (DisbursementPending, Approved)
                | (DisbursementFailed, DisbursementPending)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Loan {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    /// Monthly percentage copied from the organization at request time
    pub interest_rate: Decimal,
    pub duration_months: i32,
    pub due_date: DateTime<Utc>,
    pub total_repayable: Decimal,
    pub status: LoanStatus,
    pub approval_count: i32,
    pub first_approver_id: Option<Uuid>,
    pub second_approver_id: Option<Uuid>,
    pub third_approver_id: Option<Uuid>,
    pub rejected_by_id: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub provider_transaction_id: Option<String>,
    pub provider_status: Option<String>,
    pub originator_conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn approvers(&self) -> impl Iterator<Item = Uuid> + '_ {
        [
            self.first_approver_id,
            self.second_approver_id,
            self.third_approver_id,
        ]
        .into_iter()
        .flatten()
    }

    pub fn has_approved(&self, approver_id: Uuid) -> bool {
        self.approvers().any(|id| id == approver_id)
    }

    /// Loans outside the caller's tenant are reported as missing; loans of
    /// another organization in the same tenant are forbidden.
    pub fn ensure_visible_to(&self, actor: &Identity) -> Result<(), LendingError> {
        if self.tenant_id != actor.tenant_id {
            return Err(LendingError::not_found(format!("loan {}", self.id)));
        }
        match actor.organization_id {
            Some(org) if org != self.organization_id => Err(LendingError::Forbidden(format!(
                "loan {} belongs to another organization",
                self.id
            ))),
            _ => Ok(()),
        }
    }
}

/// Column holding the approver for the given zero-based approval index
pub(crate) fn approver_column(index: i32) -> Option<&'static str> {
    match index {
        0 => Some("first_approver_id"),
        1 => Some("second_approver_id"),
        2 => Some("third_approver_id"),
        _ => None,
    }
}

/// Flat-rate repayment: `amount * (1 + rate/100 * months)`, rounded to cents
pub fn total_repayable(amount: Decimal, monthly_rate_percent: Decimal, months: i32) -> Decimal {
    let interest = amount * monthly_rate_percent / Decimal::ONE_HUNDRED * Decimal::from(months);
    (amount + interest).round_dp(2)
}

/// Borrower's remaining allowance for the current month
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct BorrowCapacity {
    pub can_borrow: bool,
    pub remaining_amount: Decimal,
    pub max_loan_amount: Decimal,
}

impl BorrowCapacity {
    pub fn from_parts(gross_salary: Decimal, multiplier: Decimal, borrowed: Decimal) -> Self {
        let max_loan_amount = (gross_salary * multiplier).max(Decimal::ZERO).round_dp(2);
        let remaining_amount = (max_loan_amount - borrowed).max(Decimal::ZERO);
        Self {
            can_borrow: remaining_amount > Decimal::ZERO,
            remaining_amount,
            max_loan_amount,
        }
    }

    pub fn allows(&self, amount: Decimal) -> bool {
        self.can_borrow && amount <= self.remaining_amount
    }
}

/// Request body for `POST /api/loans`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    pub amount: Decimal,
    #[validate(range(min = 1, max = 12))]
    pub duration_months: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectLoanRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListLoansQuery {
    pub status: Option<LoanStatus>,
    pub user_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Result of an approval; `handed_off` is set on the approval that completed the quorum
#[derive(Debug, Serialize, Clone)]
pub struct ApprovalOutcome {
    pub loan: Loan,
    pub handed_off: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursement: Option<DisbursementResult>,
    /// Set when the hand-off could not reach the provider; the loan stays APPROVED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursement_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Approved));
        assert!(LoanStatus::Approved.can_transition_to(LoanStatus::DisbursementPending));
        assert!(LoanStatus::DisbursementPending.can_transition_to(LoanStatus::Disbursed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let all = [
            LoanStatus::Pending,
            LoanStatus::Approved,
            LoanStatus::DisbursementPending,
            LoanStatus::Disbursed,
            LoanStatus::Rejected,
            LoanStatus::DisbursementFailed,
        ];
        for next in all {
            assert!(!LoanStatus::Disbursed.can_transition_to(next));
            assert!(!LoanStatus::Rejected.can_transition_to(next));
        }
    }

    #[test]
    fn test_rejection_only_from_pending() {
        assert!(!LoanStatus::Approved.can_transition_to(LoanStatus::Rejected));
        assert!(!LoanStatus::DisbursementPending.can_transition_to(LoanStatus::Rejected));
    }

    #[test]
    fn test_disbursed_only_through_pending_disbursement() {
        assert!(!LoanStatus::Approved.can_transition_to(LoanStatus::Disbursed));
        assert!(!LoanStatus::DisbursementFailed.can_transition_to(LoanStatus::Disbursed));
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&LoanStatus::DisbursementPending).unwrap();
        assert_eq!(json, "\"DISBURSEMENT_PENDING\"");
    }

    #[test]
    fn test_capacity_example() {
        let salary = Decimal::new(50_000, 0);
        let multiplier = Decimal::new(5, 1);

        let fresh = BorrowCapacity::from_parts(salary, multiplier, Decimal::ZERO);
        assert_eq!(fresh.max_loan_amount, Decimal::new(25_000, 0));
        assert_eq!(fresh.remaining_amount, Decimal::new(25_000, 0));
        assert!(fresh.can_borrow);

        let after_one = BorrowCapacity::from_parts(salary, multiplier, Decimal::new(10_000, 0));
        assert_eq!(after_one.remaining_amount, Decimal::new(15_000, 0));
        assert!(after_one.can_borrow);

        let exhausted = BorrowCapacity::from_parts(salary, multiplier, Decimal::new(25_000, 0));
        assert_eq!(exhausted.remaining_amount, Decimal::ZERO);
        assert!(!exhausted.can_borrow);
    }

    #[test]
    fn test_remaining_clamped_at_zero() {
        let capacity = BorrowCapacity::from_parts(
            Decimal::new(10_000, 0),
            Decimal::new(5, 1),
            Decimal::new(8_000, 0),
        );
        assert_eq!(capacity.remaining_amount, Decimal::ZERO);
        assert!(!capacity.allows(Decimal::ONE));
    }

    #[test]
    fn test_allows_up_to_remaining() {
        let capacity = BorrowCapacity::from_parts(
            Decimal::new(50_000, 0),
            Decimal::new(5, 1),
            Decimal::new(10_000, 0),
        );
        assert!(capacity.allows(Decimal::new(15_000, 0)));
        assert!(!capacity.allows(Decimal::new(15_001, 0)));
    }

    #[test]
    fn test_total_repayable() {
        // 10,000 at 5% a month over 2 months
        let total = total_repayable(Decimal::new(10_000, 0), Decimal::new(5, 0), 2);
        assert_eq!(total, Decimal::new(11_000, 0));

        let zero_rate = total_repayable(Decimal::new(7_500, 0), Decimal::ZERO, 3);
        assert_eq!(zero_rate, Decimal::new(7_500, 0));
    }

    #[test]
    fn test_approver_columns() {
        assert_eq!(approver_column(0), Some("first_approver_id"));
        assert_eq!(approver_column(2), Some("third_approver_id"));
        assert_eq!(approver_column(3), None);
    }

    fn sample_loan(tenant_id: Uuid, organization_id: Uuid) -> Loan {
        let now = Utc::now();
        Loan {
            id: Uuid::new_v4(),
            tenant_id,
            organization_id,
            user_id: Uuid::new_v4(),
            amount: Decimal::new(5_000, 0),
            interest_rate: Decimal::new(5, 0),
            duration_months: 1,
            due_date: now,
            total_repayable: Decimal::new(5_250, 0),
            status: LoanStatus::Pending,
            approval_count: 1,
            first_approver_id: Some(Uuid::new_v4()),
            second_approver_id: None,
            third_approver_id: None,
            rejected_by_id: None,
            rejection_reason: None,
            disbursed_at: None,
            provider_transaction_id: None,
            provider_status: None,
            originator_conversation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn actor(tenant_id: Uuid, organization_id: Option<Uuid>) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            tenant_id,
            organization_id,
            role: crate::auth::Role::Manager,
        }
    }

    #[test]
    fn test_has_approved() {
        let loan = sample_loan(Uuid::new_v4(), Uuid::new_v4());
        let approver = loan.first_approver_id.unwrap();
        assert!(loan.has_approved(approver));
        assert!(!loan.has_approved(Uuid::new_v4()));
        assert_eq!(loan.approvers().count(), 1);
    }

    #[test]
    fn test_visibility_scoping() {
        let tenant = Uuid::new_v4();
        let org = Uuid::new_v4();
        let loan = sample_loan(tenant, org);

        assert!(loan.ensure_visible_to(&actor(tenant, None)).is_ok());
        assert!(loan.ensure_visible_to(&actor(tenant, Some(org))).is_ok());
        assert!(matches!(
            loan.ensure_visible_to(&actor(tenant, Some(Uuid::new_v4()))),
            Err(LendingError::Forbidden(_))
        ));
        assert!(matches!(
            loan.ensure_visible_to(&actor(Uuid::new_v4(), None)),
            Err(LendingError::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreateLoanRequest {
            amount: Decimal::new(1_000, 0),
            duration_months: 1,
        };
        assert!(ok.validate().is_ok());

        let too_long = CreateLoanRequest {
            amount: Decimal::new(1_000, 0),
            duration_months: 13,
        };
        assert!(too_long.validate().is_err());
    }
}
