//! Borrow capacity guard

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::model::BorrowCapacity;
use crate::error::LendingError;
use crate::models::{Employee, Organization};

/// Employee, organization, and capacity as read in one pass
#[derive(Debug, Clone)]
pub struct CapacityContext {
    pub employee: Employee,
    pub organization: Organization,
    pub capacity: BorrowCapacity,
}

/// Decides whether a borrower may take a new loan this month
#[derive(Clone)]
pub struct CapacityGuard {
    db_pool: PgPool,
}

impl CapacityGuard {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn compute(&self, user_id: Uuid) -> Result<BorrowCapacity, LendingError> {
        let mut conn = self.db_pool.acquire().await?;
        let context = load_capacity(&mut conn, user_id, false, Utc::now()).await?;
        Ok(context.capacity)
    }
}

/// Read the borrower's capacity on `conn`.
///
/// With `lock_employee` the employee row is held `FOR UPDATE` until the
/// surrounding transaction ends, serializing concurrent re-checks for the
/// same borrower.
pub(crate) async fn load_capacity(
    conn: &mut PgConnection,
    user_id: Uuid,
    lock_employee: bool,
    now: DateTime<Utc>,
) -> Result<CapacityContext, LendingError> {
    let employee_sql = if lock_employee {
        "SELECT * FROM employees WHERE user_id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM employees WHERE user_id = $1"
    };

    let employee = sqlx::query_as::<_, Employee>(employee_sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(LendingError::NotLinked(user_id))?;

    let organization = sqlx::query_as::<_, Organization>(
        "SELECT * FROM organizations WHERE id = $1",
    )
    .bind(employee.organization_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| LendingError::not_found(format!("organization {}", employee.organization_id)))?;

    let (start, end) = month_bounds(now).ok_or_else(|| {
        LendingError::Validation(format!("cannot compute month window for {}", now))
    })?;

    let borrowed: Decimal = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM loans
        WHERE user_id = $1
          AND status IN ('approved', 'disbursement_pending', 'disbursed')
          AND created_at BETWEEN $2 AND $3
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_one(&mut *conn)
    .await?;

    let capacity = BorrowCapacity::from_parts(
        employee.gross_salary,
        organization.loan_limit_multiplier,
        borrowed,
    );

    tracing::debug!(
        user_id = %user_id,
        borrowed = %borrowed,
        remaining = %capacity.remaining_amount,
        "Borrow capacity computed"
    );

    Ok(CapacityContext {
        employee,
        organization,
        capacity,
    })
}

/// First and last instant of the UTC calendar month containing `now`
pub fn month_bounds(now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()?;
    let next_start = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()?;

    Some((start, next_start - Duration::milliseconds(1)))
}
