//! Loan route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::loan;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/capacity/me", get(loan::get_my_capacity))
        .route("/api/loans", get(loan::list_loans).post(loan::create_loan))
        .route("/api/loans/:id", get(loan::get_loan))
        .route("/api/loans/:id/approve", post(loan::approve_loan))
        .route("/api/loans/:id/reject", post(loan::reject_loan))
        .route("/api/loans/:id/disburse", post(loan::disburse_loan))
        .route("/api/loans/:id/payouts", get(loan::list_loan_payouts))
        .route("/api/loans/:id/audit", get(loan::get_loan_audit))
        .route("/api/payouts/unconfirmed", get(loan::list_unconfirmed_payouts))
}
