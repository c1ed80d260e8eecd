//! Loan module
//!
//! Borrow capacity, the approval state machine, and loan queries.

mod capacity;
mod model;
mod service;

pub use capacity::{month_bounds, CapacityContext, CapacityGuard};
pub use model::*;
pub use service::LoanService;
