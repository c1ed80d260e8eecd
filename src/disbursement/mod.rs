//! Disbursement module
//!
//! Sends approved loans to the payment provider and reconciles the
//! asynchronous result and timeout callbacks.

mod model;
mod reconciler;
mod service;

pub use model::*;
pub use reconciler::CallbackReconciler;
pub use service::DisbursementService;
