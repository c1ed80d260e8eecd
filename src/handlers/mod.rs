//! API handlers

pub mod balance;
pub mod callback;
pub mod health;
pub mod loan;

pub use balance::*;
pub use health::health_check;
pub use loan::*;
