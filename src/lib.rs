//! Salary-advance lending core
//!
//! Borrow capacity, multi-step loan approval, mobile-money disbursement,
//! provider callback reconciliation, and account-balance snapshots.

pub mod audit;
pub mod auth;
pub mod balance;
pub mod config;
pub mod db;
pub mod disbursement;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod routes;
pub mod scheduler;
pub mod state;
