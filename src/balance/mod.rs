//! Balance ledger module
//!
//! Parses provider account-balance results and records snapshots operators use
//! to cross-check unconfirmed disbursements.

mod model;
mod parser;
mod service;

pub use model::*;
pub use parser::{
    balances_from_result, parse_account_balance, parse_segments, AccountBalances, AccountSegment,
    BalanceParseError, ACCOUNT_BALANCE_KEY,
};
pub use service::BalanceService;
