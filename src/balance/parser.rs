//! Parser for the provider's `AccountBalance` result parameter
//!
//! The value looks like
//! `Working Account|KES|0|1234.50|999999&Utility Account|KES|0|200.00|999999`:
//! `&` separates accounts, `|` separates `LABEL|CURRENCY|MIN|VALUE|MAX`.

use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

use crate::provider::ResultPayload;

/// Result parameter key carrying the balance string
pub const ACCOUNT_BALANCE_KEY: &str = "AccountBalance";

const SEGMENT_SEPARATOR: char = '&';
const FIELD_SEPARATOR: char = '|';
const MIN_FIELDS: usize = 4;
const VALUE_FIELD: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceParseError {
    #[error("result has no AccountBalance parameter")]
    MissingKey,

    #[error("AccountBalance value is not a string")]
    NotAString,

    #[error("expected working and utility account segments, found {0}")]
    MissingSegment(usize),

    #[error("segment {index} has {fields} fields, expected at least 4")]
    TooFewFields { index: usize, fields: usize },

    #[error("segment {index} balance '{value}' is not a number")]
    InvalidAmount { index: usize, value: String },
}

/// One `LABEL|CURRENCY|MIN|VALUE|MAX` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSegment {
    pub label: String,
    pub currency: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountBalances {
    pub working_account_balance: Decimal,
    pub utility_account_balance: Decimal,
}

/// Split the balance string into account segments
pub fn parse_segments(raw: &str) -> Result<Vec<AccountSegment>, BalanceParseError> {
    raw.split(SEGMENT_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .enumerate()
        .map(|(index, segment)| {
            let fields: Vec<&str> = segment.split(FIELD_SEPARATOR).map(str::trim).collect();
            if fields.len() < MIN_FIELDS {
                return Err(BalanceParseError::TooFewFields {
                    index,
                    fields: fields.len(),
                });
            }

            let value = fields[VALUE_FIELD];
            let balance =
                Decimal::from_str(value).map_err(|_| BalanceParseError::InvalidAmount {
                    index,
                    value: value.to_string(),
                })?;

            Ok(AccountSegment {
                label: fields[0].to_string(),
                currency: fields[1].to_string(),
                balance,
            })
        })
        .collect()
}

/// First segment is the Working Account, second the Utility Account
pub fn parse_account_balance(raw: &str) -> Result<AccountBalances, BalanceParseError> {
    let segments = parse_segments(raw)?;

    match segments.as_slice() {
        [working, utility, ..] => Ok(AccountBalances {
            working_account_balance: working.balance,
            utility_account_balance: utility.balance,
        }),
        _ => Err(BalanceParseError::MissingSegment(segments.len())),
    }
}

/// Extract and parse the balance string from a result callback
pub fn balances_from_result(payload: &ResultPayload) -> Result<AccountBalances, BalanceParseError> {
    let value = payload
        .parameter(ACCOUNT_BALANCE_KEY)
        .ok_or(BalanceParseError::MissingKey)?;
    let raw = value.as_str().ok_or(BalanceParseError::NotAString)?;
    parse_account_balance(raw)
}
