//! Role capability table
//!
//! Every grant is an explicit `(role, resource, action)` triple. Anything not
//! listed is denied.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Roles issued by the identity service
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Employee,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Manager, Role::Employee];

    /// Parse the role claim carried in access tokens
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "super-admin" => Some(Role::SuperAdmin),
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Loan,
    Payout,
    Capacity,
    Balance,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Approve,
    Reject,
    Disburse,
}

use Action::*;
use Resource::*;
use Role::*;

const CAPABILITIES: &[(Role, Resource, Action)] = &[
    (SuperAdmin, Loan, Read),
    (SuperAdmin, Loan, Approve),
    (SuperAdmin, Loan, Reject),
    (SuperAdmin, Payout, Read),
    (SuperAdmin, Payout, Disburse),
    (SuperAdmin, Balance, Create),
    (SuperAdmin, Balance, Read),
    (SuperAdmin, Capacity, Read),
    (Admin, Loan, Read),
    (Admin, Loan, Approve),
    (Admin, Loan, Reject),
    (Admin, Payout, Read),
    (Admin, Payout, Disburse),
    (Admin, Balance, Create),
    (Admin, Balance, Read),
    (Admin, Capacity, Read),
    (Manager, Loan, Read),
    (Manager, Loan, Approve),
    (Manager, Loan, Reject),
    (Manager, Payout, Read),
    (Manager, Capacity, Read),
    (Employee, Loan, Create),
    (Employee, Loan, Read),
    (Employee, Capacity, Read),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Duplicate capability grant: {0:?}")]
    Duplicate((Role, Resource, Action)),

    #[error("Role {0:?} has no capabilities")]
    RoleWithoutGrants(Role),
}

/// Pure capability lookup
pub fn has_permission(role: Role, resource: Resource, action: Action) -> bool {
    CAPABILITIES.contains(&(role, resource, action))
}

/// Checked once at startup
pub fn validate_capability_table() -> Result<(), CapabilityError> {
    validate(CAPABILITIES)
}

fn validate(table: &[(Role, Resource, Action)]) -> Result<(), CapabilityError> {
    let mut seen = HashSet::new();
    for grant in table {
        if !seen.insert(*grant) {
            return Err(CapabilityError::Duplicate(*grant));
        }
    }

    for role in Role::ALL {
        if !table.iter().any(|(r, _, _)| *r == role) {
            return Err(CapabilityError::RoleWithoutGrants(role));
        }
    }

    Ok(())
}
