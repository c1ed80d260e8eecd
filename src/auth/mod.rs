//! Authorization for the lending API
//!
//! - Verification of access tokens issued by the identity service
//! - The role capability table

mod jwt;
mod permissions;

pub use jwt::{Claims, Identity, JwtError, TokenVerifier};
pub use permissions::{
    has_permission, validate_capability_table, Action, CapabilityError, Resource, Role,
};

#[cfg(test)]
pub(crate) use jwt::tests as token_fixtures;
