//! Access token verification
//!
//! Tokens are minted by the identity service; this crate only checks them.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::permissions::Role;

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Tenant the user belongs to
    pub tenant_id: String,
    /// Organization scope, absent for tenant-wide roles
    #[serde(default)]
    pub organization_id: Option<String>,
    /// User role
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Caller identity carried by a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub role: Role,
}

impl TryFrom<Claims> for Identity {
    type Error = JwtError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = parse_uuid(&claims.sub, "sub")?;
        let tenant_id = parse_uuid(&claims.tenant_id, "tenant_id")?;
        let organization_id = claims
            .organization_id
            .as_deref()
            .map(|id| parse_uuid(id, "organization_id"))
            .transpose()?;
        let role = Role::parse(&claims.role)
            .ok_or_else(|| JwtError::InvalidToken(format!("unknown role '{}'", claims.role)))?;

        Ok(Identity {
            user_id,
            tenant_id,
            organization_id,
            role,
        })
    }
}

fn parse_uuid(value: &str, claim: &str) -> Result<Uuid, JwtError> {
    Uuid::parse_str(value).map_err(|e| JwtError::InvalidToken(format!("{}: {}", claim, e)))
}

/// Verifies HS256 access tokens with the secret shared with the identity service
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify a token and resolve the caller identity
    pub fn verify(&self, token: &str) -> Result<Identity, JwtError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
            _ => JwtError::DecodingFailed(e.to_string()),
        })?;

        Identity::try_from(token_data.claims)
    }
}
