/// Token claim structures
///
/// Access and refresh tokens carry disjoint claim sets, tied together only
/// by the shared `kind` discriminator that prevents one being presented
/// where the other is expected (RFC 7519 registered claims plus `kind`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Discriminator claim marking a token's kind
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims for short-lived access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    /// Subject (account ID as UUID string)
    pub sub: String,
    /// Account email
    pub email: String,
    /// Opaque role tags copied from the account record
    pub roles: Vec<String>,
    /// Token kind discriminator
    pub kind: TokenKind,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

impl AccessClaims {
    pub fn new(
        account_id: Uuid,
        email: String,
        roles: Vec<String>,
        expiry_seconds: i64,
        issuer: String,
        audience: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: account_id.to_string(),
            email,
            roles,
            kind: TokenKind::Access,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            aud: audience,
        }
    }

    /// Extract the account ID from the subject claim.
    ///
    /// # Errors
    /// Returns `InvalidToken` if the subject is not a valid UUID
    pub fn account_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)
    }

    pub fn is_expired(&self) -> bool {
        self.exp < chrono::Utc::now().timestamp()
    }
}

/// Claims for refresh tokens
///
/// Deliberately carries no account-identifying claims: ownership is
/// established only through the paired store record, so a leaked refresh
/// token cannot be decoded offline to reveal whose it is.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    /// Random unique token identifier, the store record key
    pub jti: String,
    /// Token kind discriminator
    pub kind: TokenKind,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

impl RefreshClaims {
    pub fn new(expiry_seconds: i64, issuer: String, audience: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            jti: Uuid::new_v4().to_string(),
            kind: TokenKind::Refresh,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            aud: audience,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp < chrono::Utc::now().timestamp()
    }
}
