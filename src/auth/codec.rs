/// Token Codec
///
/// Signs and verifies the two token kinds (HS256). The signing secret is
/// injected at construction and immutable afterwards; rotating keys means
/// constructing a new codec. Verification enforces signature, issuer,
/// audience, expiry, and the kind discriminator, with expiry and wrong-kind
/// failures reported as distinct conditions.

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use crate::accounts::Account;
use crate::auth::claims::{AccessClaims, RefreshClaims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Fallback access lifetime when the configured string is unparseable: 15m.
pub const DEFAULT_ACCESS_LIFETIME_SECONDS: i64 = 900;
/// Fallback refresh lifetime when the configured string is unparseable: 7d.
pub const DEFAULT_REFRESH_LIFETIME_SECONDS: i64 = 604_800;

pub struct TokenCodec {
    settings: JwtSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    pub fn new(settings: JwtSettings) -> Self {
        let encoding_key = EncodingKey::from_secret(settings.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(settings.secret.as_bytes());
        Self {
            settings,
            encoding_key,
            decoding_key,
        }
    }

    pub fn access_lifetime_seconds(&self) -> i64 {
        parse_lifetime(
            &self.settings.access_token_lifetime,
            DEFAULT_ACCESS_LIFETIME_SECONDS,
        )
    }

    pub fn refresh_lifetime_seconds(&self) -> i64 {
        parse_lifetime(
            &self.settings.refresh_token_lifetime,
            DEFAULT_REFRESH_LIFETIME_SECONDS,
        )
    }

    /// Sign a new access token for an account.
    pub fn sign_access(&self, account: &Account) -> Result<String, AppError> {
        let claims = AccessClaims::new(
            account.id,
            account.email.clone(),
            account.roles.clone(),
            self.access_lifetime_seconds(),
            self.settings.issuer.clone(),
            self.settings.audience.clone(),
        );

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Sign a new refresh token with a fresh random identifier.
    ///
    /// Returns the claims alongside the token so the caller can persist the
    /// paired store record under the same jti and expiry.
    pub fn sign_refresh(&self) -> Result<(String, RefreshClaims), AppError> {
        let claims = RefreshClaims::new(
            self.refresh_lifetime_seconds(),
            self.settings.issuer.clone(),
            self.settings.audience.clone(),
        );

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok((token, claims))
    }

    /// Validate an access token and extract its claims.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verify_kind(token, TokenKind::Access)
    }

    /// Validate a refresh token and extract its claims.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.verify_kind(token, TokenKind::Refresh)
    }

    /// Decode, validate registered claims, then check the discriminator
    /// before deserializing into the kind-specific claim struct. The kind
    /// check must happen on the raw payload: deserializing an access token
    /// straight into RefreshClaims would fail on field shape and mask the
    /// wrong-kind condition as a generic invalid token.
    fn verify_kind<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Result<T, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.settings.issuer]);
        validation.set_audience(&[&self.settings.audience]);
        validation.leeway = 0;

        let data =
            decode::<serde_json::Value>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => {
                        tracing::warn!("Token validation error: {}", e);
                        AuthError::InvalidToken
                    }
                }
            })?;

        let kind: TokenKind = data
            .claims
            .get("kind")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or(AuthError::InvalidToken)?;

        if kind != expected {
            return Err(AuthError::WrongTokenKind);
        }

        serde_json::from_value(data.claims).map_err(|_| AuthError::InvalidToken)
    }
}

/// Parse an `Authorization` header of the form `Bearer <token>`.
///
/// Tolerant of surrounding whitespace; any other shape yields `None` and the
/// decision to reject stays with the caller.
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    let token = header_value.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Parse a human-authored lifetime string ("30s", "15m", "1h", "7d", or a
/// bare number of seconds) into seconds. Unrecognized or non-positive input
/// falls back to the given default rather than failing.
pub fn parse_lifetime(value: &str, default_seconds: i64) -> i64 {
    let trimmed = value.trim();

    let (number, multiplier) = match trimmed.chars().last() {
        Some('s') => (&trimmed[..trimmed.len() - 1], 1),
        Some('m') => (&trimmed[..trimmed.len() - 1], 60),
        Some('h') => (&trimmed[..trimmed.len() - 1], 3600),
        Some('d') => (&trimmed[..trimmed.len() - 1], 86400),
        Some(c) if c.is_ascii_digit() => (trimmed, 1),
        _ => return default_seconds,
    };

    match number.parse::<i64>() {
        Ok(n) if n > 0 => n.checked_mul(multiplier).unwrap_or(default_seconds),
        _ => default_seconds,
    }
}
