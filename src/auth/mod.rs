/// Authentication core
///
/// Credential hashing, token signing/verification, the refresh-token store,
/// and the session orchestrator that composes them.

mod claims;
mod codec;
mod password;
mod service;
mod store;

pub use claims::{AccessClaims, RefreshClaims, TokenKind};
pub use codec::{
    extract_bearer, parse_lifetime, TokenCodec, DEFAULT_ACCESS_LIFETIME_SECONDS,
    DEFAULT_REFRESH_LIFETIME_SECONDS,
};
pub use password::{
    generate_random_password, hash_password, validate_password_strength, verify_password,
    PasswordCheck,
};
pub use service::{AuthService, AuthenticatedUser, LoginOutcome, RefreshOutcome};
pub use store::{InMemoryTokenStore, PgTokenStore, RefreshTokenRecord, TokenStore};
