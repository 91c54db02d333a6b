/// Unified Error Handling Module
///
/// Provides the error taxonomy for the authentication core:
/// 1. Domain-specific error types (auth, store, validation, config)
/// 2. A unified AppError for control flow
/// 3. HTTP response mapping with stable machine-readable codes
/// 4. Structured error logging with context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    WeakPassword(Vec<&'static str>),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::WeakPassword(violations) => {
                write!(f, "password is too weak: {}", violations.join("; "))
            }
        }
    }
}

impl StdError for ValidationError {}

/// Authentication and token lifecycle errors
///
/// InvalidCredentials deliberately covers both "unknown account" and
/// "wrong password" so callers cannot enumerate accounts. TokenExpired and
/// WrongTokenKind are distinguished here for audit logging; the HTTP layer
/// collapses them into the generic token-invalid response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    AccountInactive,
    InvalidToken,
    TokenExpired,
    WrongTokenKind,
    MissingToken,
    AccountNotFound,
    EmailInUse,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::AccountInactive => write!(f, "Account is inactive"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::WrongTokenKind => write!(f, "Wrong token kind"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::AccountNotFound => write!(f, "Account not found"),
            AuthError::EmailInUse => write!(f, "Email already in use"),
        }
    }
}

impl StdError for AuthError {}

/// Token store / account store infrastructure errors
///
/// Always a transient category: a store failure is retryable and must never
/// be interpreted as an authorization decision.
#[derive(Debug, Clone)]
pub enum StoreError {
    Unavailable(String),
    Query(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            StoreError::Query(msg) => write!(f, "Store query error: {}", msg),
        }
    }
}

impl StdError for StoreError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Store(StoreError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl AppError {
    /// True when the failure is transient infrastructure trouble a caller
    /// may retry without re-prompting the user.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Store(_))
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => {
                let msg = err.to_string();
                if msg.contains("pool") || msg.contains("connect") || msg.contains("timed out") {
                    StoreError::Unavailable(msg)
                } else {
                    StoreError::Query(msg)
                }
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("duplicate key") || msg.contains("unique constraint") {
            AppError::Auth(AuthError::EmailInUse)
        } else {
            AppError::Store(StoreError::from(err))
        }
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Stable code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR".to_string(),
                e.to_string(),
            ),

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS".to_string(),
                    "Invalid credentials".to_string(),
                ),
                // Expired and wrong-kind collapse to the generic token code:
                // callers only need to know the token is unusable.
                AuthError::InvalidToken
                | AuthError::TokenExpired
                | AuthError::WrongTokenKind => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID".to_string(),
                    "Invalid or expired token".to_string(),
                ),
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN".to_string(),
                    "Missing authentication token".to_string(),
                ),
                AuthError::AccountInactive => (
                    StatusCode::FORBIDDEN,
                    "ACCOUNT_INACTIVE".to_string(),
                    "Account is inactive".to_string(),
                ),
                AuthError::AccountNotFound => (
                    StatusCode::NOT_FOUND,
                    "ACCOUNT_NOT_FOUND".to_string(),
                    "Account not found".to_string(),
                ),
                AuthError::EmailInUse => (
                    StatusCode::CONFLICT,
                    "EMAIL_IN_USE".to_string(),
                    "Email already in use".to_string(),
                ),
            },

            // Store errors -> 503: retryable, never an authorization denial
            AppError::Store(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE".to_string(),
                "Session store temporarily unavailable".to_string(),
            ),

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR".to_string(),
                "Server configuration error".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                "Internal server error".to_string(),
            ),
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code,
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(
                    request_id = request_id,
                    error = %e,
                    "Validation error"
                );
            }
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => {
                    tracing::warn!(
                        request_id = request_id,
                        error = %e,
                        "Invalid credentials attempt"
                    );
                }
                AuthError::TokenExpired => {
                    tracing::info!(
                        request_id = request_id,
                        error = %e,
                        "Expired token presented"
                    );
                }
                AuthError::WrongTokenKind => {
                    tracing::warn!(
                        request_id = request_id,
                        error = %e,
                        "Token presented with wrong discriminator"
                    );
                }
                _ => {
                    tracing::warn!(
                        request_id = request_id,
                        error = %e,
                        "Authentication error"
                    );
                }
            },
            AppError::Store(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Session store error"
                );
            }
            AppError::Config(e) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    "Configuration error"
                );
            }
            AppError::Internal(msg) => {
                tracing::error!(
                    request_id = request_id,
                    error = %msg,
                    "Internal error"
                );
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(e) => match e {
                AuthError::AccountInactive => StatusCode::FORBIDDEN,
                AuthError::AccountNotFound => StatusCode::NOT_FOUND,
                AuthError::EmailInUse => StatusCode::CONFLICT,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
