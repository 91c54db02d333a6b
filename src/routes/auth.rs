/// Authentication Routes
///
/// Thin HTTP handlers over the session orchestrator: login, token refresh,
/// logout, current user, password change, and session revocation.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, AuthenticatedUser};
use crate::error::AppError;

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email or username; normalized before lookup.
    pub identifier: String,
    pub password: String,
}

/// Request carrying a refresh token (refresh and logout)
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Password change request
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct RevocationResponse {
    pub revoked_sessions: u64,
}

/// POST /auth/login
///
/// Authenticate with email-or-username and password; returns the token pair
/// and sanitized profile.
///
/// # Errors
/// - 401: Invalid credentials (unknown identity or wrong password,
///   deliberately indistinguishable)
/// - 403: Account deactivated
/// - 503: Session store unavailable (retryable)
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let outcome = service.login(&form.identifier, &form.password).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a fresh access token. The refresh token
/// itself is not rotated and stays valid until logout, revocation, or
/// expiry.
///
/// # Errors
/// - 401: Invalid, expired, or revoked refresh token (uniform rejection)
/// - 403: Associated account deactivated
/// - 503: Session store unavailable (retryable, re-login not required)
pub async fn refresh(
    form: web::Json<RefreshTokenRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let outcome = service.refresh(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(TokenRefreshResponse {
        access_token: outcome.access_token,
        token_type: "Bearer".to_string(),
        expires_in: outcome.expires_in,
    }))
}

/// POST /auth/logout
///
/// Terminate the session behind a refresh token. Logging out an
/// already-expired session succeeds; a token that was never issued is 401.
pub async fn logout(
    form: web::Json<RefreshTokenRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service.logout(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// GET /auth/me
///
/// Current authenticated user's sanitized profile. Identity is injected by
/// the bearer middleware.
pub async fn get_current_user(
    user: web::ReqData<AuthenticatedUser>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let profile = service.get_current_user(user.user.id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// POST /auth/change-password
///
/// Verify the current password, persist the new one, and revoke every
/// outstanding session for the account.
///
/// # Errors
/// - 400: New password fails strength rules (all violations listed)
/// - 401: Current password wrong
/// - 503: Revocation sweep failed after the password committed; retry
pub async fn change_password(
    user: web::ReqData<AuthenticatedUser>,
    form: web::Json<ChangePasswordRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    service
        .change_password(user.user.id, &form.current_password, &form.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Password changed; all sessions revoked".to_string(),
    }))
}

/// POST /auth/revoke-all
///
/// Revoke every outstanding session for the authenticated account.
/// Standalone counterpart of the tail of change-password, for incident
/// response.
pub async fn revoke_all_sessions(
    user: web::ReqData<AuthenticatedUser>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let revoked = service.revoke_all_sessions(user.user.id).await?;
    Ok(HttpResponse::Ok().json(RevocationResponse {
        revoked_sessions: revoked,
    }))
}
