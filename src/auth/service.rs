/// Session Orchestrator
///
/// The façade callers use: authenticates credentials, mints token pairs,
/// renews access tokens, logs out, and revokes sessions. Composes the
/// credential hasher, token codec, token store, and account repository.
///
/// Each refresh token moves through ISSUED -> (renewed any number of times)
/// -> {LOGGED_OUT | REVOKED | EXPIRED}. The terminal states all look the
/// same to callers (renewal fails) but are logged distinctly for audit.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::accounts::{AccountRepository, AccountUpdate, UserProfile};
use crate::auth::claims::AccessClaims;
use crate::auth::codec::TokenCodec;
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::auth::store::TokenStore;
use crate::configuration::{HashingSettings, JwtSettings};
use crate::error::{AppError, AuthError, ValidationError};

/// Successful login: token pair plus the sanitized profile.
#[derive(Debug, serde::Serialize)]
pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
    pub expires_in: i64,
}

/// Successful renewal: a fresh access token only. The refresh token and its
/// store record are left untouched (no rotation).
#[derive(Debug, serde::Serialize)]
pub struct RefreshOutcome {
    pub access_token: String,
    pub expires_in: i64,
}

/// A verified bearer identity: the token's claims plus the account as it
/// exists right now in storage.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: AccessClaims,
    pub user: UserProfile,
}

pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
    tokens: Arc<dyn TokenStore>,
    codec: TokenCodec,
    hashing: HashingSettings,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        tokens: Arc<dyn TokenStore>,
        jwt: JwtSettings,
        hashing: HashingSettings,
    ) -> Self {
        Self {
            accounts,
            tokens,
            codec: TokenCodec::new(jwt),
            hashing,
        }
    }

    /// Authenticate credentials and mint a token pair.
    ///
    /// An unknown identifier and a wrong password produce the identical
    /// `InvalidCredentials` error so the response never reveals whether the
    /// account exists. A correct password on a deactivated account is the
    /// distinct `AccountInactive`.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let account = self
            .accounts
            .find_by_email_or_username(identifier)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !account.is_active {
            tracing::warn!(user_id = %account.id, "Login attempt on deactivated account");
            return Err(AuthError::AccountInactive.into());
        }

        if !verify_password(password, &account.password_hash)? {
            tracing::warn!(user_id = %account.id, "Login attempt with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        self.accounts.update_last_login(account.id).await?;

        let access_token = self.codec.sign_access(&account)?;
        let (refresh_token, refresh_claims) = self.codec.sign_refresh()?;

        self.tokens
            .put(
                &refresh_claims.jti,
                account.id,
                timestamp_to_datetime(refresh_claims.exp)?,
            )
            .await?;

        tracing::info!(
            user_id = %account.id,
            jti = %refresh_claims.jti,
            "Session issued"
        );

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            user: UserProfile::from(&account),
            expires_in: self.codec.access_lifetime_seconds(),
        })
    }

    /// Renew an access token from a refresh token.
    ///
    /// Both representations must agree: the signature verifies AND a live,
    /// unrevoked store record exists under the token's jti. Every rejection
    /// reaches the caller as the uniform `InvalidToken` requiring re-login;
    /// the distinct terminal states are only logged.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, AppError> {
        let claims = self.codec.verify_refresh(refresh_token).map_err(|e| {
            match e {
                AuthError::TokenExpired => {
                    tracing::info!("Refresh rejected: signature expired");
                }
                ref other => {
                    tracing::warn!(error = %other, "Refresh rejected: token verification failed");
                }
            }
            AuthError::InvalidToken
        })?;

        let record = match self.tokens.get(&claims.jti).await? {
            None => {
                tracing::info!(jti = %claims.jti, "Refresh rejected: no outstanding record");
                return Err(AuthError::InvalidToken.into());
            }
            Some(record) => record,
        };

        if record.revoked {
            tracing::warn!(
                user_id = %record.user_id,
                jti = %claims.jti,
                "Refresh rejected: token revoked"
            );
            return Err(AuthError::InvalidToken.into());
        }

        if record.is_expired() {
            tracing::info!(
                user_id = %record.user_id,
                jti = %claims.jti,
                "Refresh rejected: record expired"
            );
            return Err(AuthError::InvalidToken.into());
        }

        let account = self
            .accounts
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !account.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        let access_token = self.codec.sign_access(&account)?;

        tracing::info!(user_id = %account.id, jti = %claims.jti, "Session renewed");

        Ok(RefreshOutcome {
            access_token,
            expires_in: self.codec.access_lifetime_seconds(),
        })
    }

    /// Terminate the session behind a refresh token.
    ///
    /// The record is removed even if it had already expired or been revoked;
    /// only a jti with no record at all is an error. Calling logout twice is
    /// therefore well-defined: success, then `InvalidToken`.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let claims = self
            .codec
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::InvalidToken)?;

        match self.tokens.delete(&claims.jti).await? {
            Some(record) => {
                tracing::info!(
                    user_id = %record.user_id,
                    jti = %claims.jti,
                    was_expired = record.is_expired(),
                    was_revoked = record.revoked,
                    "Session logged out"
                );
                Ok(())
            }
            None => {
                tracing::info!(jti = %claims.jti, "Logout for unknown refresh token");
                Err(AuthError::InvalidToken.into())
            }
        }
    }

    /// Fetch the sanitized profile for an account id.
    pub async fn get_current_user(&self, account_id: Uuid) -> Result<UserProfile, AppError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !account.is_active {
            return Err(AuthError::AccountInactive.into());
        }

        Ok(UserProfile::from(&account))
    }

    /// Change a password and force re-authentication everywhere.
    ///
    /// The revocation sweep runs unconditionally after the new hash is
    /// persisted. If the sweep fails the password change has still
    /// committed; the failure is surfaced so the caller can retry the
    /// revocation, never swallowed.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current: &str,
        new: &str,
    ) -> Result<(), AppError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !verify_password(current, &account.password_hash)? {
            tracing::warn!(user_id = %account_id, "Password change with wrong current password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let check = validate_password_strength(new);
        if !check.valid {
            return Err(ValidationError::WeakPassword(check.violations).into());
        }

        let password_hash = hash_password(new, self.hashing.cost)?;
        self.accounts
            .update_by_id(
                account_id,
                AccountUpdate {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        let revoked = self
            .tokens
            .delete_all_for_owner(account_id)
            .await
            .map_err(|e| {
                tracing::error!(
                    user_id = %account_id,
                    error = %e,
                    "Password changed but session revocation failed; revocation must be retried"
                );
                e
            })?;

        tracing::info!(
            user_id = %account_id,
            revoked_sessions = revoked,
            "Password changed, all sessions revoked"
        );

        Ok(())
    }

    /// Verify an access token and re-fetch the account behind it.
    ///
    /// Claims alone are not trusted: an account deactivated after issuance
    /// is rejected even though the token still verifies.
    pub async fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let claims = self.codec.verify_access(token)?;
        let account_id = claims.account_id()?;

        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !account.is_active {
            tracing::warn!(user_id = %account.id, "Valid token for deactivated account rejected");
            return Err(AuthError::AccountInactive.into());
        }

        Ok(AuthenticatedUser {
            claims,
            user: UserProfile::from(&account),
        })
    }

    /// Administrative revocation of every outstanding session for an
    /// account, for security-incident response. Returns how many sessions
    /// were revoked.
    pub async fn revoke_all_sessions(&self, account_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.tokens.delete_all_for_owner(account_id).await?;

        tracing::warn!(
            user_id = %account_id,
            revoked_sessions = revoked,
            "All sessions revoked"
        );

        Ok(revoked)
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }
}

fn timestamp_to_datetime(timestamp: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{InMemoryAccountRepository, NewAccount};
    use crate::auth::store::InMemoryTokenStore;

    const TEST_COST: u32 = 4;

    fn test_service() -> (AuthService, Arc<InMemoryAccountRepository>, Arc<InMemoryTokenStore>) {
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let jwt = JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_lifetime: "15m".to_string(),
            refresh_token_lifetime: "7d".to_string(),
            issuer: "shopauth-test".to_string(),
            audience: "storefront".to_string(),
        };
        let service = AuthService::new(
            accounts.clone(),
            tokens.clone(),
            jwt,
            HashingSettings { cost: TEST_COST },
        );
        (service, accounts, tokens)
    }

    async fn seed_account(
        accounts: &InMemoryAccountRepository,
        email: &str,
        password: &str,
    ) -> crate::accounts::Account {
        accounts
            .create(NewAccount {
                email: email.to_string(),
                username: email.split('@').next().unwrap_or("user").to_string(),
                password_hash: hash_password(password, TEST_COST).expect("hash failed"),
                display_name: "Test User".to_string(),
                roles: vec!["customer".to_string()],
            })
            .await
            .expect("Failed to seed account")
    }

    #[tokio::test]
    async fn test_login_happy_path() {
        let (service, accounts, tokens) = test_service();
        let account = seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;

        let outcome = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .expect("Login failed");

        assert_eq!(outcome.user.id, account.id);
        assert_eq!(outcome.expires_in, 900);

        // The refresh record's owner is alice.
        let claims = service
            .codec()
            .verify_refresh(&outcome.refresh_token)
            .expect("Refresh token invalid");
        let record = tokens
            .get(&claims.jti)
            .await
            .unwrap()
            .expect("Record missing");
        assert_eq!(record.user_id, account.id);

        // Login recorded last_login.
        let reloaded = accounts.find_by_id(account.id).await.unwrap().unwrap();
        assert!(reloaded.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_login_enumeration_resistance() {
        let (service, accounts, _) = test_service();
        seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;

        let unknown = service
            .login("nobody@example.com", "Str0ng!Pass")
            .await
            .unwrap_err();
        let wrong_password = service
            .login("alice@example.com", "Wr0ng!Pass")
            .await
            .unwrap_err();

        match (unknown, wrong_password) {
            (
                AppError::Auth(AuthError::InvalidCredentials),
                AppError::Auth(AuthError::InvalidCredentials),
            ) => (),
            other => panic!("Expected identical InvalidCredentials, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_deactivated_account() {
        let (service, accounts, _) = test_service();
        let account = seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;
        accounts
            .update_by_id(
                account.id,
                AccountUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Correct password on an inactive account is AccountInactive,
        // not InvalidCredentials.
        let err = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::AccountInactive)));
    }

    #[tokio::test]
    async fn test_refresh_returns_access_only_without_rotation() {
        let (service, accounts, tokens) = test_service();
        seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;

        let login = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap();
        let jti = service
            .codec()
            .verify_refresh(&login.refresh_token)
            .unwrap()
            .jti;

        let renewed = service.refresh(&login.refresh_token).await.unwrap();
        assert!(service.verify_access_token(&renewed.access_token).await.is_ok());

        // The record is untouched and the same token renews again.
        assert!(tokens.get(&jti).await.unwrap().is_some());
        assert!(service.refresh(&login.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_access_token_rejected_as_refresh_token() {
        let (service, accounts, _) = test_service();
        seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;
        let login = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap();

        let err = service.refresh(&login.access_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_logout_then_refresh_fails() {
        let (service, accounts, _) = test_service();
        seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;
        let login = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap();

        service.logout(&login.refresh_token).await.expect("Logout failed");

        let err = service.refresh(&login.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent_at_the_caller_level() {
        let (service, accounts, _) = test_service();
        seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;
        let login = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap();

        assert!(service.logout(&login.refresh_token).await.is_ok());

        // Second logout: well-defined InvalidToken, never a panic.
        let err = service.logout(&login.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_change_password_revokes_all_sessions() {
        let (service, accounts, tokens) = test_service();
        let account = seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;

        let first = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap();
        let second = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap();

        service
            .change_password(account.id, "Str0ng!Pass", "N3w!Secret")
            .await
            .expect("Password change failed");

        assert!(tokens.is_empty().await);
        assert!(service.refresh(&first.refresh_token).await.is_err());
        assert!(service.refresh(&second.refresh_token).await.is_err());

        // Old password gone, new one works.
        assert!(service.login("alice@example.com", "Str0ng!Pass").await.is_err());
        assert!(service.login("alice@example.com", "N3w!Secret").await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_rejects_weak_replacement() {
        let (service, accounts, _) = test_service();
        let account = seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;

        let err = service
            .change_password(account.id, "Str0ng!Pass", "weak")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::WeakPassword(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_all_is_scoped_to_one_account() {
        let (service, accounts, _) = test_service();
        let alice = seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;
        seed_account(&accounts, "bob@example.com", "Str0ng!Pass").await;

        let alice_session = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap();
        let bob_session = service
            .login("bob@example.com", "Str0ng!Pass")
            .await
            .unwrap();

        let revoked = service.revoke_all_sessions(alice.id).await.unwrap();
        assert_eq!(revoked, 1);

        assert!(service.refresh(&alice_session.refresh_token).await.is_err());
        assert!(service.refresh(&bob_session.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_access_token_rejects_deactivated_account() {
        let (service, accounts, _) = test_service();
        let account = seed_account(&accounts, "alice@example.com", "Str0ng!Pass").await;
        let login = service
            .login("alice@example.com", "Str0ng!Pass")
            .await
            .unwrap();

        assert!(service.verify_access_token(&login.access_token).await.is_ok());

        accounts
            .update_by_id(
                account.id,
                AccountUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Token still verifies cryptographically, but the fresh account
        // fetch rejects it.
        let err = service
            .verify_access_token(&login.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::AccountInactive)));
    }
}
