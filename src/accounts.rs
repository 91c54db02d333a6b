/// Account persistence boundary
///
/// The authentication core reads and updates account records but never owns
/// their lifecycle: creation happens elsewhere and deletion never happens
/// here. The repository trait is the seam; production uses Postgres, tests
/// use the in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;

/// A stored user account. `password_hash` must never leave this layer except
/// for verification; callers receive `UserProfile` instead.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    /// Opaque role tags carried into access-token claims; no authorization
    /// semantics are attached to them here.
    pub roles: Vec<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sanitized account view safe to return to callers (no password hash).
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for UserProfile {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            username: account.username.clone(),
            display_name: account.display_name.clone(),
            roles: account.roles.clone(),
            is_active: account.is_active,
            email_verified: account.email_verified,
            last_login_at: account.last_login_at,
            created_at: account.created_at,
        }
    }
}

/// Fields accepted when creating an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

/// Partial update applied by `update_by_id`; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub email_verified: Option<bool>,
}

/// Case-folds and trims a login identifier so that lookups and stored emails
/// always compare equal regardless of how the user typed them.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Looks up an account by normalized email or username.
    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError>;

    async fn create(&self, fields: NewAccount) -> Result<Account, AppError>;

    async fn update_by_id(
        &self,
        id: Uuid,
        update: AccountUpdate,
    ) -> Result<Option<Account>, AppError>;

    async fn update_last_login(&self, id: Uuid) -> Result<(), AppError>;
}

/// Postgres-backed repository used in production.
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, AppError> {
        let normalized = normalize_identifier(identifier);

        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, username, password_hash, display_name, roles,
                   is_active, email_verified, last_login_at, created_at, updated_at
            FROM accounts
            WHERE email = $1 OR lower(username) = $1
            "#,
        )
        .bind(&normalized)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, username, password_hash, display_name, roles,
                   is_active, email_verified, last_login_at, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn create(&self, fields: NewAccount) -> Result<Account, AppError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts
                (id, email, username, password_hash, display_name, roles,
                 is_active, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, true, false, $7, $7)
            RETURNING id, email, username, password_hash, display_name, roles,
                      is_active, email_verified, last_login_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(normalize_identifier(&fields.email))
        .bind(&fields.username)
        .bind(&fields.password_hash)
        .bind(&fields.display_name)
        .bind(&fields.roles)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn update_by_id(
        &self,
        id: Uuid,
        update: AccountUpdate,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET email = COALESCE($2, email),
                display_name = COALESCE($3, display_name),
                password_hash = COALESCE($4, password_hash),
                is_active = COALESCE($5, is_active),
                email_verified = COALESCE($6, email_verified),
                updated_at = $7
            WHERE id = $1
            RETURNING id, email, username, password_hash, display_name, roles,
                      is_active, email_verified, last_login_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(update.email.as_deref().map(normalize_identifier))
        .bind(update.display_name)
        .bind(update.password_hash)
        .bind(update.is_active)
        .bind(update.email_verified)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE accounts SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// In-memory repository for tests and local experiments.
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryAccountRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, AppError> {
        let normalized = normalize_identifier(identifier);
        let accounts = self.accounts.read().await;

        Ok(accounts
            .values()
            .find(|a| a.email == normalized || a.username.to_lowercase() == normalized)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn create(&self, fields: NewAccount) -> Result<Account, AppError> {
        let mut accounts = self.accounts.write().await;
        let email = normalize_identifier(&fields.email);

        if accounts.values().any(|a| a.email == email) {
            return Err(crate::error::AuthError::EmailInUse.into());
        }

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email,
            username: fields.username,
            password_hash: fields.password_hash,
            display_name: fields.display_name,
            roles: fields.roles,
            is_active: true,
            email_verified: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(account.id, account.clone());

        Ok(account)
    }

    async fn update_by_id(
        &self,
        id: Uuid,
        update: AccountUpdate,
    ) -> Result<Option<Account>, AppError> {
        let mut accounts = self.accounts.write().await;

        if let Some(new_email) = &update.email {
            let normalized = normalize_identifier(new_email);
            if accounts
                .values()
                .any(|a| a.id != id && a.email == normalized)
            {
                return Err(crate::error::AuthError::EmailInUse.into());
            }
        }

        let account = match accounts.get_mut(&id) {
            Some(account) => account,
            None => return Ok(None),
        };

        if let Some(email) = update.email {
            account.email = normalize_identifier(&email);
        }
        if let Some(display_name) = update.display_name {
            account.display_name = display_name;
        }
        if let Some(password_hash) = update.password_hash {
            account.password_hash = password_hash;
        }
        if let Some(is_active) = update.is_active {
            account.is_active = is_active;
        }
        if let Some(email_verified) = update.email_verified {
            account.email_verified = email_verified;
        }
        account.updated_at = Utc::now();

        Ok(Some(account.clone()))
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), AppError> {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get_mut(&id) {
            account.last_login_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_fields(email: &str, username: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            username: username.to_string(),
            password_hash: "$2b$04$fakehash".to_string(),
            display_name: "Test User".to_string(),
            roles: vec!["customer".to_string()],
        }
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_identifier("Bob"), "bob");
    }

    #[test]
    fn test_profile_has_no_hash() {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            display_name: "Alice".to_string(),
            roles: vec![],
            is_active: true,
            email_verified: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        let profile = UserProfile::from(&account);
        let json = serde_json::to_string(&profile).expect("Failed to serialize profile");
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("$2b$"));
    }

    #[tokio::test]
    async fn test_in_memory_lookup_is_case_insensitive() {
        let repo = InMemoryAccountRepository::new();
        repo.create(new_fields("Alice@Example.com", "Alice"))
            .await
            .expect("Failed to create account");

        let by_email = repo
            .find_by_email_or_username("ALICE@example.COM")
            .await
            .expect("Lookup failed");
        assert!(by_email.is_some());

        let by_username = repo
            .find_by_email_or_username("alice")
            .await
            .expect("Lookup failed");
        assert!(by_username.is_some());
    }

    #[tokio::test]
    async fn test_in_memory_duplicate_email_rejected() {
        let repo = InMemoryAccountRepository::new();
        repo.create(new_fields("alice@example.com", "alice"))
            .await
            .expect("Failed to create account");

        let result = repo.create(new_fields("ALICE@example.com", "alice2")).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(crate::error::AuthError::EmailInUse))
        ));
    }

    #[tokio::test]
    async fn test_update_last_login() {
        let repo = InMemoryAccountRepository::new();
        let account = repo
            .create(new_fields("alice@example.com", "alice"))
            .await
            .expect("Failed to create account");
        assert!(account.last_login_at.is_none());

        repo.update_last_login(account.id)
            .await
            .expect("Failed to update last login");

        let reloaded = repo
            .find_by_id(account.id)
            .await
            .expect("Lookup failed")
            .expect("Account missing");
        assert!(reloaded.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let repo = InMemoryAccountRepository::new();
        let account = repo
            .create(new_fields("alice@example.com", "alice"))
            .await
            .expect("Failed to create account");

        let updated = repo
            .update_by_id(
                account.id,
                AccountUpdate {
                    display_name: Some("Alice Liddell".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Update failed")
            .expect("Account missing");

        assert_eq!(updated.display_name, "Alice Liddell");
        assert_eq!(updated.email, "alice@example.com");
    }
}
