/// Refresh Token Store
///
/// A TTL-keyed store of outstanding refresh-token records, keyed by the
/// token's jti. A refresh token is usable only while its signature verifies
/// AND a live record exists here: either side alone is insufficient, which
/// keeps a compromised signing key from minting indefinitely-valid refresh
/// tokens and keeps stale records from outliving signature expiry.
///
/// Store failures are always the transient `StoreError` category. A store
/// timeout must never be read as "token valid".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

/// Server-side metadata for one outstanding refresh token.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a record; its TTL matches `expires_at` so the backend
    /// self-prunes even if application-level cleanup is skipped.
    async fn put(
        &self,
        jti: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Point lookup. An already-expired record is treated as absent and
    /// proactively deleted, independent of backend-level eviction.
    async fn get(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Idempotent removal. Returns the removed record even if it was
    /// expired or revoked, so callers can tell "was present" apart from
    /// "never existed"; a missing jti is `None`, not an error.
    async fn delete(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Delete every record owned by the user, returning the count. Partial
    /// progress under concurrent writes is acceptable and resumable.
    async fn delete_all_for_owner(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Delete all expired records, returning the count. Meant for a
    /// recurring background schedule, never the request path.
    async fn sweep_expired(&self) -> Result<u64, StoreError>;
}

/// In-memory store for tests and single-process deployments.
///
/// Keeps an explicit owner -> jti index alongside the records so that
/// `delete_all_for_owner` removes exactly one user's tokens without scanning
/// every live session.
pub struct InMemoryTokenStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<String, RefreshTokenRecord>,
    by_owner: HashMap<Uuid, HashSet<String>>,
}

impl StoreInner {
    fn remove(&mut self, jti: &str) -> Option<RefreshTokenRecord> {
        let record = self.records.remove(jti)?;
        if let Some(owned) = self.by_owner.get_mut(&record.user_id) {
            owned.remove(jti);
            if owned.is_empty() {
                self.by_owner.remove(&record.user_id);
            }
        }
        Some(record)
    }
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Flag a record revoked without removing it. The normal revocation
    /// path deletes outright; this mirrors backends where operators mark
    /// records revoked out-of-band.
    pub async fn revoke(&self, jti: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(jti) {
            Some(record) => {
                record.revoked = true;
                true
            }
            None => false,
        }
    }

    /// Number of live (non-expired) records, for diagnostics and tests.
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.records.values().filter(|r| !r.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put(
        &self,
        jti: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.records.insert(
            jti.to_string(),
            RefreshTokenRecord {
                user_id,
                expires_at,
                revoked: false,
            },
        );
        inner
            .by_owner
            .entry(user_id)
            .or_default()
            .insert(jti.to_string());
        Ok(())
    }

    async fn get(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        {
            let inner = self.inner.read().await;
            match inner.records.get(jti) {
                None => return Ok(None),
                Some(record) if !record.is_expired() => return Ok(Some(record.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop the record and report absence.
        let mut inner = self.inner.write().await;
        inner.remove(jti);
        Ok(None)
    }

    async fn delete(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.remove(jti))
    }

    async fn delete_all_for_owner(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let jtis: Vec<String> = inner
            .by_owner
            .get(&user_id)
            .map(|owned| owned.iter().cloned().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for jti in jtis {
            if inner.remove(&jti).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let expired: Vec<String> = inner
            .records
            .iter()
            .filter(|(_, record)| record.is_expired())
            .map(|(jti, _)| jti.clone())
            .collect();

        let mut removed = 0;
        for jti in expired {
            if inner.remove(&jti).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Postgres-backed store used in production. TTL semantics come from the
/// defensive expiry check on read plus the recurring sweep; `user_id` is
/// indexed so owner-wide revocation avoids a sequential scan.
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn put(
        &self,
        jti: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (jti, user_id, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, false, $4)
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT user_id, expires_at, revoked FROM refresh_tokens WHERE jti = $1",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(record) if record.is_expired() => {
                sqlx::query("DELETE FROM refresh_tokens WHERE jti = $1")
                    .bind(jti)
                    .execute(&self.pool)
                    .await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn delete(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            DELETE FROM refresh_tokens
            WHERE jti = $1
            RETURNING user_id, expires_at, revoked
            "#,
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_all_for_owner(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
