//! # Idempotency Repository
//!
//! Remembers the outcome of creation requests so a retried call replays
//! the first answer instead of doing the work twice.
//!
//! ## First Writer Wins
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  save_if_absent(scope, key, R)                                         │
//! │                                                                         │
//! │  INSERT … ON CONFLICT(scope, key) DO UPDATE … WHERE expired            │
//! │       │                                                                 │
//! │       ├── no row yet        → inserted        → (R, created = true)    │
//! │       ├── live row R1       → untouched       → (R1, created = false)  │
//! │       └── expired row R0    → replaced by R   → (R, created = true)    │
//! │                                                                         │
//! │  The claim is one statement: two racing writers can't both win.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bistro_core::IdempotencyRecord;
use chrono::{Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// Repository for idempotency records.
#[derive(Debug, Clone)]
pub struct IdempotencyRepository {
    pool: SqlitePool,
}

impl IdempotencyRepository {
    /// Creates a new IdempotencyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IdempotencyRepository { pool }
    }

    /// Claims `(scope, key)` for `response` unless a live record exists.
    ///
    /// ## Returns
    /// `(record, created)`: the stored record and whether this call wrote it.
    pub async fn save_if_absent(
        &self,
        scope: &str,
        key: &str,
        response: &[u8],
        ttl: Duration,
    ) -> DbResult<(IdempotencyRecord, bool)> {
        let mut conn = self.pool.acquire().await?;
        Self::claim(&mut conn, scope, key, response, ttl).await
    }

    /// Transaction-scoped [`Self::save_if_absent`].
    pub async fn claim(
        conn: &mut SqliteConnection,
        scope: &str,
        key: &str,
        response: &[u8],
        ttl: Duration,
    ) -> DbResult<(IdempotencyRecord, bool)> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let written = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            INSERT INTO idempotency_records (scope, key, response, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (scope, key) DO UPDATE SET
                response = excluded.response,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            WHERE idempotency_records.expires_at <= excluded.created_at
            RETURNING scope, key, response, created_at, expires_at
            "#,
        )
        .bind(scope)
        .bind(key)
        .bind(response)
        .bind(now)
        .bind(expires_at)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(record) = written {
            debug!(scope, key, "Idempotency key claimed");
            return Ok((record, true));
        }

        // Conflict with a live record: hand back the winner.
        let existing = sqlx::query_as::<_, IdempotencyRecord>(
            "SELECT scope, key, response, created_at, expires_at \
             FROM idempotency_records WHERE scope = ?1 AND key = ?2",
        )
        .bind(scope)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::Internal(format!("idempotency record {scope}/{key} vanished")))?;

        debug!(scope, key, "Idempotency key already claimed");
        Ok((existing, false))
    }

    /// Replaces the response of a record claimed earlier in the same
    /// transaction.
    ///
    /// Lets a use case claim its key before doing the work and store the
    /// real response just before commit.
    pub async fn store_response(
        conn: &mut SqliteConnection,
        scope: &str,
        key: &str,
        response: &[u8],
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE idempotency_records SET response = ?3 WHERE scope = ?1 AND key = ?2",
        )
        .bind(scope)
        .bind(key)
        .bind(response)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Idempotency record", format!("{scope}/{key}")));
        }
        Ok(())
    }

    /// Gets the live record for `(scope, key)`. Expired records are ignored.
    pub async fn find(&self, scope: &str, key: &str) -> DbResult<Option<IdempotencyRecord>> {
        let mut conn = self.pool.acquire().await?;
        Self::lookup(&mut conn, scope, key).await
    }

    /// Transaction-scoped [`Self::find`].
    pub async fn lookup(
        conn: &mut SqliteConnection,
        scope: &str,
        key: &str,
    ) -> DbResult<Option<IdempotencyRecord>> {
        let record = sqlx::query_as::<_, IdempotencyRecord>(
            r#"
            SELECT scope, key, response, created_at, expires_at
            FROM idempotency_records
            WHERE scope = ?1 AND key = ?2 AND expires_at > ?3
            "#,
        )
        .bind(scope)
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(record)
    }

    /// Deletes expired records. Cleanup only; lookups already skip them.
    pub async fn purge_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= ?1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "Purged expired idempotency records");
        }
        Ok(purged)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;

    #[tokio::test]
    async fn test_first_writer_wins() {
        let db = db().await;
        let repo = db.idempotency();
        let ttl = Duration::hours(24);

        let (first, created) = repo.save_if_absent("order-create", "k1", b"R1", ttl).await.unwrap();
        assert!(created);
        assert_eq!(first.response, b"R1");

        let (second, created) = repo.save_if_absent("order-create", "k1", b"R2", ttl).await.unwrap();
        assert!(!created);
        assert_eq!(second.response, b"R1");

        let found = repo.find("order-create", "k1").await.unwrap().unwrap();
        assert_eq!(found.response, b"R1");
    }

    #[tokio::test]
    async fn test_store_response_after_claim() {
        let db = db().await;
        let ttl = Duration::hours(1);

        let mut tx = db.begin().await.unwrap();
        let (_, created) = IdempotencyRepository::claim(&mut tx, "pos-payment", "k", b"", ttl)
            .await
            .unwrap();
        assert!(created);
        IdempotencyRepository::store_response(&mut tx, "pos-payment", "k", b"receipt")
            .await
            .unwrap();
        let err = IdempotencyRepository::store_response(&mut tx, "pos-payment", "other", b"x")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        tx.commit().await.unwrap();

        let found = db.idempotency().find("pos-payment", "k").await.unwrap().unwrap();
        assert_eq!(found.response, b"receipt");
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let db = db().await;
        let repo = db.idempotency();
        let ttl = Duration::minutes(5);

        repo.save_if_absent("order-create", "k", b"order", ttl).await.unwrap();
        let (record, created) = repo.save_if_absent("pos-payment", "k", b"payment", ttl).await.unwrap();
        assert!(created);
        assert_eq!(record.response, b"payment");
    }

    #[tokio::test]
    async fn test_expired_record_is_replaced() {
        let db = db().await;
        let repo = db.idempotency();

        // Already expired the moment it is written
        repo.save_if_absent("order-create", "k", b"old", Duration::seconds(-1))
            .await
            .unwrap();
        assert!(repo.find("order-create", "k").await.unwrap().is_none());

        let (record, created) = repo
            .save_if_absent("order-create", "k", b"new", Duration::hours(1))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(record.response, b"new");
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let db = db().await;
        let repo = db.idempotency();
        repo.save_if_absent("s", "gone", b"x", Duration::seconds(-1)).await.unwrap();
        repo.save_if_absent("s", "live", b"y", Duration::hours(1)).await.unwrap();

        assert_eq!(repo.purge_expired().await.unwrap(), 1);
        assert!(repo.find("s", "live").await.unwrap().is_some());
    }
}
