//! PostgreSQL ledger adapter.
//!
//! The transactional source-of-truth backend. Appends for a tenant are
//! serialized with a per-tenant advisory lock held for the duration of the
//! insert transaction, so hash chaining stays correct under concurrent
//! writers without locking other tenants out.

use crate::error::LedgerError;
use crate::memory::check_entry;
use crate::model::{AppendRequest, LedgerStatistics, TailExpectation};
use crate::traits::LedgerStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Acquire, Row};
use std::collections::HashMap;
use tracing::debug;
use vera_types::{ContentHash, EntryKind, LedgerEntry, TenantId};

/// PostgreSQL-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::StorageFailure(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> Result<Self, LedgerError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vera_ledger_entries (
                tenant_id TEXT NOT NULL,
                sequence BIGINT NOT NULL,
                entry_hash TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                payload_hash TEXT NOT NULL,
                payload_ref TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload JSONB NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (tenant_id, sequence)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
        Ok(())
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, LedgerError> {
    let backend = |e: sqlx::Error| LedgerError::StorageFailure(e.to_string());
    let bad_hash =
        |column: &str| LedgerError::StorageFailure(format!("stored {column} is not valid hex"));

    let tenant_id: String = row.try_get("tenant_id").map_err(backend)?;
    let sequence: i64 = row.try_get("sequence").map_err(backend)?;
    let entry_hash: String = row.try_get("entry_hash").map_err(backend)?;
    let prev_hash: String = row.try_get("prev_hash").map_err(backend)?;
    let payload_hash: String = row.try_get("payload_hash").map_err(backend)?;
    let payload_ref: String = row.try_get("payload_ref").map_err(backend)?;
    let kind: String = row.try_get("kind").map_err(backend)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(backend)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(backend)?;

    Ok(LedgerEntry {
        tenant_id: TenantId::new(tenant_id),
        sequence: sequence as u64,
        entry_hash: ContentHash::from_hex(&entry_hash).ok_or_else(|| bad_hash("entry_hash"))?,
        prev_hash: ContentHash::from_hex(&prev_hash).ok_or_else(|| bad_hash("prev_hash"))?,
        payload_hash: ContentHash::from_hex(&payload_hash)
            .ok_or_else(|| bad_hash("payload_hash"))?,
        payload_ref,
        kind: kind
            .parse::<EntryKind>()
            .map_err(LedgerError::Serialization)?,
        payload,
        recorded_at,
    })
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn append(
        &self,
        tenant_id: &TenantId,
        request: AppendRequest,
    ) -> Result<LedgerEntry, LedgerError> {
        let backend = |e: sqlx::Error| LedgerError::StorageFailure(e.to_string());

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let conn = tx.acquire().await.map_err(backend)?;

        // Serialize appends per tenant; released at commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(tenant_id.as_str())
            .execute(&mut *conn)
            .await
            .map_err(backend)?;

        let last = sqlx::query(
            "SELECT sequence, entry_hash FROM vera_ledger_entries
             WHERE tenant_id = $1 ORDER BY sequence DESC LIMIT 1",
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

        let (sequence, prev_hash, actual_tail) = if let Some(row) = last {
            let seq: i64 = row.try_get("sequence").map_err(backend)?;
            let prev: String = row.try_get("entry_hash").map_err(backend)?;
            let prev = ContentHash::from_hex(&prev).ok_or_else(|| {
                LedgerError::StorageFailure("stored entry_hash is not valid hex".to_string())
            })?;
            (seq as u64 + 1, prev, Some(seq as u64))
        } else {
            (0, ContentHash::ZERO, None)
        };

        if let Some(expectation) = request.expected_tail {
            let matches = match expectation {
                TailExpectation::Empty => actual_tail.is_none(),
                TailExpectation::At(seq) => actual_tail == Some(seq),
            };
            if !matches {
                let expected = match expectation {
                    TailExpectation::Empty => None,
                    TailExpectation::At(seq) => Some(seq),
                };
                return Err(LedgerError::ConcurrencyConflict {
                    tenant_id: tenant_id.clone(),
                    expected,
                    actual: actual_tail,
                });
            }
        }

        let payload_hash = vera_crypto::payload_hash(&request.payload)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let entry_hash = vera_crypto::entry_hash(sequence, &prev_hash, &payload_hash);

        let entry = LedgerEntry {
            tenant_id: tenant_id.clone(),
            sequence,
            entry_hash,
            prev_hash,
            payload_hash,
            payload_ref: request.payload_ref,
            kind: request.kind,
            payload: request.payload,
            recorded_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO vera_ledger_entries
                (tenant_id, sequence, entry_hash, prev_hash, payload_hash,
                 payload_ref, kind, payload, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.tenant_id.as_str())
        .bind(entry.sequence as i64)
        .bind(entry.entry_hash.to_hex())
        .bind(entry.prev_hash.to_hex())
        .bind(entry.payload_hash.to_hex())
        .bind(entry.payload_ref.clone())
        .bind(entry.kind.to_string())
        .bind(entry.payload.clone())
        .bind(entry.recorded_at)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        debug!(
            tenant_id = %tenant_id,
            sequence,
            kind = %entry.kind,
            "appended ledger entry"
        );
        Ok(entry)
    }

    async fn read_range(
        &self,
        tenant_id: &TenantId,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if from_seq > to_seq {
            return Err(LedgerError::InvalidRange { from_seq, to_seq });
        }
        let tail = self.tail_sequence(tenant_id).await?;
        if tail.is_none() || to_seq > tail.unwrap_or(0) {
            return Err(LedgerError::NotFound {
                tenant_id: tenant_id.clone(),
                from_seq,
                to_seq,
                tail,
            });
        }

        let rows = sqlx::query(
            "SELECT * FROM vera_ledger_entries
             WHERE tenant_id = $1 AND sequence BETWEEN $2 AND $3
             ORDER BY sequence ASC",
        )
        .bind(tenant_id.as_str())
        .bind(from_seq as i64)
        .bind(to_seq as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn tail_sequence(&self, tenant_id: &TenantId) -> Result<Option<u64>, LedgerError> {
        let row = sqlx::query(
            "SELECT MAX(sequence) AS tail FROM vera_ledger_entries WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
        let tail: Option<i64> = row
            .try_get("tail")
            .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
        Ok(tail.map(|t| t as u64))
    }

    async fn latest_entry_hash(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<ContentHash>, LedgerError> {
        let row = sqlx::query(
            "SELECT entry_hash FROM vera_ledger_entries
             WHERE tenant_id = $1 ORDER BY sequence DESC LIMIT 1",
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;

        match row {
            Some(row) => {
                let hex: String = row
                    .try_get("entry_hash")
                    .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
                let hash = ContentHash::from_hex(&hex).ok_or_else(|| {
                    LedgerError::StorageFailure("stored entry_hash is not valid hex".to_string())
                })?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    async fn verify_chain(&self, tenant_id: &TenantId) -> Result<u64, LedgerError> {
        let rows = sqlx::query(
            "SELECT * FROM vera_ledger_entries WHERE tenant_id = $1 ORDER BY sequence ASC",
        )
        .bind(tenant_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;

        let mut prev_hash = ContentHash::ZERO;
        for (index, row) in rows.iter().enumerate() {
            let entry = row_to_entry(row)?;
            check_entry(tenant_id, &entry, index as u64, &prev_hash)?;
            prev_hash = entry.entry_hash;
        }
        Ok(rows.len() as u64)
    }

    async fn statistics(&self, tenant_id: &TenantId) -> Result<LedgerStatistics, LedgerError> {
        let rows = sqlx::query(
            "SELECT kind, COUNT(*) AS n FROM vera_ledger_entries
             WHERE tenant_id = $1 GROUP BY kind",
        )
        .bind(tenant_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;

        let mut by_kind: HashMap<String, u64> = HashMap::new();
        let mut total = 0u64;
        for row in rows {
            let kind: String = row
                .try_get("kind")
                .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
            let n: i64 = row
                .try_get("n")
                .map_err(|e| LedgerError::StorageFailure(e.to_string()))?;
            total += n as u64;
            by_kind.insert(kind, n as u64);
        }
        Ok(LedgerStatistics {
            total_entries: total,
            by_kind,
        })
    }
}
