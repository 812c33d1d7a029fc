use crate::error::LedgerError;
use crate::model::{AppendRequest, LedgerStatistics, TailExpectation};
use crate::traits::LedgerStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;
use vera_types::{ContentHash, LedgerEntry, TenantId};

/// In-memory ledger adapter.
///
/// Each tenant's chain sits behind its own async mutex, so appends for one
/// tenant are strictly serialized while appends for different tenants run
/// in parallel. Deterministic and test-friendly; durable deployments use
/// the Postgres adapter.
#[derive(Default)]
pub struct InMemoryLedger {
    chains: RwLock<HashMap<TenantId, Arc<Mutex<Vec<LedgerEntry>>>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain_for(&self, tenant_id: &TenantId) -> Result<Arc<Mutex<Vec<LedgerEntry>>>, LedgerError> {
        {
            let chains = self
                .chains
                .read()
                .map_err(|_| LedgerError::StorageFailure("chain map lock poisoned".to_string()))?;
            if let Some(chain) = chains.get(tenant_id) {
                return Ok(Arc::clone(chain));
            }
        }
        let mut chains = self
            .chains
            .write()
            .map_err(|_| LedgerError::StorageFailure("chain map lock poisoned".to_string()))?;
        Ok(Arc::clone(
            chains.entry(tenant_id.clone()).or_default(),
        ))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn append(
        &self,
        tenant_id: &TenantId,
        request: AppendRequest,
    ) -> Result<LedgerEntry, LedgerError> {
        let chain = self.chain_for(tenant_id)?;
        let mut entries = chain.lock().await;

        let actual_tail = entries.last().map(|e| e.sequence);
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

        // Sequence and hashes are assigned here, under the tenant lock.
        let sequence = actual_tail.map_or(0, |tail| tail + 1);
        let prev_hash = entries
            .last()
            .map_or(ContentHash::ZERO, |e| e.entry_hash);
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

        entries.push(entry.clone());
        debug!(
            tenant_id = %tenant_id,
            sequence,
            kind = %entry.kind,
            entry_hash = %entry.entry_hash,
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
        let chain = self.chain_for(tenant_id)?;
        let entries = chain.lock().await;

        let tail = entries.last().map(|e| e.sequence);
        if tail.is_none() || to_seq > tail.unwrap_or(0) {
            return Err(LedgerError::NotFound {
                tenant_id: tenant_id.clone(),
                from_seq,
                to_seq,
                tail,
            });
        }

        Ok(entries[from_seq as usize..=to_seq as usize].to_vec())
    }

    async fn tail_sequence(&self, tenant_id: &TenantId) -> Result<Option<u64>, LedgerError> {
        let chain = self.chain_for(tenant_id)?;
        let entries = chain.lock().await;
        Ok(entries.last().map(|e| e.sequence))
    }

    async fn latest_entry_hash(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<ContentHash>, LedgerError> {
        let chain = self.chain_for(tenant_id)?;
        let entries = chain.lock().await;
        Ok(entries.last().map(|e| e.entry_hash))
    }

    async fn verify_chain(&self, tenant_id: &TenantId) -> Result<u64, LedgerError> {
        let chain = self.chain_for(tenant_id)?;
        let entries = chain.lock().await;

        let mut prev_hash = ContentHash::ZERO;
        for (index, entry) in entries.iter().enumerate() {
            check_entry(tenant_id, entry, index as u64, &prev_hash)?;
            prev_hash = entry.entry_hash;
        }
        Ok(entries.len() as u64)
    }

    async fn statistics(&self, tenant_id: &TenantId) -> Result<LedgerStatistics, LedgerError> {
        let chain = self.chain_for(tenant_id)?;
        let entries = chain.lock().await;

        let mut by_kind: HashMap<String, u64> = HashMap::new();
        for entry in entries.iter() {
            *by_kind.entry(entry.kind.to_string()).or_insert(0) += 1;
        }
        Ok(LedgerStatistics {
            total_entries: entries.len() as u64,
            by_kind,
        })
    }
}

/// Re-derive one entry's hashes and linkage against the expected chain state.
pub(crate) fn check_entry(
    tenant_id: &TenantId,
    entry: &LedgerEntry,
    expected_sequence: u64,
    expected_prev: &ContentHash,
) -> Result<(), LedgerError> {
    let corrupted = |detail: String| LedgerError::ChainCorrupted {
        tenant_id: tenant_id.clone(),
        sequence: entry.sequence,
        detail,
    };

    if entry.sequence != expected_sequence {
        return Err(corrupted(format!(
            "sequence gap: expected {expected_sequence}, found {}",
            entry.sequence
        )));
    }
    if entry.prev_hash != *expected_prev {
        return Err(corrupted(format!(
            "prev hash mismatch: expected {expected_prev}, found {}",
            entry.prev_hash
        )));
    }

    let payload_hash = vera_crypto::payload_hash(&entry.payload)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    if payload_hash != entry.payload_hash {
        return Err(corrupted(format!(
            "payload hash mismatch: expected {}, found {payload_hash}",
            entry.payload_hash
        )));
    }

    let entry_hash = vera_crypto::entry_hash(entry.sequence, &entry.prev_hash, &entry.payload_hash);
    if entry_hash != entry.entry_hash {
        return Err(corrupted(format!(
            "entry hash mismatch: expected {}, found {entry_hash}",
            entry.entry_hash
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use vera_types::EntryKind;

    fn request(payload: serde_json::Value) -> AppendRequest {
        AppendRequest::new(EntryKind::ApprovalDecision, "approval-1", payload)
    }

    #[tokio::test]
    async fn genesis_entry_links_to_zero_hash() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new("acme");

        let entry = ledger.append(&tenant, request(json!({"n": 0}))).await.unwrap();
        assert_eq!(entry.sequence, 0);
        assert_eq!(entry.prev_hash, ContentHash::ZERO);
    }

    #[tokio::test]
    async fn chain_links_prev_to_entry_hash() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new("acme");

        let mut previous: Option<LedgerEntry> = None;
        for n in 0..5 {
            let entry = ledger.append(&tenant, request(json!({"n": n}))).await.unwrap();
            if let Some(prev) = previous {
                assert_eq!(entry.prev_hash, prev.entry_hash);
                assert_eq!(entry.sequence, prev.sequence + 1);
            }
            previous = Some(entry);
        }
        assert_eq!(ledger.verify_chain(&tenant).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn entry_hash_matches_specified_construction() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new("acme");

        for n in 0..3 {
            ledger.append(&tenant, request(json!({"n": n}))).await.unwrap();
        }
        let entries = ledger.read_range(&tenant, 0, 2).await.unwrap();

        let expected = vera_crypto::entry_hash(
            2,
            &entries[1].entry_hash,
            &entries[2].payload_hash,
        );
        assert_eq!(entries[2].entry_hash, expected);
    }

    #[tokio::test]
    async fn stale_tail_expectation_conflicts() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new("acme");

        ledger.append(&tenant, request(json!({"n": 0}))).await.unwrap();
        ledger.append(&tenant, request(json!({"n": 1}))).await.unwrap();

        let stale = request(json!({"n": 2})).with_expected_tail(TailExpectation::At(0));
        let result = ledger.append(&tenant, stale).await;
        assert!(matches!(
            result,
            Err(LedgerError::ConcurrencyConflict {
                expected: Some(0),
                actual: Some(1),
                ..
            })
        ));

        // A correct expectation succeeds.
        let fresh = request(json!({"n": 2})).with_expected_tail(TailExpectation::At(1));
        assert!(ledger.append(&tenant, fresh).await.is_ok());
    }

    #[tokio::test]
    async fn empty_expectation_on_fresh_chain() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new("acme");

        let first = request(json!({})).with_expected_tail(TailExpectation::Empty);
        assert!(ledger.append(&tenant, first).await.is_ok());

        let second = request(json!({})).with_expected_tail(TailExpectation::Empty);
        assert!(matches!(
            ledger.append(&tenant, second).await,
            Err(LedgerError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn read_range_beyond_tail_is_not_found() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new("acme");

        ledger.append(&tenant, request(json!({}))).await.unwrap();
        let result = ledger.read_range(&tenant, 0, 5).await;
        assert!(matches!(
            result,
            Err(LedgerError::NotFound { tail: Some(0), .. })
        ));

        assert!(matches!(
            ledger.read_range(&tenant, 3, 1).await,
            Err(LedgerError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn tenants_have_isolated_chains() {
        let ledger = Arc::new(InMemoryLedger::new());

        let mut handles = Vec::new();
        for t in 0..4 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let tenant = TenantId::new(format!("tenant-{t}"));
                for n in 0..20 {
                    ledger
                        .append(&tenant, request(json!({"t": t, "n": n})))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for t in 0..4 {
            let tenant = TenantId::new(format!("tenant-{t}"));
            assert_eq!(ledger.tail_sequence(&tenant).await.unwrap(), Some(19));
            assert_eq!(ledger.verify_chain(&tenant).await.unwrap(), 20);
        }
    }

    #[tokio::test]
    async fn statistics_count_by_kind() {
        let ledger = InMemoryLedger::new();
        let tenant = TenantId::new("acme");

        ledger.append(&tenant, request(json!({}))).await.unwrap();
        ledger
            .append(
                &tenant,
                AppendRequest::new(EntryKind::BindingViolation, "binding-1", json!({})),
            )
            .await
            .unwrap();
        ledger
            .append(
                &tenant,
                AppendRequest::new(EntryKind::BindingViolation, "binding-1", json!({})),
            )
            .await
            .unwrap();

        let stats = ledger.statistics(&tenant).await.unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.by_kind.get("binding_violation"), Some(&2));
        assert_eq!(stats.by_kind.get("approval_decision"), Some(&1));
    }

    proptest! {
        #[test]
        fn property_appended_chains_always_verify(
            payloads in proptest::collection::vec(any::<u32>(), 1..24)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");

            rt.block_on(async move {
                let ledger = InMemoryLedger::new();
                let tenant = TenantId::new("prop");
                for value in &payloads {
                    ledger
                        .append(&tenant, request(json!({"value": value})))
                        .await
                        .unwrap();
                }
                assert_eq!(
                    ledger.verify_chain(&tenant).await.unwrap(),
                    payloads.len() as u64
                );
            });
        }
    }
}
