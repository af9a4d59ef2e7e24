use crate::domain::model::{CanonicalLeg, RowFailure, SaveSummary};
use crate::domain::ports::{LegStore, UpsertOutcome};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

/// Upper bound on concurrent per-row upserts; sized to stay well inside
/// the store's connection pool.
const UPSERT_WORKERS: usize = 6;

/// Write a deduplicated batch: one bulk insert for brand-new ids, then a
/// bounded-concurrency upsert pass over the remainder. Row failures are
/// collected, never propagated.
pub async fn save_legs(
    store: &dyn LegStore,
    batch: &[CanonicalLeg],
    tmp_dir: &Path,
) -> SaveSummary {
    let started = Instant::now();
    let mut summary = SaveSummary::default();
    if batch.is_empty() {
        return summary;
    }

    // Fast path: rows the store has never seen. A failed bulk step degrades
    // to the per-row pass covering the whole batch.
    let added_ids: HashSet<String> = match store.insert_missing(batch).await {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            tracing::warn!("bulk insert failed ({}); falling back to per-row upserts", e);
            HashSet::new()
        }
    };
    summary.added = added_ids.len();

    let remainder: Vec<&CanonicalLeg> = batch
        .iter()
        .filter(|leg| !added_ids.contains(&leg.id))
        .collect();

    let outcomes = stream::iter(remainder)
        .map(|leg| async move { (leg, store.upsert(leg).await) })
        .buffer_unordered(UPSERT_WORKERS)
        .collect::<Vec<_>>()
        .await;

    for (leg, outcome) in outcomes {
        match outcome {
            Ok(UpsertOutcome::Inserted) => summary.added += 1,
            Ok(UpsertOutcome::Updated) => summary.updated += 1,
            Ok(UpsertOutcome::Unchanged) => summary.skipped += 1,
            Err(e) => {
                tracing::error!("❌ row {} failed: {}", leg.id, e);
                let failure = RowFailure {
                    leg: leg.clone(),
                    error: e.to_string(),
                };
                dump_row_failure(tmp_dir, &failure).await;
                summary.errors.push(failure);
            }
        }
    }

    tracing::info!(
        "💾 save: {} added, {} updated, {} skipped, {} errors in {:.1?}",
        summary.added,
        summary.updated,
        summary.skipped,
        summary.errors.len(),
        started.elapsed()
    );
    summary
}

/// Keep the full payload on disk so a failed row can be replayed offline.
/// Best-effort only.
async fn dump_row_failure(tmp_dir: &Path, failure: &RowFailure) {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    let path = tmp_dir.join(format!("row-failed-{}-{}.json", failure.leg.operator, stamp));
    let payload = match serde_json::to_string_pretty(failure) {
        Ok(p) => p,
        Err(_) => return,
    };
    if tokio::fs::create_dir_all(tmp_dir).await.is_ok() {
        if let Err(e) = tokio::fs::write(&path, payload).await {
            tracing::debug!("row-failure dump {} failed: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::AcClass;
    use crate::utils::error::{IngestError, Result};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store; ids listed in `fail_ids` error on upsert.
    struct MemoryLegStore {
        rows: Mutex<HashMap<String, CanonicalLeg>>,
        fail_ids: Vec<String>,
        bulk_fails: bool,
    }

    impl MemoryLegStore {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
                fail_ids: Vec::new(),
                bulk_fails: false,
            }
        }
    }

    #[async_trait]
    impl LegStore for MemoryLegStore {
        async fn insert_missing(&self, legs: &[CanonicalLeg]) -> Result<Vec<String>> {
            if self.bulk_fails {
                return Err(IngestError::ExtractionError {
                    message: "bulk path down".to_string(),
                });
            }
            let mut rows = self.rows.lock().unwrap();
            let mut added = Vec::new();
            for leg in legs {
                if !rows.contains_key(&leg.id) {
                    rows.insert(leg.id.clone(), leg.clone());
                    added.push(leg.id.clone());
                }
            }
            Ok(added)
        }

        async fn fetch(&self, id: &str) -> Result<Option<CanonicalLeg>> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }

        async fn upsert(&self, leg: &CanonicalLeg) -> Result<UpsertOutcome> {
            if self.fail_ids.contains(&leg.id) {
                return Err(IngestError::ExtractionError {
                    message: "poisoned row".to_string(),
                });
            }
            let mut rows = self.rows.lock().unwrap();
            match rows.get(&leg.id) {
                None => {
                    rows.insert(leg.id.clone(), leg.clone());
                    Ok(UpsertOutcome::Inserted)
                }
                Some(current) if current.persist_eq(leg) => Ok(UpsertOutcome::Unchanged),
                Some(_) => {
                    rows.insert(leg.id.clone(), leg.clone());
                    Ok(UpsertOutcome::Updated)
                }
            }
        }
    }

    fn leg(id: &str, price: i64) -> CanonicalLeg {
        CanonicalLeg {
            id: id.to_string(),
            operator: "xo".to_string(),
            from_iata: "TEB".to_string(),
            to_iata: "OPF".to_string(),
            from_icao: None,
            to_icao: None,
            from_city: "Teterboro".to_string(),
            to_city: "Miami".to_string(),
            from_name: "Teterboro".to_string(),
            to_name: "Opa-locka".to_string(),
            depart_at: Utc.with_ymd_and_hms(2025, 10, 10, 0, 0, 0).unwrap(),
            price_usd: price,
            ac_type: "Challenger 300".to_string(),
            ac_class: AcClass::SuperMidsize,
            seats: 8,
            notes: None,
            url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_fresh_batch_all_added() {
        let store = MemoryLegStore::new();
        let tmp = tempfile::tempdir().unwrap();
        let batch = vec![leg("a", 100), leg("b", 200)];

        let summary = save_legs(&store, &batch, tmp.path()).await;
        assert_eq!(summary.added, 2);
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.skipped, 0);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_identical_rerun_is_idempotent() {
        let store = MemoryLegStore::new();
        let tmp = tempfile::tempdir().unwrap();
        let batch = vec![leg("a", 100), leg("b", 200)];

        save_legs(&store, &batch, tmp.path()).await;
        let second = save_legs(&store, &batch, tmp.path()).await;
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 2);
    }

    #[tokio::test]
    async fn test_changed_rows_updated() {
        let store = MemoryLegStore::new();
        let tmp = tempfile::tempdir().unwrap();
        save_legs(&store, &[leg("a", 100)], tmp.path()).await;

        let summary = save_legs(&store, &[leg("a", 150)], tmp.path()).await;
        assert_eq!(summary.updated, 1);
        assert_eq!(store.fetch("a").await.unwrap().unwrap().price_usd, 150);
    }

    #[tokio::test]
    async fn test_row_failure_isolated_and_dumped() {
        let mut store = MemoryLegStore::new();
        store.rows.lock().unwrap().insert("bad".to_string(), leg("bad", 1));
        store.fail_ids.push("bad".to_string());
        let tmp = tempfile::tempdir().unwrap();

        let summary = save_legs(&store, &[leg("bad", 999), leg("ok", 100)], tmp.path()).await;
        assert_eq!(summary.added, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].leg.id, "bad");

        let dumps: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("row-failed-"))
            .collect();
        assert_eq!(dumps.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_failure_degrades_to_per_row() {
        let mut store = MemoryLegStore::new();
        store.bulk_fails = true;
        let tmp = tempfile::tempdir().unwrap();

        let summary = save_legs(&store, &[leg("a", 100), leg("b", 200)], tmp.path()).await;
        assert_eq!(summary.added, 2);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = MemoryLegStore::new();
        let tmp = tempfile::tempdir().unwrap();
        let summary = save_legs(&store, &[], tmp.path()).await;
        assert_eq!(summary.added + summary.updated + summary.skipped, 0);
    }
}
