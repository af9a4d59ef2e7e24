//! End-to-end checks over normalize → dedupe → persist, against an
//! in-memory store.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use empty_leg_etl::core::dedupe::dedupe_by_id;
use empty_leg_etl::core::normalize::{DepartFallback, FallbackPolicy, Normalizer};
use empty_leg_etl::core::persist::save_legs;
use empty_leg_etl::domain::model::{CanonicalLeg, FallbackCounters, RawLegCandidate, RejectReason};
use empty_leg_etl::domain::ports::{LegStore, UpsertOutcome};
use empty_leg_etl::utils::error::{IngestError, Result};
use empty_leg_etl::AirportResolver;
use std::collections::HashMap;
use std::sync::Mutex;

struct MemoryLegStore {
    rows: Mutex<HashMap<String, CanonicalLeg>>,
}

impl MemoryLegStore {
    fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl LegStore for MemoryLegStore {
    async fn insert_missing(&self, legs: &[CanonicalLeg]) -> Result<Vec<String>> {
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

/// Store that refuses one specific id, for fault-isolation checks.
struct PoisonedStore {
    inner: MemoryLegStore,
    poison: String,
}

#[async_trait]
impl LegStore for PoisonedStore {
    async fn insert_missing(&self, legs: &[CanonicalLeg]) -> Result<Vec<String>> {
        let clean: Vec<CanonicalLeg> = legs
            .iter()
            .filter(|l| l.id != self.poison)
            .cloned()
            .collect();
        self.inner.insert_missing(&clean).await
    }

    async fn fetch(&self, id: &str) -> Result<Option<CanonicalLeg>> {
        self.inner.fetch(id).await
    }

    async fn upsert(&self, leg: &CanonicalLeg) -> Result<UpsertOutcome> {
        if leg.id == self.poison {
            return Err(IngestError::ExtractionError {
                message: "constraint violation".to_string(),
            });
        }
        self.inner.upsert(leg).await
    }
}

fn fixed_policy() -> FallbackPolicy {
    FallbackPolicy {
        depart: DepartFallback::Fixed(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
        seats: 1,
    }
}

fn candidate(operator: &str, id: &str, origin: &str, destination: &str) -> RawLegCandidate {
    RawLegCandidate {
        id: id.to_string(),
        operator: operator.to_string(),
        origin: Some(origin.to_string()),
        destination: Some(destination.to_string()),
        url: "https://example.com".to_string(),
        ..Default::default()
    }
}

fn normalize_batch(raw: &[RawLegCandidate]) -> (Vec<CanonicalLeg>, Vec<RejectReason>, FallbackCounters) {
    let resolver = AirportResolver::empty();
    let normalizer = Normalizer::new(&resolver, fixed_policy());
    let mut counters = FallbackCounters::default();
    let mut kept = Vec::new();
    let mut rejected = Vec::new();
    for r in raw {
        match normalizer.normalize(r, &mut counters) {
            Ok(leg) => kept.push(leg),
            Err(rejection) => rejected.push(rejection.reason),
        }
    }
    (kept, rejected, counters)
}

// Sparse listing: ICAO route, no departure, no price, no seats. Everything
// required still comes out populated.
#[test]
fn test_sparse_listing_fully_defaulted() {
    let raw = candidate("magellan", "m-1", "KTEB", "KOPF");
    let (kept, rejected, counters) = normalize_batch(&[raw]);

    assert!(rejected.is_empty());
    let leg = &kept[0];
    assert_eq!(leg.from_iata, "TEB");
    assert_eq!(leg.to_iata, "OPF");
    assert_eq!(leg.depart_at, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(leg.price_usd, 0);
    assert_eq!(leg.seats, 1);
    assert_eq!(leg.ac_type, "Unknown");
    let notes = leg.notes.as_deref().unwrap();
    assert!(notes.contains("Departure estimated"));
    assert!(notes.contains("Contact for Price"));
    assert_eq!(counters, FallbackCounters { depart: 1, price: 1, seats: 1 });
}

// Durable upstream deal: stable readable id, date bucketed to the day.
#[test]
fn test_durable_deal_identity() {
    let mut raw = candidate("xo", "98765", "TEB", "OPF");
    raw.id_is_durable = true;
    raw.departure_text = Some("2025-10-10".to_string());
    raw.price = Some(4900.0);
    raw.seats = Some(8);
    raw.aircraft = Some("Challenger 300".to_string());

    let (kept, _, counters) = normalize_batch(&[raw]);
    let leg = &kept[0];
    assert_eq!(leg.id, "xo:98765:TEB-OPF:2025-10-10");
    assert_eq!(leg.price_usd, 4900);
    assert_eq!(leg.seats, 8);
    assert_eq!(leg.notes, None);
    assert!(!counters.any());
}

// Noise batch: junk ids, stop-word tokens, and self-loops are dropped
// without affecting the good row.
#[test]
fn test_noise_rejected_good_rows_survive() {
    let mut self_loop = candidate("xo", "x-2", "TEB", "TEB");
    self_loop.departure_text = Some("2025-10-10".to_string());

    let raw = vec![
        candidate("magellan", "main-navigation", "KTEB", "KOPF"),
        candidate("magellan", "m-3", "VIEW", "KOPF"),
        self_loop,
        candidate("magellan", "m-4", "KTEB", "KOPF"),
    ];
    let (kept, rejected, _) = normalize_batch(&raw);

    assert_eq!(kept.len(), 1);
    assert_eq!(
        rejected,
        vec![
            RejectReason::JunkId,
            RejectReason::UnresolvableCode,
            RejectReason::SelfLoopRoute,
        ]
    );
}

// The same raw batch normalized twice produces identical ids.
#[test]
fn test_normalization_is_deterministic() {
    let mut raw = candidate("flyvictor", "v-9", "EGGW", "KTEB");
    raw.departure_text = Some("2025-11-02T08:00:00Z".to_string());
    raw.aircraft = Some("Citation XLS".to_string());

    // EGGW needs the dataset; use a resolver that knows it.
    let mut fake = String::new();
    fake.push_str(r#"{"icaoToIata":{"EGGW":"LTN"},"iataToIcao":{"LTN":"EGGW"},"cities":{}}"#);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("airports.index.json");
    std::fs::write(&path, fake).unwrap();
    let resolver = AirportResolver::load_json(&path).unwrap();

    let normalizer = Normalizer::new(&resolver, fixed_policy());
    let mut counters = FallbackCounters::default();
    let a = normalizer.normalize(&raw, &mut counters).unwrap();
    let b = normalizer.normalize(&raw, &mut counters).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(a.from_iata, "LTN");
}

#[tokio::test]
async fn test_pipeline_idempotent_end_to_end() {
    let raw = vec![
        candidate("magellan", "m-1", "KTEB", "KOPF"),
        candidate("magellan", "m-1", "KTEB", "KOPF"), // same listing seen twice
        {
            let mut c = candidate("xo", "98765", "TEB", "PBI");
            c.id_is_durable = true;
            c.departure_text = Some("2025-10-10".to_string());
            c
        },
    ];

    let (kept, _, _) = normalize_batch(&raw);
    let batch = dedupe_by_id(kept);
    assert_eq!(batch.len(), 2);

    let store = MemoryLegStore::new();
    let tmp = tempfile::tempdir().unwrap();

    let first = save_legs(&store, &batch, tmp.path()).await;
    assert_eq!(first.added, 2);
    assert_eq!(store.row_count(), 2);

    let second = save_legs(&store, &batch, tmp.path()).await;
    assert_eq!(second.added, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(store.row_count(), 2);
}

// What goes in is what comes back out (url excepted; it is never stored).
#[tokio::test]
async fn test_persisted_leg_round_trips() {
    let mut raw = candidate("xo", "777", "TEB", "OPF");
    raw.id_is_durable = true;
    raw.departure_text = Some("2025-10-10T09:00:00Z".to_string());
    raw.price = Some(5400.0);
    raw.seats = Some(6);
    raw.aircraft = Some("Phenom 300".to_string());

    let (kept, _, _) = normalize_batch(&[raw]);
    let store = MemoryLegStore::new();
    let tmp = tempfile::tempdir().unwrap();
    save_legs(&store, &kept, tmp.path()).await;

    let fetched = store.fetch(&kept[0].id).await.unwrap().unwrap();
    assert!(fetched.persist_eq(&kept[0]));
}

#[tokio::test]
async fn test_one_bad_row_does_not_sink_the_batch() {
    let raw = vec![
        candidate("magellan", "m-good", "KTEB", "KOPF"),
        candidate("magellan", "m-poison", "KVNY", "KLAS"),
    ];
    let (kept, _, _) = normalize_batch(&raw);
    let poison_id = kept[1].id.clone();

    let store = PoisonedStore {
        inner: MemoryLegStore::new(),
        poison: poison_id.clone(),
    };
    let tmp = tempfile::tempdir().unwrap();

    let summary = save_legs(&store, &kept, tmp.path()).await;
    assert_eq!(summary.added, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].leg.id, poison_id);
    assert!(store.fetch(&kept[0].id).await.unwrap().is_some());
}
