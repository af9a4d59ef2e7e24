use crate::domain::model::{CanonicalLeg, RawLegCandidate, SourceState};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Run flags threaded into every adapter invocation.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    /// Dump raw captures under `tmp_dir` for offline debugging.
    pub dump_artifacts: bool,
    pub tmp_dir: PathBuf,
}

/// One upstream operator. Implementations own their own HTTP session and
/// return an empty vec when the upstream is reachable but yields nothing;
/// `Err` is reserved for failing to reach the upstream at all.
#[async_trait]
pub trait Source: Send + Sync {
    fn key(&self) -> &'static str;
    async fn scrape(&self, opts: &ScrapeOptions) -> Result<Vec<RawLegCandidate>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Canonical persistence store for legs, keyed by id.
#[async_trait]
pub trait LegStore: Send + Sync {
    /// Bulk "insert, skip rows that already exist". Returns the ids that
    /// were actually inserted.
    async fn insert_missing(&self, legs: &[CanonicalLeg]) -> Result<Vec<String>>;

    async fn fetch(&self, id: &str) -> Result<Option<CanonicalLeg>>;

    /// Insert-or-update one row, reporting whether anything changed.
    async fn upsert(&self, leg: &CanonicalLeg) -> Result<UpsertOutcome>;
}

/// Durable key → cooldown-state map, read and written only by the
/// orchestrator.
#[async_trait]
pub trait SourceStateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SourceState>>;
    async fn set(&self, key: &str, state: SourceState) -> Result<()>;
    async fn clear(&self, key: &str) -> Result<()>;
}
