use crate::airports::AirportResolver;
use crate::core::dedupe::dedupe_by_id;
use crate::core::normalize::{FallbackPolicy, Normalizer};
use crate::core::persist::save_legs;
use crate::domain::model::{
    CanonicalLeg, FallbackCounters, Rejection, SaveSummary, SourceState,
};
use crate::domain::ports::{LegStore, ScrapeOptions, Source, SourceStateStore};
use chrono::{DateTime, Duration, Utc};

const REJECT_SAMPLE_MAX: usize = 10;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Source keys that bypass an active cooldown without clearing it.
    pub force: Vec<String>,
    pub cooldown: Duration,
    pub scrape: ScrapeOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: Vec::new(),
            cooldown: Duration::minutes(360),
            scrape: ScrapeOptions::default(),
        }
    }
}

#[derive(Debug)]
pub enum SourceOutcome {
    Scraped { raw: usize, kept: usize },
    SkippedCooldown { until: DateTime<Utc> },
    Failed { reason: String },
}

#[derive(Debug)]
pub struct SourceRunResult {
    pub key: &'static str,
    pub outcome: SourceOutcome,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceRunResult>,
    pub rejected: usize,
    pub reject_sample: Vec<Rejection>,
    pub fallbacks: FallbackCounters,
    pub save: SaveSummary,
}

impl RunSummary {
    /// True when every source that actually ran failed. Cooldown skips are
    /// not attempts; a run where nothing was attempted is not a failure.
    pub fn total_failure(&self) -> bool {
        let attempted: Vec<_> = self
            .sources
            .iter()
            .filter(|s| !matches!(s.outcome, SourceOutcome::SkippedCooldown { .. }))
            .collect();
        !attempted.is_empty()
            && attempted
                .iter()
                .all(|s| matches!(s.outcome, SourceOutcome::Failed { .. }))
    }
}

/// Runs the sources in order, applies the per-source circuit breaker, and
/// hands the merged batch to the persistence engine once.
pub struct Orchestrator<'a> {
    sources: &'a [Box<dyn Source>],
    resolver: &'a AirportResolver,
    state: &'a dyn SourceStateStore,
    policy: FallbackPolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        sources: &'a [Box<dyn Source>],
        resolver: &'a AirportResolver,
        state: &'a dyn SourceStateStore,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            sources,
            resolver,
            state,
            policy,
        }
    }

    /// One full ingestion pass. `store` is `None` for a dry run: scraping
    /// and normalization happen, writes are skipped.
    pub async fn run(&self, store: Option<&dyn LegStore>, opts: &RunOptions) -> RunSummary {
        let normalizer = Normalizer::new(self.resolver, self.policy);
        let mut summary = RunSummary::default();
        let mut batch: Vec<CanonicalLeg> = Vec::new();

        for source in self.sources {
            let key = source.key();

            if let Some(until) = self.active_cooldown(key, &opts.force).await {
                tracing::info!("⏸️  {}: on cooldown until {}", key, until);
                summary.sources.push(SourceRunResult {
                    key,
                    outcome: SourceOutcome::SkippedCooldown { until },
                });
                continue;
            }

            tracing::info!("📡 {}: scraping", key);
            match source.scrape(&opts.scrape).await {
                Ok(raw) => {
                    let mut kept = 0usize;
                    for candidate in &raw {
                        match normalizer.normalize(candidate, &mut summary.fallbacks) {
                            Ok(leg) => {
                                batch.push(leg);
                                kept += 1;
                            }
                            Err(rejection) => {
                                tracing::debug!(
                                    "{}: rejected ({}): {}",
                                    key,
                                    rejection.reason,
                                    rejection.detail
                                );
                                summary.rejected += 1;
                                if summary.reject_sample.len() < REJECT_SAMPLE_MAX {
                                    summary.reject_sample.push(rejection);
                                }
                            }
                        }
                    }
                    tracing::info!("✅ {}: {} candidates, {} kept", key, raw.len(), kept);
                    summary.sources.push(SourceRunResult {
                        key,
                        outcome: SourceOutcome::Scraped {
                            raw: raw.len(),
                            kept,
                        },
                    });
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::error!("❌ {}: scrape failed: {}", key, reason);
                    self.start_cooldown(key, &reason, opts.cooldown).await;
                    summary.sources.push(SourceRunResult {
                        key,
                        outcome: SourceOutcome::Failed { reason },
                    });
                }
            }
        }

        let batch = dedupe_by_id(batch);
        tracing::info!("🔄 merged batch: {} unique legs", batch.len());
        if summary.fallbacks.any() {
            tracing::info!(
                "🔄 fallbacks applied: {} departures, {} prices, {} seat counts",
                summary.fallbacks.depart,
                summary.fallbacks.price,
                summary.fallbacks.seats
            );
        }

        match store {
            Some(store) => {
                summary.save = save_legs(store, &batch, &opts.scrape.tmp_dir).await;
            }
            None => {
                tracing::info!("💾 dry run: skipping writes ({} legs ready)", batch.len());
                summary.save = SaveSummary::default();
            }
        }
        summary
    }

    /// A state-store read error is advisory; the source still runs.
    async fn active_cooldown(&self, key: &str, force: &[String]) -> Option<DateTime<Utc>> {
        let state = match self.state.get(key).await {
            Ok(s) => s?,
            Err(e) => {
                tracing::warn!("{}: cooldown state unreadable ({}); running anyway", key, e);
                return None;
            }
        };
        if state.disabled_until <= Utc::now() {
            return None;
        }
        if force.iter().any(|f| f == key) {
            tracing::warn!(
                "⚠️  {}: cooldown until {} overridden by --force",
                key,
                state.disabled_until
            );
            return None;
        }
        Some(state.disabled_until)
    }

    async fn start_cooldown(&self, key: &str, reason: &str, cooldown: Duration) {
        let state = SourceState {
            reason: reason.to_string(),
            disabled_until: Utc::now() + cooldown,
        };
        if let Err(e) = self.state.set(key, state).await {
            tracing::warn!("{}: could not persist cooldown: {}", key, e);
        }
    }
}
