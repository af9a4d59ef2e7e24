use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One candidate listing as captured from an upstream, before any cleaning.
/// Adapters map their own upstream shape into this at the boundary; nothing
/// deeper in the pipeline sees raw payloads.
#[derive(Debug, Clone, Default)]
pub struct RawLegCandidate {
    /// Upstream or synthesized identifier. May be empty (rejected later).
    pub id: String,
    /// True when `id` is a durable upstream identifier, false when it was
    /// synthesized from page structure or swept text.
    pub id_is_durable: bool,
    pub operator: String,
    /// Free-form origin/destination tokens: codes, city names, or noise.
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Raw departure/arrival text: ISO, epoch digits, or prose.
    pub departure_text: Option<String>,
    pub arrival_text: Option<String>,
    pub price: Option<f64>,
    pub price_text: Option<String>,
    pub aircraft: Option<String>,
    pub seats: Option<i32>,
    pub from_city: Option<String>,
    pub to_city: Option<String>,
    pub from_name: Option<String>,
    pub to_name: Option<String>,
    pub url: String,
    /// Opaque source metadata, kept only for artifact dumps.
    pub meta: Option<serde_json::Value>,
}

/// Aircraft class buckets used across the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcClass {
    Light,
    Midsize,
    SuperMidsize,
    Heavy,
    Turboprop,
    Unknown,
}

impl AcClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcClass::Light => "Light",
            AcClass::Midsize => "Midsize",
            AcClass::SuperMidsize => "Super-Midsize",
            AcClass::Heavy => "Heavy",
            AcClass::Turboprop => "Turboprop",
            AcClass::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AcClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AcClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "Light" => AcClass::Light,
            "Midsize" => AcClass::Midsize,
            "Super-Midsize" => AcClass::SuperMidsize,
            "Heavy" => AcClass::Heavy,
            "Turboprop" => AcClass::Turboprop,
            _ => AcClass::Unknown,
        })
    }
}

/// The normalized, persisted representation of one empty-leg listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalLeg {
    pub id: String,
    pub operator: String,
    pub from_iata: String,
    pub to_iata: String,
    pub from_icao: Option<String>,
    pub to_icao: Option<String>,
    pub from_city: String,
    pub to_city: String,
    pub from_name: String,
    pub to_name: String,
    pub depart_at: DateTime<Utc>,
    pub price_usd: i64,
    pub ac_type: String,
    pub ac_class: AcClass,
    pub seats: i32,
    pub notes: Option<String>,
    /// Kept for logs and debugging only, never persisted.
    pub url: String,
}

impl CanonicalLeg {
    /// Field-level equality over everything the store persists (`url` is
    /// debug-only and excluded).
    pub fn persist_eq(&self, other: &CanonicalLeg) -> bool {
        self.id == other.id
            && self.operator == other.operator
            && self.from_iata == other.from_iata
            && self.to_iata == other.to_iata
            && self.from_icao == other.from_icao
            && self.to_icao == other.to_icao
            && self.from_city == other.from_city
            && self.to_city == other.to_city
            && self.from_name == other.from_name
            && self.to_name == other.to_name
            && self.depart_at == other.depart_at
            && self.price_usd == other.price_usd
            && self.ac_type == other.ac_type
            && self.ac_class == other.ac_class
            && self.seats == other.seats
            && self.notes == other.notes
    }
}

/// Read-only reference data for one airport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirportRecord {
    pub iata: String,
    pub icao: String,
    pub city: String,
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

/// Cooldown entry for one source; persisted across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceState {
    pub reason: String,
    pub disabled_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    MissingId,
    JunkId,
    UnresolvableCode,
    SelfLoopRoute,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingId => "missing-id",
            RejectReason::JunkId => "junk-id",
            RejectReason::UnresolvableCode => "unresolvable-code",
            RejectReason::SelfLoopRoute => "self-loop-route",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate the sanitizer dropped, with a machine-readable reason.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub id: Option<String>,
    pub reason: RejectReason,
    pub detail: String,
}

/// One row the persistence engine could not write; the full payload is kept
/// so the row can be replayed offline.
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub leg: CanonicalLeg,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct SaveSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<RowFailure>,
}

/// Run-scoped counts of fallback substitutions, threaded through the
/// normalizer instead of process-global "log once" flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackCounters {
    pub depart: usize,
    pub price: usize,
    pub seats: usize,
}

impl FallbackCounters {
    pub fn any(&self) -> bool {
        self.depart > 0 || self.price > 0 || self.seats > 0
    }
}
