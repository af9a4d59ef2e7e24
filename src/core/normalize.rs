use crate::airports::AirportResolver;
use crate::core::aircraft;
use crate::domain::model::{
    CanonicalLeg, FallbackCounters, RawLegCandidate, RejectReason, Rejection,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;

/// Marketing/boilerplate fragments and calendar abbreviations frequently
/// mis-captured as airport codes by the extraction heuristics.
pub static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "SIZE", "FULL", "LIKE", "FLY", "DATA", "EIO", "ONE", "WAY", "MENU", "NAV", "HOME", "MORE",
        "NEXT", "BACK", "PAGE", "CARD", "READ", "POST", "BLOG", "INFO", "TOP", "TIER", "OPT",
        "OUT", "RESERVE", "VIEW", "DETAILS", "NOW", "DAY", "DAYS", "CITY", "CITIES", "LEARN",
        "FROM", "WITH", "THIS", "JOIN", "CALL", "TEXT", "TEST", "HERO", "MAIN", "BOOK",
        "DISCOVER", "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV",
        "DEC", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN",
    ]
    .into_iter()
    .collect()
});

/// DOM-artifact fragments that mark a scraped id as structural noise.
const JUNK_ID_PARTS: &[&str] = &[
    "main-navigation",
    "header",
    "footer",
    "menu",
    "nav",
    "card",
    "js-slider",
    "slider",
];

/// Quick shape check used by the adapters before emitting a token as a
/// candidate code. The normalizer re-validates with the resolver.
pub fn is_likely_code(token: &str) -> bool {
    let t = token.trim().to_uppercase();
    if !(3..=4).contains(&t.len()) || !t.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    !STOP_WORDS.contains(t.as_str())
}

pub fn looks_like_junk_id(id: &str) -> bool {
    let lower = id.to_lowercase();
    JUNK_ID_PARTS.iter().any(|junk| lower.contains(junk))
}

static CURRENCY_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£]\s*(\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?").unwrap()
});

static BARE_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?\s*$").unwrap()
});

/// Pull a positive integer amount out of price text like `$12,500.00`.
/// A bare number is accepted only when it is the whole string, so dates
/// and seat counts in surrounding text never read as prices.
pub fn parse_price_text(text: &str) -> Option<i64> {
    let caps = CURRENCY_PRICE_RE
        .captures(text)
        .or_else(|| BARE_PRICE_RE.captures(text))?;
    let digits: String = caps.get(1)?.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
    let n: i64 = digits.parse().ok()?;
    (n > 0).then_some(n)
}

fn clean_price(raw: Option<f64>, raw_text: Option<&str>) -> Option<i64> {
    if let Some(n) = raw {
        if n.is_finite() && n > 0.0 {
            return Some(n.round() as i64);
        }
        return None;
    }
    raw_text.and_then(parse_price_text)
}

static TZ_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(UTC|GMT)\b").unwrap());

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%d-%m-%Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%a %d %b %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%a %d %b %Y",
    "%a, %d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
];

/// Flexible departure parser: ISO-8601 first, then epoch digits
/// disambiguated by magnitude, then the common textual formats upstream
/// sites use (UTC/GMT markers stripped). Date-only inputs become midnight
/// UTC. Total failure means "missing", never an error.
pub fn parse_date_flexible(text: &str) -> Option<DateTime<Utc>> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(n) = s.parse::<i64>() {
        if n > 0 {
            // > ~2001-09 in milliseconds; anything smaller is seconds.
            let ms = if n > 1_000_000_000_000 { n } else { n * 1000 };
            if let Some(dt) = Utc.timestamp_millis_opt(ms).single() {
                return Some(dt);
            }
        }
        return None;
    }

    let cleaned = TZ_MARKER_RE.replace_all(s, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

/// What to substitute when a departure timestamp could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartFallback {
    Now,
    TodayUtc,
    Fixed(DateTime<Utc>),
}

impl DepartFallback {
    pub fn resolve(&self) -> DateTime<Utc> {
        match self {
            DepartFallback::Now => Utc::now(),
            DepartFallback::TodayUtc => {
                let now = Utc::now();
                now.date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| Utc.from_utc_datetime(&dt))
                    .unwrap_or(now)
            }
            DepartFallback::Fixed(ts) => *ts,
        }
    }
}

impl FromStr for DepartFallback {
    type Err = String;

    /// `now` | `today` | `fixed:<RFC3339>`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "now" => Ok(DepartFallback::Now),
            "today" => Ok(DepartFallback::TodayUtc),
            other => {
                if let Some(iso) = other.strip_prefix("fixed:") {
                    DateTime::parse_from_rfc3339(iso)
                        .map(|dt| DepartFallback::Fixed(dt.with_timezone(&Utc)))
                        .map_err(|e| format!("bad fixed fallback timestamp '{}': {}", iso, e))
                } else {
                    Err(format!(
                        "unknown depart fallback '{}' (expected now | today | fixed:<RFC3339>)",
                        other
                    ))
                }
            }
        }
    }
}

/// Substitutions applied after a candidate is otherwise accepted, so every
/// persisted leg is schema-complete.
#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy {
    pub depart: DepartFallback,
    pub seats: i32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        // Seats default 1, not 0, so downstream consumers don't hide legs.
        Self {
            depart: DepartFallback::Now,
            seats: 1,
        }
    }
}

const DEPART_FALLBACK_NOTE: &str = "Departure estimated";
const PRICE_FALLBACK_NOTE: &str = "Contact for Price";

/// Turns one raw candidate into a canonical record or a rejection.
pub struct Normalizer<'a> {
    resolver: &'a AirportResolver,
    policy: FallbackPolicy,
}

struct ResolvedCode {
    iata: String,
    icao: Option<String>,
}

impl<'a> Normalizer<'a> {
    pub fn new(resolver: &'a AirportResolver, policy: FallbackPolicy) -> Self {
        Self { resolver, policy }
    }

    /// Ordered checks, each a possible rejection point; fallbacks applied
    /// only once a record is otherwise accepted.
    pub fn normalize(
        &self,
        raw: &RawLegCandidate,
        counters: &mut FallbackCounters,
    ) -> std::result::Result<CanonicalLeg, Rejection> {
        let reject = |reason: RejectReason, detail: String| Rejection {
            id: (!raw.id.is_empty()).then(|| raw.id.clone()),
            reason,
            detail,
        };

        // 1. Id presence and DOM-artifact patterns.
        let raw_id = raw.id.trim();
        if raw_id.is_empty() {
            return Err(reject(RejectReason::MissingId, "candidate has no id".into()));
        }
        if looks_like_junk_id(raw_id) {
            return Err(reject(
                RejectReason::JunkId,
                format!("id '{}' looks like a DOM artifact", raw_id),
            ));
        }

        // 2. Resolve route tokens.
        let origin = self.resolve_code(raw.origin.as_deref()).ok_or_else(|| {
            reject(
                RejectReason::UnresolvableCode,
                format!("bad origin ({})", raw.origin.as_deref().unwrap_or("")),
            )
        })?;
        let destination = self.resolve_code(raw.destination.as_deref()).ok_or_else(|| {
            reject(
                RejectReason::UnresolvableCode,
                format!("bad destination ({})", raw.destination.as_deref().unwrap_or("")),
            )
        })?;

        // 3. Self-loop.
        if origin.iata == destination.iata {
            return Err(reject(
                RejectReason::SelfLoopRoute,
                format!("origin equals destination ({})", origin.iata),
            ));
        }

        // 4–5. Departure and price; failures become "missing", not rejections.
        let parsed_depart = raw.departure_text.as_deref().and_then(parse_date_flexible);
        let parsed_price = clean_price(raw.price, raw.price_text.as_deref());

        // 6. Aircraft taxonomy.
        let ac_class = aircraft::classify(raw.aircraft.as_deref());
        let ac_type = raw
            .aircraft
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string();

        // 7. Display fields.
        let (from_city, from_name) = self.display_fields(&origin, raw.from_city.as_deref(), raw.from_name.as_deref());
        let (to_city, to_name) = self.display_fields(&destination, raw.to_city.as_deref(), raw.to_name.as_deref());

        // 8. Stable id from identifying fields (pre-fallback departure, so a
        // later re-scrape of the same leg reproduces the same id).
        let id = stable_id(raw, &origin.iata, &destination.iata, parsed_depart, &ac_type);

        // Fallback policy.
        let mut notes: Vec<String> = Vec::new();
        let depart_at = match parsed_depart {
            Some(dt) => dt,
            None => {
                counters.depart += 1;
                notes.push(DEPART_FALLBACK_NOTE.to_string());
                self.policy.depart.resolve()
            }
        };
        let price_usd = match parsed_price {
            Some(p) => p,
            None => {
                counters.price += 1;
                notes.push(PRICE_FALLBACK_NOTE.to_string());
                0
            }
        };
        let seats = match raw.seats {
            Some(s) if s >= 0 => s,
            _ => {
                counters.seats += 1;
                self.policy.seats
            }
        };

        Ok(CanonicalLeg {
            id,
            operator: normalize_operator(&raw.operator),
            from_iata: origin.iata,
            to_iata: destination.iata,
            from_icao: origin.icao,
            to_icao: destination.icao,
            from_city,
            to_city,
            from_name,
            to_name,
            depart_at,
            price_usd,
            ac_type,
            ac_class,
            seats,
            notes: (!notes.is_empty()).then(|| notes.join("\n")),
            url: raw.url.clone(),
        })
    }

    fn resolve_code(&self, token: Option<&str>) -> Option<ResolvedCode> {
        let t = token?.trim().to_uppercase();
        if t.is_empty() || !t.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        // Stop words are rejected regardless of letter count.
        if STOP_WORDS.contains(t.as_str()) {
            return None;
        }
        match t.len() {
            3 => {
                let icao = self.resolver.icao_for(&t);
                Some(ResolvedCode { iata: t, icao })
            }
            4 => {
                let iata = self.resolver.iata_for(&t)?;
                Some(ResolvedCode {
                    iata,
                    icao: Some(t),
                })
            }
            _ => None,
        }
    }

    fn display_fields(
        &self,
        code: &ResolvedCode,
        source_city: Option<&str>,
        source_name: Option<&str>,
    ) -> (String, String) {
        let record = self.resolver.airport(&code.iata);
        let city = source_city
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| record.map(|r| r.city.clone()).filter(|c| !c.is_empty()))
            .unwrap_or_else(|| code.iata.clone());
        let name = source_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| record.map(|r| r.name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| code.iata.clone());
        (city, name)
    }
}

/// Canonical operator tags; upstream sites spell themselves several ways.
pub fn normalize_operator(op: &str) -> String {
    let k = op.trim().to_lowercase();
    match k.as_str() {
        "xo" | "flyxo" | "fly xo" => "xo".to_string(),
        "magellan" | "magellan jets" => "magellan".to_string(),
        "flyvictor" | "fly victor" | "victor" => "flyvictor".to_string(),
        "globalair" | "global air charters" => "globalair".to_string(),
        "aviapages" | "avia pages" => "aviapages".to_string(),
        "airpartner" | "air partner" => "airpartner".to_string(),
        _ if !k.is_empty() => k,
        _ => op.to_string(),
    }
}

fn day_bucket(depart: Option<DateTime<Utc>>) -> String {
    depart
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "na".to_string())
}

/// Stable identity: durable upstream ids are combined with operator, route
/// and departure day; everything else gets a fixed-length content hash over
/// the identifying fields. The same logical leg re-scraped later maps to the
/// same id. Known limitation: two distinct legs sharing operator, route,
/// day and aircraft descriptor collide.
fn stable_id(
    raw: &RawLegCandidate,
    from: &str,
    to: &str,
    depart: Option<DateTime<Utc>>,
    ac_type: &str,
) -> String {
    let operator = normalize_operator(&raw.operator);
    let bucket = day_bucket(depart);
    if raw.id_is_durable {
        return format!("{}:{}:{}-{}:{}", operator, raw.id.trim(), from, to, bucket);
    }
    let depart_key = depart
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "na".to_string());
    let payload = format!("{}|{}|{}|{}|{}", operator, from, to, depart_key, ac_type);
    let digest = Sha256::digest(payload.as_bytes());
    format!("{}:{:x}", operator, digest)[..operator.len() + 17].to_string()
}
