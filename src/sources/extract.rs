//! Shared extraction helpers for the source adapters: HTTP session setup,
//! depth-bounded JSON traversal, and text-sweep heuristics.

use crate::core::normalize::is_likely_code;
use crate::domain::ports::ScrapeOptions;
use crate::utils::error::Result;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;

/// Upstream sites serve different markup to obvious bots.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Recursion guard for payloads with pathological nesting.
const MAX_JSON_DEPTH: usize = 12;

pub fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()?;
    Ok(client)
}

const ORIGIN_KEYS: &[&str] = &[
    "from",
    "origin",
    "fromAirport",
    "originAirport",
    "departureAirport",
    "from_airport",
    "origin_airport",
    "departure_airport",
    "start",
];

const DEST_KEYS: &[&str] = &[
    "to",
    "destination",
    "toAirport",
    "destinationAirport",
    "arrivalAirport",
    "to_airport",
    "destination_airport",
    "arrival_airport",
    "end",
];

const LEG_ARRAY_KEYS: &[&str] = &[
    "data", "results", "flights", "offers", "legs", "deals", "items", "emptyLegs",
];

/// Pull an airport code out of a JSON field: either a bare string or a
/// nested object carrying `iata`/`icao`/`code`.
pub fn extract_code(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            is_likely_code(s).then(|| s.to_uppercase())
        }
        Value::Object(map) => ["iata", "iataCode", "icao", "icaoCode", "code", "airportCode"]
            .iter()
            .find_map(|k| map.get(*k).and_then(extract_code)),
        _ => None,
    }
}

/// Find an origin/destination pair anywhere in `value`, recursing
/// depth-first down to a bounded depth. An object's own keys are checked
/// before its children; the first object that yields both sides wins.
pub fn route_in_value(value: &Value) -> Option<(String, String)> {
    route_in_value_at(value, 0)
}

fn route_in_value_at(value: &Value, depth: usize) -> Option<(String, String)> {
    if depth > MAX_JSON_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            let origin = ORIGIN_KEYS.iter().find_map(|k| map.get(*k).and_then(extract_code));
            let dest = DEST_KEYS.iter().find_map(|k| map.get(*k).and_then(extract_code));
            if let (Some(o), Some(d)) = (origin, dest) {
                return Some((o, d));
            }
            map.values().find_map(|v| route_in_value_at(v, depth + 1))
        }
        Value::Array(items) => items.iter().find_map(|v| route_in_value_at(v, depth + 1)),
        _ => None,
    }
}

/// Collect the arrays most likely to hold one-leg-per-element payloads,
/// searching under the conventional collection keys at any bounded depth.
pub fn leg_arrays(value: &Value) -> Vec<&Value> {
    let mut found = Vec::new();
    collect_leg_arrays(value, 0, &mut found);
    found
}

fn collect_leg_arrays<'a>(value: &'a Value, depth: usize, out: &mut Vec<&'a Value>) {
    if depth > MAX_JSON_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if v.is_array() && LEG_ARRAY_KEYS.contains(&key.as_str()) {
                    out.push(v);
                }
                collect_leg_arrays(v, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_leg_arrays(v, depth + 1, out);
            }
        }
        _ => {}
    }
}

static ROUTE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{3,4})\s*(?:→|->|–|—|-|\bto\b)\s*([A-Z]{3,4})\b").unwrap()
});

/// Last-resort text sweep: scan visible text for `AAA → BBB` shaped pairs,
/// filtering both sides through the stop-word list.
pub fn sweep_route_pairs(text: &str) -> Vec<(String, String)> {
    ROUTE_PAIR_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let from = caps.get(1)?.as_str();
            let to = caps.get(2)?.as_str();
            (is_likely_code(from) && is_likely_code(to))
                .then(|| (from.to_uppercase(), to.to_uppercase()))
        })
        .collect()
}

static DATE_LIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2})?(?:Z|[+-]\d{2}:?\d{2})?)?|\d{1,2}/\d{1,2}/\d{4}|(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]* \d{1,2},? \d{4}",
    )
    .unwrap()
});

/// First date-shaped substring in a blob of card text, if any.
pub fn first_date_like(text: &str) -> Option<String> {
    DATE_LIKE_RE.find(text).map(|m| m.as_str().to_string())
}

static SEATS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:(\d{1,2})\s*(?:seats?|pax|passengers?)\b|\bseats?\s*:?\s*(\d{1,2})\b)")
        .unwrap()
});

pub fn first_seats(text: &str) -> Option<i32> {
    SEATS_RE
        .captures(text)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|n| *n > 0)
}

/// Fetch a sequence of result pages, stopping early when a page fails or
/// stops contributing new bytes. Page 1 failure is the caller's problem;
/// expansion pages are best-effort.
pub async fn fetch_paged(
    client: &reqwest::Client,
    base_url: &str,
    max_pages: usize,
) -> Result<Vec<String>> {
    let mut pages = Vec::new();
    let first = client.get(base_url).send().await?.error_for_status()?;
    pages.push(first.text().await?);

    for page in 2..=max_pages {
        let sep = if base_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}page={}", base_url, sep, page);
        let body = match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(b) => b,
                Err(_) => break,
            },
            _ => break,
        };
        // No growth means the site is echoing the last page back.
        if body.len() <= pages.last().map(|p| p.len() / 2).unwrap_or(0) || Some(&body) == pages.last() {
            break;
        }
        pages.push(body);
    }
    Ok(pages)
}

/// Write a raw capture under the run's tmp dir for offline inspection.
/// Failures are logged and swallowed; artifacts never affect the run.
pub async fn dump_artifact(opts: &ScrapeOptions, source: &str, label: &str, content: &str) {
    if !opts.dump_artifacts {
        return;
    }
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let path = opts.tmp_dir.join(format!("{}-{}-{}.txt", source, label, stamp));
    if let Err(e) = tokio::fs::create_dir_all(&opts.tmp_dir).await {
        tracing::debug!("artifact dir {} not writable: {}", opts.tmp_dir.display(), e);
        return;
    }
    if let Err(e) = tokio::fs::write(&path, content).await {
        tracing::debug!("artifact dump {} failed: {}", path.display(), e);
    }
}
