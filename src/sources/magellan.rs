use crate::core::normalize::is_likely_code;
use crate::domain::model::RawLegCandidate;
use crate::domain::ports::{ScrapeOptions, Source};
use crate::sources::extract;
use crate::utils::error::Result;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

const DEFAULT_BASE_URL: &str = "https://magellanjets.com";
const MAX_PAGES: usize = 10;

/// JSON endpoints WordPress installs commonly expose the listings under.
const WP_REST_PROBES: &[&str] = &[
    "/wp-json/wp/v2/empty_legs?per_page=100",
    "/wp-json/wp/v2/empty-legs?per_page=100",
    "/wp-admin/admin-ajax.php?action=get_empty_legs",
];

static INLINE_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)var\s+emptyLegs\s*=\s*(\[.*?\])\s*;"#).unwrap()
});

static LD_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*type="application/ld\+json"[^>]*>(.*?)</script>"#).unwrap()
});

static PAREN_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([A-Za-z]{3,4})\)[^()]{0,160}?\(([A-Za-z]{3,4})\)").unwrap()
});

static CARD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".empty-leg, .empty-legs__item, article.card, li.deal, div.deal-card").unwrap()
});

/// Magellan Jets. A WordPress site: JSON endpoints when they exist, embedded
/// script data and rendered cards otherwise.
pub struct MagellanSource {
    client: reqwest::Client,
    base_url: String,
}

impl MagellanSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: extract::http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn try_wp_rest(&self) -> Option<Vec<RawLegCandidate>> {
        for probe in WP_REST_PROBES {
            let url = format!("{}{}", self.base_url, probe);
            let resp = match self.client.get(&url).send().await {
                Ok(r) if r.status().is_success() => r,
                _ => continue,
            };
            let value: Value = match resp.json().await {
                Ok(v) => v,
                Err(_) => continue,
            };
            let candidates = candidates_from_json(&value, &self.base_url);
            if !candidates.is_empty() {
                tracing::debug!("magellan: wp-rest probe {} hit ({} rows)", probe, candidates.len());
                return Some(candidates);
            }
        }
        None
    }
}

#[async_trait]
impl Source for MagellanSource {
    fn key(&self) -> &'static str {
        "magellan"
    }

    async fn scrape(&self, opts: &ScrapeOptions) -> Result<Vec<RawLegCandidate>> {
        if let Some(found) = self.try_wp_rest().await {
            return Ok(found);
        }

        let listing_url = format!("{}/empty-legs/", self.base_url);
        let pages = extract::fetch_paged(&self.client, &listing_url, MAX_PAGES).await?;
        extract::dump_artifact(opts, self.key(), "listing", pages.first().map(String::as_str).unwrap_or("")).await;

        let mut out = Vec::new();
        for page in &pages {
            if let Some(found) = candidates_from_inline_data(page, &self.base_url) {
                out.extend(found);
                continue;
            }
            let cards = candidates_from_cards(page, &self.base_url);
            if !cards.is_empty() {
                out.extend(cards);
                continue;
            }
            out.extend(candidates_from_text_sweep(page, &self.base_url));
        }
        Ok(out)
    }
}

fn candidates_from_json(value: &Value, page_url: &str) -> Vec<RawLegCandidate> {
    let arrays = extract::leg_arrays(value);
    let items: Vec<&Value> = if arrays.is_empty() {
        match value {
            Value::Array(items) => items.iter().collect(),
            _ => Vec::new(),
        }
    } else {
        arrays
            .iter()
            .flat_map(|a| a.as_array().into_iter().flatten())
            .collect()
    };

    items
        .iter()
        .filter_map(|item| {
            let (origin, destination) = extract::route_in_value(item)?;
            let obj = item.as_object();
            let id = obj
                .and_then(|o| o.get("id"))
                .map(json_scalar_string)
                .unwrap_or_default();
            let text = item.to_string();
            Some(RawLegCandidate {
                id,
                id_is_durable: false,
                operator: "magellan".to_string(),
                origin: Some(origin),
                destination: Some(destination),
                departure_text: obj
                    .and_then(|o| {
                        ["date", "departure", "depart_date", "departure_date"]
                            .iter()
                            .find_map(|k| o.get(*k))
                    })
                    .map(json_scalar_string)
                    .or_else(|| extract::first_date_like(&text)),
                price_text: obj
                    .and_then(|o| o.get("price").or_else(|| o.get("price_text")))
                    .map(json_scalar_string),
                aircraft: obj
                    .and_then(|o| o.get("aircraft").or_else(|| o.get("aircraft_type")))
                    .map(json_scalar_string),
                seats: extract::first_seats(&text),
                url: page_url.to_string(),
                ..Default::default()
            })
        })
        .collect()
}

fn json_scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn candidates_from_inline_data(page: &str, page_url: &str) -> Option<Vec<RawLegCandidate>> {
    for re in [&*INLINE_DATA_RE, &*LD_JSON_RE] {
        for caps in re.captures_iter(page) {
            let blob = caps.get(1)?.as_str();
            if let Ok(value) = serde_json::from_str::<Value>(blob) {
                let found = candidates_from_json(&value, page_url);
                if !found.is_empty() {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Rendered card markup: a route shows up as two parenthesised codes, the
/// rest is picked out of the card's visible text.
fn candidates_from_cards(page: &str, page_url: &str) -> Vec<RawLegCandidate> {
    let doc = Html::parse_document(page);
    let mut out = Vec::new();

    for (index, card) in doc.select(&CARD_SELECTOR).enumerate() {
        let text = card.text().collect::<Vec<_>>().join(" ");
        let route = PAREN_PAIR_RE
            .captures(&text)
            .and_then(|caps| {
                let from = caps.get(1)?.as_str();
                let to = caps.get(2)?.as_str();
                (is_likely_code(from) && is_likely_code(to))
                    .then(|| (from.to_uppercase(), to.to_uppercase()))
            })
            .or_else(|| extract::sweep_route_pairs(&text).into_iter().next());
        let Some((origin, destination)) = route else {
            continue;
        };

        let id = card
            .value()
            .attr("data-id")
            .or_else(|| card.value().attr("id"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("magellan-listing-{}", index));

        out.push(RawLegCandidate {
            id,
            id_is_durable: false,
            operator: "magellan".to_string(),
            origin: Some(origin),
            destination: Some(destination),
            departure_text: extract::first_date_like(&text),
            price_text: text.contains('$').then(|| text.clone()),
            aircraft: aircraft_snippet(&text),
            seats: extract::first_seats(&text),
            url: page_url.to_string(),
            ..Default::default()
        });
    }
    out
}

static AIRCRAFT_SNIPPET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(Gulfstream|Global|Falcon|Challenger|Citation|Learjet|Lear|Hawker|Phenom|Praetor|Legacy|King Air|Pilatus|PC-?12|HondaJet)\b[\w+ /-]{0,24}",
    )
    .unwrap()
});

fn aircraft_snippet(text: &str) -> Option<String> {
    AIRCRAFT_SNIPPET_RE
        .find(text)
        .map(|m| m.as_str().trim().to_string())
}

fn candidates_from_text_sweep(page: &str, page_url: &str) -> Vec<RawLegCandidate> {
    extract::sweep_route_pairs(page)
        .into_iter()
        .enumerate()
        .map(|(index, (origin, destination))| RawLegCandidate {
            id: format!("magellan-sweep-{}-{}-{}", origin, destination, index),
            id_is_durable: false,
            operator: "magellan".to_string(),
            origin: Some(origin),
            destination: Some(destination),
            url: page_url.to_string(),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cards_parsed_from_markup() {
        let page = r#"
            <html><body>
              <div class="deal-card" data-id="dc-77">
                Teterboro (KTEB) to Opa-locka (KOPF)
                Oct 10, 2025 · Challenger 300 · $4,900 · 8 seats
              </div>
              <div class="deal-card">No route in this one</div>
            </body></html>"#;
        let found = candidates_from_cards(page, "https://magellanjets.com/empty-legs/");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "dc-77");
        assert_eq!(found[0].origin.as_deref(), Some("KTEB"));
        assert_eq!(found[0].destination.as_deref(), Some("KOPF"));
        assert_eq!(found[0].departure_text.as_deref(), Some("Oct 10, 2025"));
        assert_eq!(found[0].aircraft.as_deref(), Some("Challenger 300"));
        assert_eq!(found[0].seats, Some(8));
    }

    #[test]
    fn test_inline_script_data_preferred() {
        let page = r#"<script>var emptyLegs = [{"from":"TEB","to":"OPF","date":"2025-10-10","price":"$4,900"}];</script>"#;
        let found = candidates_from_inline_data(page, "u").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].origin.as_deref(), Some("TEB"));
        assert_eq!(found[0].departure_text.as_deref(), Some("2025-10-10"));
    }

    #[test]
    fn test_wp_rest_payload_mapping() {
        let value: Value = serde_json::from_str(
            r#"[{"id": 42, "origin": "KTEB", "destination": "KOPF", "date": "2025-10-10"}]"#,
        )
        .unwrap();
        let found = candidates_from_json(&value, "u");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "42");
        assert_eq!(found[0].origin.as_deref(), Some("KTEB"));
    }

    #[test]
    fn test_text_sweep_fallback() {
        let found = candidates_from_text_sweep("Fly TEB → OPF tomorrow", "u");
        assert_eq!(found.len(), 1);
        assert!(found[0].id.contains("sweep"));
    }
}
