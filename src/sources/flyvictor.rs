use crate::airports::AirportResolver;
use crate::domain::model::RawLegCandidate;
use crate::domain::ports::{ScrapeOptions, Source};
use crate::sources::extract;
use crate::utils::error::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::{Arc, LazyLock};

const DEFAULT_BASE_URL: &str = "https://www.flyvictor.com";

const API_PROBES: &[&str] = &[
    "/api/v1/empty-legs",
    "/api/empty-legs",
    "/empty-legs.json",
];

static RESULT_CARD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".empty-leg-result, .search-result, li.result, article.flight-card").unwrap()
});

/// Fly Victor. Listings use ICAO codes; the resolver maps them to IATA
/// during normalization, this adapter just captures the tokens.
pub struct FlyVictorSource {
    client: reqwest::Client,
    base_url: String,
    // Held for parity with the other airport-aware adapter; Fly Victor
    // markup occasionally drops codes and names cities only.
    resolver: Arc<AirportResolver>,
}

impl FlyVictorSource {
    pub fn new(resolver: Arc<AirportResolver>) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, resolver)
    }

    pub fn with_base_url(base_url: impl Into<String>, resolver: Arc<AirportResolver>) -> Result<Self> {
        Ok(Self {
            client: extract::http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resolver,
        })
    }

    fn listing_url(&self) -> String {
        format!("{}/empty-legs", self.base_url)
    }

    async fn try_api(&self) -> Option<Vec<RawLegCandidate>> {
        for probe in API_PROBES {
            let url = format!("{}{}", self.base_url, probe);
            let value: Value = match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json().await {
                    Ok(v) => v,
                    Err(_) => continue,
                },
                _ => continue,
            };
            let found = self.candidates_from_json(&value);
            if !found.is_empty() {
                tracing::debug!("flyvictor: api probe {} hit ({} rows)", probe, found.len());
                return Some(found);
            }
        }
        None
    }

    fn candidates_from_json(&self, value: &Value) -> Vec<RawLegCandidate> {
        let arrays = extract::leg_arrays(value);
        let items: Vec<&Value> = if arrays.is_empty() {
            value.as_array().map(|a| a.iter().collect()).unwrap_or_default()
        } else {
            arrays
                .iter()
                .flat_map(|a| a.as_array().into_iter().flatten())
                .collect()
        };

        items
            .iter()
            .filter_map(|item| {
                let (origin, destination) = extract::route_in_value(item)
                    .or_else(|| self.route_from_cities(item))?;
                let obj = item.as_object()?;
                let text = item.to_string();
                let id = obj.get("id").map(scalar_string).unwrap_or_default();
                let id_is_durable = !id.is_empty();
                Some(RawLegCandidate {
                    id,
                    id_is_durable,
                    operator: "flyvictor".to_string(),
                    origin: Some(origin),
                    destination: Some(destination),
                    departure_text: obj
                        .get("departure")
                        .or_else(|| obj.get("departureDate"))
                        .or_else(|| obj.get("date"))
                        .map(scalar_string)
                        .or_else(|| extract::first_date_like(&text)),
                    price_text: obj.get("price").map(scalar_string),
                    aircraft: obj
                        .get("aircraft")
                        .or_else(|| obj.get("aircraftType"))
                        .map(scalar_string),
                    seats: obj
                        .get("seats")
                        .and_then(Value::as_i64)
                        .map(|n| n as i32)
                        .or_else(|| extract::first_seats(&text)),
                    url: self.listing_url(),
                    ..Default::default()
                })
            })
            .collect()
    }

    fn route_from_cities(&self, item: &Value) -> Option<(String, String)> {
        let obj = item.as_object()?;
        let from = obj.get("fromCity").and_then(Value::as_str)?;
        let to = obj.get("toCity").and_then(Value::as_str)?;
        Some((self.resolver.iata_for_city(from)?, self.resolver.iata_for_city(to)?))
    }
}

#[async_trait]
impl Source for FlyVictorSource {
    fn key(&self) -> &'static str {
        "flyvictor"
    }

    async fn scrape(&self, opts: &ScrapeOptions) -> Result<Vec<RawLegCandidate>> {
        if let Some(found) = self.try_api().await {
            return Ok(found);
        }

        let resp = self.client.get(self.listing_url()).send().await?.error_for_status()?;
        let html = resp.text().await?;
        extract::dump_artifact(opts, self.key(), "listing", &html).await;

        let cards = candidates_from_cards(&html, &self.listing_url());
        if !cards.is_empty() {
            return Ok(cards);
        }

        Ok(extract::sweep_route_pairs(&html)
            .into_iter()
            .enumerate()
            .map(|(index, (origin, destination))| RawLegCandidate {
                id: format!("flyvictor-sweep-{}-{}-{}", origin, destination, index),
                id_is_durable: false,
                operator: "flyvictor".to_string(),
                origin: Some(origin),
                destination: Some(destination),
                url: self.listing_url(),
                ..Default::default()
            })
            .collect())
    }
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Result cards carry prose labels: `Departure: Mon 3 Feb 2025`,
/// `Seats: 6`, `Price from $4,900`.
fn candidates_from_cards(html: &str, page_url: &str) -> Vec<RawLegCandidate> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();

    for (index, card) in doc.select(&RESULT_CARD_SELECTOR).enumerate() {
        let text = card.text().collect::<Vec<_>>().join(" ");
        let Some((origin, destination)) = extract::sweep_route_pairs(&text).into_iter().next() else {
            continue;
        };
        let departure_text = text
            .split("Departure:")
            .nth(1)
            .and_then(|rest| rest.split('·').next())
            .map(|snippet| snippet.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| extract::first_date_like(&text));

        out.push(RawLegCandidate {
            id: card
                .value()
                .attr("data-id")
                .map(str::to_string)
                .unwrap_or_else(|| format!("flyvictor-listing-{}", index)),
            id_is_durable: false,
            operator: "flyvictor".to_string(),
            origin: Some(origin),
            destination: Some(destination),
            departure_text,
            price_text: text.contains('$').then(|| text.clone()),
            aircraft: None,
            seats: extract::first_seats(&text),
            url: page_url.to_string(),
            ..Default::default()
        });
    }
    out
}
