use crate::domain::model::RawLegCandidate;
use crate::domain::ports::{ScrapeOptions, Source};
use crate::sources::extract;
use crate::utils::error::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

const DEFAULT_BASE_URL: &str = "https://aviapages.com";
const BOARD_PATH: &str = "/charter_at_hand/";

/// JSON endpoints the availability board has been seen loading its rows from.
const API_PROBES: &[&str] = &[
    "/charter_at_hand/availability/",
    "/api/charter_at_hand/availability/",
];

static INLINE_AVAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)var\s+availability_data\s*=\s*(\[.*?\])\s*;").unwrap()
});

/// One row of the availability feed. The inline blob uses Django-style
/// double-underscore names; XHR payloads use flat snake case. Aliases cover
/// both.
#[derive(Debug, Deserialize)]
struct AvailabilityRow {
    #[serde(default, alias = "dep_airport__iata", alias = "from_iata")]
    dep_iata: Option<String>,
    #[serde(default, alias = "dep_airport__icao", alias = "from_icao")]
    dep_icao: Option<String>,
    #[serde(default, alias = "arr_airport__iata", alias = "to_iata")]
    arr_iata: Option<String>,
    #[serde(default, alias = "arr_airport__icao", alias = "to_icao")]
    arr_icao: Option<String>,
    #[serde(default, alias = "date_from", alias = "depart_at", alias = "etd")]
    departure: Option<Value>,
    #[serde(
        default,
        alias = "aircraft__aircraft_type__name",
        alias = "aircraft_type__name",
        alias = "aircraft_type"
    )]
    aircraft: Option<String>,
    #[serde(default, alias = "aircraft__registration_number", alias = "tail")]
    registration: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default, alias = "dep_airport__name", alias = "from_city")]
    dep_name: Option<String>,
    #[serde(default, alias = "arr_airport__name", alias = "to_city")]
    arr_name: Option<String>,
}

/// Aviapages charter-at-hand board. The rows ship as an inline
/// `availability_data` script variable; JSON probes and a text sweep cover
/// the other shapes the board has served.
pub struct AviapagesSource {
    client: reqwest::Client,
    base_url: String,
}

impl AviapagesSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: extract::http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn board_url(&self) -> String {
        format!("{}{}", self.base_url, BOARD_PATH)
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
            let found = self.candidates_from_payload(&value);
            if !found.is_empty() {
                tracing::debug!("aviapages: api probe {} hit ({} rows)", probe, found.len());
                return Some(found);
            }
        }
        None
    }

    fn candidates_from_payload(&self, value: &Value) -> Vec<RawLegCandidate> {
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
            .enumerate()
            .filter_map(|(index, item)| self.candidate_from_row(item, index))
            .collect()
    }

    fn candidate_from_row(&self, item: &Value, index: usize) -> Option<RawLegCandidate> {
        let row: AvailabilityRow = serde_json::from_value((*item).clone()).ok()?;
        let origin = row.dep_iata.filter(|s| !s.is_empty()).or(row.dep_icao);
        let destination = row.arr_iata.filter(|s| !s.is_empty()).or(row.arr_icao);
        if origin.is_none() && destination.is_none() {
            // Not an availability row; the generic route walk gets one try.
            let (o, d) = extract::route_in_value(item)?;
            return Some(RawLegCandidate {
                id: format!("aviapages-row-{}", index),
                id_is_durable: false,
                operator: "aviapages".to_string(),
                origin: Some(o),
                destination: Some(d),
                departure_text: extract::first_date_like(&item.to_string()),
                url: self.board_url(),
                ..Default::default()
            });
        }
        Some(RawLegCandidate {
            id: format!("aviapages-row-{}", index),
            id_is_durable: false,
            operator: "aviapages".to_string(),
            origin,
            destination,
            departure_text: row.departure.as_ref().map(scalar_string),
            price_text: row.price.as_ref().map(scalar_string),
            aircraft: row.aircraft.or(row.registration),
            from_city: row.dep_name,
            to_city: row.arr_name,
            url: self.board_url(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Source for AviapagesSource {
    fn key(&self) -> &'static str {
        "aviapages"
    }

    async fn scrape(&self, opts: &ScrapeOptions) -> Result<Vec<RawLegCandidate>> {
        if let Some(found) = self.try_api().await {
            return Ok(found);
        }

        let resp = self.client.get(self.board_url()).send().await?.error_for_status()?;
        let html = resp.text().await?;
        extract::dump_artifact(opts, self.key(), "board", &html).await;

        if let Some(caps) = INLINE_AVAIL_RE.captures(&html) {
            if let Ok(value) = serde_json::from_str::<Value>(caps.get(1).map(|m| m.as_str()).unwrap_or(""))
            {
                let found = self.candidates_from_payload(&value);
                if !found.is_empty() {
                    return Ok(found);
                }
            }
        }

        Ok(extract::sweep_route_pairs(&html)
            .into_iter()
            .enumerate()
            .map(|(index, (origin, destination))| RawLegCandidate {
                id: format!("aviapages-sweep-{}-{}-{}", origin, destination, index),
                id_is_durable: false,
                operator: "aviapages".to_string(),
                origin: Some(origin),
                destination: Some(destination),
                url: self.board_url(),
                ..Default::default()
            })
            .collect())
    }
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
