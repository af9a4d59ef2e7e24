use crate::airports::AirportResolver;
use crate::domain::model::RawLegCandidate;
use crate::domain::ports::{ScrapeOptions, Source};
use crate::sources::extract;
use crate::utils::error::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

const DEFAULT_BASE_URL: &str = "https://flyxo.com";
const DEALS_API_PATH: &str = "/api/deals/getDealsList";
const DEALS_PAGE_PATH: &str = "/empty-legs";

/// Business-aviation airports for cities where the commercial hub is the
/// wrong guess; checked before the general city index.
const BIZJET_OVERRIDES: &[(&str, &str)] = &[
    ("new york", "TEB"),
    ("teterboro", "TEB"),
    ("miami", "OPF"),
    ("los angeles", "VNY"),
    ("chicago", "PWK"),
    ("dallas", "DAL"),
    ("washington", "IAD"),
    ("london", "LTN"),
    ("paris", "LBG"),
    ("west palm beach", "PBI"),
];

static BUILD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""buildId":"([^"]+)""#).unwrap());

static NEXT_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).unwrap()
});

/// Shape of one entry in the deals API response. Fields the upstream drops
/// simply deserialize to `None`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XoDeal {
    id: Value,
    #[serde(alias = "from", alias = "fromCityName")]
    from_city: Option<String>,
    #[serde(alias = "to", alias = "toCityName")]
    to_city: Option<String>,
    #[serde(alias = "fromAirportCode")]
    from_code: Option<String>,
    #[serde(alias = "toAirportCode")]
    to_code: Option<String>,
    #[serde(alias = "date", alias = "departureDate")]
    departure: Option<Value>,
    price: Option<Value>,
    #[serde(alias = "aircraftType", alias = "aircraftCategory")]
    aircraft: Option<String>,
    seats: Option<i32>,
}

/// XO. A Next.js app with a first-party deals API; deal ids are durable.
pub struct XoSource {
    client: reqwest::Client,
    base_url: String,
    resolver: Arc<AirportResolver>,
}

impl XoSource {
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

    fn page_url(&self) -> String {
        format!("{}{}", self.base_url, DEALS_PAGE_PATH)
    }

    /// Map a deals-API payload to candidates, resolving city names to codes
    /// where the API omits them.
    fn map_deals(&self, deals: Vec<XoDeal>) -> Vec<RawLegCandidate> {
        deals
            .into_iter()
            .filter_map(|deal| {
                let id = scalar_string(&deal.id);
                if id.is_empty() {
                    return None;
                }
                let origin = deal
                    .from_code
                    .clone()
                    .or_else(|| self.city_to_code(deal.from_city.as_deref()));
                let destination = deal
                    .to_code
                    .clone()
                    .or_else(|| self.city_to_code(deal.to_city.as_deref()));
                Some(RawLegCandidate {
                    id,
                    id_is_durable: true,
                    operator: "xo".to_string(),
                    origin,
                    destination,
                    // Bucketed to the date so re-listings keep their identity.
                    departure_text: deal.departure.as_ref().map(midnight_bucket),
                    price_text: deal.price.as_ref().map(scalar_string),
                    aircraft: deal.aircraft.clone(),
                    seats: deal.seats,
                    from_city: deal.from_city,
                    to_city: deal.to_city,
                    url: self.page_url(),
                    ..Default::default()
                })
            })
            .collect()
    }

    fn city_to_code(&self, city: Option<&str>) -> Option<String> {
        let city = city?.trim();
        if city.is_empty() {
            return None;
        }
        let key = city.to_lowercase();
        BIZJET_OVERRIDES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, code)| code.to_string())
            .or_else(|| self.resolver.iata_for_city(city))
    }

    /// Per-deal Next.js data probe for deals still missing a route. Probe
    /// failures leave the candidate as-is; the sanitizer decides its fate.
    async fn enrich_routes(&self, page_html: &str, candidates: &mut [RawLegCandidate]) {
        let Some(build_id) = BUILD_ID_RE
            .captures(page_html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return;
        };
        for candidate in candidates
            .iter_mut()
            .filter(|c| c.origin.is_none() || c.destination.is_none())
        {
            let url = format!(
                "{}/_next/data/{}{}/{}.json",
                self.base_url, build_id, DEALS_PAGE_PATH, candidate.id
            );
            let value: Value = match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => match resp.json().await {
                    Ok(v) => v,
                    Err(_) => continue,
                },
                _ => continue,
            };
            if let Some((origin, destination)) = extract::route_in_value(&value) {
                candidate.origin.get_or_insert(origin);
                candidate.destination.get_or_insert(destination);
            }
        }
    }
}

#[async_trait]
impl Source for XoSource {
    fn key(&self) -> &'static str {
        "xo"
    }

    async fn scrape(&self, opts: &ScrapeOptions) -> Result<Vec<RawLegCandidate>> {
        let api_url = format!("{}{}", self.base_url, DEALS_API_PATH);
        if let Ok(resp) = self.client.get(&api_url).send().await {
            if resp.status().is_success() {
                if let Ok(value) = resp.json::<Value>().await {
                    let deals = deals_from_payload(&value);
                    if !deals.is_empty() {
                        let mut candidates = self.map_deals(deals);
                        if candidates.iter().any(|c| c.origin.is_none() || c.destination.is_none()) {
                            if let Ok(page) = self.client.get(self.page_url()).send().await {
                                if let Ok(html) = page.text().await {
                                    self.enrich_routes(&html, &mut candidates).await;
                                }
                            }
                        }
                        return Ok(candidates);
                    }
                }
            }
        }

        // API gone: fall back to the rendered page.
        let resp = self.client.get(self.page_url()).send().await?.error_for_status()?;
        let html = resp.text().await?;
        extract::dump_artifact(opts, self.key(), "deals-page", &html).await;

        if let Some(caps) = NEXT_DATA_RE.captures(&html) {
            if let Ok(value) = serde_json::from_str::<Value>(caps.get(1).map(|m| m.as_str()).unwrap_or("")) {
                let deals = deals_from_payload(&value);
                if !deals.is_empty() {
                    return Ok(self.map_deals(deals));
                }
            }
        }

        Ok(extract::sweep_route_pairs(&html)
            .into_iter()
            .enumerate()
            .map(|(index, (origin, destination))| RawLegCandidate {
                id: format!("xo-sweep-{}-{}-{}", origin, destination, index),
                id_is_durable: false,
                operator: "xo".to_string(),
                origin: Some(origin),
                destination: Some(destination),
                url: self.page_url(),
                ..Default::default()
            })
            .collect())
    }
}

fn deals_from_payload(value: &Value) -> Vec<XoDeal> {
    extract::leg_arrays(value)
        .into_iter()
        .chain(value.as_array().is_some().then_some(value))
        .flat_map(|array| array.as_array().into_iter().flatten())
        .filter_map(|item| serde_json::from_value::<XoDeal>(item.clone()).ok())
        .collect()
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Reduce whatever timestamp shape the API sends to a plain date, which the
/// flexible parser turns into midnight UTC.
fn midnight_bucket(v: &Value) -> String {
    let s = scalar_string(v);
    if let Some((date, _)) = s.split_once('T') {
        return date.to_string();
    }
    if let Ok(n) = s.parse::<i64>() {
        let ms = if n > 1_000_000_000_000 { n } else { n * 1000 };
        if let Some(dt) = chrono::DateTime::from_timestamp_millis(ms) {
            return dt.format("%Y-%m-%d").to_string();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> XoSource {
        XoSource::with_base_url("http://localhost:0", Arc::new(AirportResolver::empty())).unwrap()
    }

    #[test]
    fn test_deals_payload_mapping() {
        let payload = json!({
            "deals": [
                {
                    "id": 98765,
                    "fromCityName": "New York",
                    "toCityName": "Miami",
                    "departureDate": "2025-10-10T14:00:00Z",
                    "price": 4900,
                    "aircraftType": "Challenger 300",
                    "seats": 8
                }
            ]
        });
        let deals = deals_from_payload(&payload);
        assert_eq!(deals.len(), 1);

        let candidates = source().map_deals(deals);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.id, "98765");
        assert!(c.id_is_durable);
        // City overrides pick business airports, not commercial hubs.
        assert_eq!(c.origin.as_deref(), Some("TEB"));
        assert_eq!(c.destination.as_deref(), Some("OPF"));
        // Timestamp is bucketed to the date.
        assert_eq!(c.departure_text.as_deref(), Some("2025-10-10"));
        assert_eq!(c.seats, Some(8));
    }

    #[test]
    fn test_deal_without_id_dropped() {
        let deals = deals_from_payload(&json!({"deals": [{"id": null, "from": "A"}]}));
        let candidates = source().map_deals(deals);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_midnight_bucket_shapes() {
        assert_eq!(midnight_bucket(&json!("2025-10-10T09:30:00Z")), "2025-10-10");
        assert_eq!(midnight_bucket(&json!("2025-10-10")), "2025-10-10");
        assert_eq!(midnight_bucket(&json!(1760054400)), "2025-10-10");
        assert_eq!(midnight_bucket(&json!(1760054400000i64)), "2025-10-10");
    }

    #[test]
    fn test_build_id_regex() {
        let html = r#"<script>{"props":{},"buildId":"abc123XYZ","page":"/empty-legs"}</script>"#;
        let id = BUILD_ID_RE.captures(html).unwrap().get(1).unwrap().as_str();
        assert_eq!(id, "abc123XYZ");
    }
}
