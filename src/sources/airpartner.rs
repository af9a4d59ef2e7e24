use crate::core::normalize::is_likely_code;
use crate::domain::model::RawLegCandidate;
use crate::domain::ports::{ScrapeOptions, Source};
use crate::sources::extract;
use crate::utils::error::Result;
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

const DEFAULT_BASE_URL: &str = "https://www.airpartner.com";
const LISTING_PATH: &str = "/en-us/private-jets/empty-legs/";

static AVINODE_IFRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<iframe[^>]*\bsrc\s*=\s*["']([^"']*avinode[^"']*)["']"#).unwrap()
});

static SETTINGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id="settings"[^>]*>(.*?)</script>"#).unwrap()
});

static CTA_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a, button").unwrap());

static CTA_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(details|enquire|request|quote|view)\b").unwrap());

static PAREN_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([A-Z]{3})\)").unwrap());

/// The listing widget is an embedded Avinode search whose preloaded results
/// sit in a `#settings` script blob.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidgetSettings {
    #[serde(alias = "preLoadedEmptyLegsSearch")]
    pre_loaded_empty_leg_search: Option<PreloadedSearch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreloadedSearch {
    #[serde(default)]
    search_hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    #[serde(default, alias = "id", alias = "uuid")]
    empty_leg_id: Option<Value>,
    unique_name: Option<String>,
    #[serde(alias = "price")]
    raw_price: Option<f64>,
    #[serde(default)]
    segments: Vec<HitSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HitSegment {
    start: Option<String>,
    end: Option<String>,
    available_from: Option<Value>,
    available_to: Option<Value>,
}

/// Air Partner. The empty-leg page embeds an Avinode widget; its settings
/// blob is the reliable path, widget markup and a text sweep cover the rest.
pub struct AirPartnerSource {
    client: reqwest::Client,
    base_url: String,
}

impl AirPartnerSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: extract::http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn listing_url(&self) -> String {
        format!("{}{}", self.base_url, LISTING_PATH)
    }

    fn frame_url(&self, src: &str) -> String {
        if src.starts_with("http://") || src.starts_with("https://") {
            src.to_string()
        } else if let Some(rest) = src.strip_prefix("//") {
            format!("https://{}", rest)
        } else {
            format!("{}/{}", self.base_url, src.trim_start_matches('/'))
        }
    }

    async fn fetch_widget_html(&self, page_html: &str) -> Option<String> {
        let src = AVINODE_IFRAME_RE
            .captures(page_html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())?;
        let url = self.frame_url(src);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl Source for AirPartnerSource {
    fn key(&self) -> &'static str {
        "airpartner"
    }

    async fn scrape(&self, opts: &ScrapeOptions) -> Result<Vec<RawLegCandidate>> {
        let resp = self.client.get(self.listing_url()).send().await?.error_for_status()?;
        let page_html = resp.text().await?;
        extract::dump_artifact(opts, self.key(), "listing", &page_html).await;

        // The settings blob can sit on the page itself when the widget is
        // inlined, otherwise inside the iframe document.
        let widget_html = self.fetch_widget_html(&page_html).await;
        for html in [Some(page_html.as_str()), widget_html.as_deref()].into_iter().flatten() {
            let hits = candidates_from_settings(html, &self.listing_url());
            if !hits.is_empty() {
                tracing::debug!("airpartner: settings blob hit ({} rows)", hits.len());
                return Ok(hits);
            }
        }

        let cards = widget_html
            .as_deref()
            .map(|html| candidates_from_widget_cards(html, &self.listing_url()))
            .unwrap_or_default();
        if !cards.is_empty() {
            return Ok(cards);
        }

        let sweep_text = widget_html.as_deref().unwrap_or(&page_html);
        Ok(extract::sweep_route_pairs(sweep_text)
            .into_iter()
            .enumerate()
            .map(|(index, (origin, destination))| RawLegCandidate {
                id: format!("airpartner-sweep-{}-{}-{}", origin, destination, index),
                id_is_durable: false,
                operator: "airpartner".to_string(),
                origin: Some(origin),
                destination: Some(destination),
                url: self.listing_url(),
                ..Default::default()
            })
            .collect())
    }
}

fn candidates_from_settings(html: &str, page_url: &str) -> Vec<RawLegCandidate> {
    let Some(blob) = SETTINGS_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return Vec::new();
    };
    let Ok(settings) = serde_json::from_str::<WidgetSettings>(blob) else {
        return Vec::new();
    };
    let hits = settings
        .pre_loaded_empty_leg_search
        .map(|s| s.search_hits)
        .unwrap_or_default();

    let mut out = Vec::new();
    for (hit_index, hit) in hits.into_iter().enumerate() {
        let id = hit
            .empty_leg_id
            .as_ref()
            .map(scalar_string)
            .unwrap_or_default();
        for (seg_index, seg) in hit.segments.iter().enumerate() {
            let origin = seg.start.as_deref().map(str::trim).map(str::to_uppercase);
            let destination = seg.end.as_deref().map(str::trim).map(str::to_uppercase);
            let departure_text = seg
                .available_from
                .as_ref()
                .or(seg.available_to.as_ref())
                .map(scalar_string)
                .filter(|s| !s.is_empty());
            out.push(RawLegCandidate {
                id: if id.is_empty() {
                    format!("airpartner-hit-{}-{}", hit_index, seg_index)
                } else {
                    id.clone()
                },
                id_is_durable: !id.is_empty(),
                operator: "airpartner".to_string(),
                origin,
                destination,
                departure_text,
                price: hit.raw_price,
                aircraft: hit.unique_name.clone(),
                url: page_url.to_string(),
                ..Default::default()
            });
        }
    }
    out
}

/// Rendered widget fallback: climb from each call-to-action element until an
/// ancestor's text carries two parenthesised codes.
fn candidates_from_widget_cards(html: &str, page_url: &str) -> Vec<RawLegCandidate> {
    let doc = Html::parse_document(html);
    let mut out: Vec<RawLegCandidate> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for cta in doc.select(&CTA_SELECTOR) {
        let label = cta.text().collect::<Vec<_>>().join(" ");
        if !CTA_TEXT_RE.is_match(&label) {
            continue;
        }
        let Some((text, origin, destination)) = cta
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(6)
            .find_map(|node| {
                let text = node.text().collect::<Vec<_>>().join(" ");
                let codes: Vec<String> = PAREN_CODE_RE
                    .captures_iter(&text)
                    .filter_map(|caps| {
                        let code = caps.get(1)?.as_str();
                        is_likely_code(code).then(|| code.to_uppercase())
                    })
                    .collect();
                let from = codes.first()?.clone();
                let to = codes.iter().find(|c| **c != from)?.clone();
                Some((text, from, to))
            })
        else {
            continue;
        };
        if !seen.insert((origin.clone(), destination.clone())) {
            continue;
        }
        out.push(RawLegCandidate {
            id: format!("airpartner-listing-{}", out.len()),
            id_is_durable: false,
            operator: "airpartner".to_string(),
            origin: Some(origin),
            destination: Some(destination),
            departure_text: extract::first_date_like(&text),
            price_text: text.contains('$').then(|| text.clone()),
            url: page_url.to_string(),
            ..Default::default()
        });
    }
    out
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS_PAGE: &str = r#"
        <html><body><script id="settings" type="application/json">
        {"preLoadedEmptyLegSearch":{"searchHits":[{
            "emptyLegId": 4411,
            "uniqueName": "Challenger 350",
            "rawPrice": 12500.0,
            "segments": [{"start": "ltn", "end": "LBG", "availableFrom": "2025-10-10T00:00:00Z"}]
        }]}}
        </script></body></html>"#;

    #[test]
    fn test_settings_hits_mapped_with_durable_ids() {
        let found = candidates_from_settings(SETTINGS_PAGE, "u");
        assert_eq!(found.len(), 1);
        let c = &found[0];
        assert_eq!(c.id, "4411");
        assert!(c.id_is_durable);
        assert_eq!(c.origin.as_deref(), Some("LTN"));
        assert_eq!(c.destination.as_deref(), Some("LBG"));
        assert_eq!(c.departure_text.as_deref(), Some("2025-10-10T00:00:00Z"));
        assert_eq!(c.aircraft.as_deref(), Some("Challenger 350"));
        assert_eq!(c.price, Some(12500.0));
    }

    #[test]
    fn test_hit_without_id_is_not_durable() {
        let page = r#"<script id="settings">
            {"preLoadedEmptyLegSearch":{"searchHits":[{
                "uniqueName": "Phenom 300",
                "segments": [{"start": "NCE", "end": "GVA", "availableFrom": "2025-11-01"}]
            }]}}
        </script>"#;
        let found = candidates_from_settings(page, "u");
        assert_eq!(found.len(), 1);
        assert!(!found[0].id_is_durable);
        assert!(found[0].id.starts_with("airpartner-hit-"));
    }

    #[test]
    fn test_widget_cards_climbed_from_cta() {
        let html = r##"
            <article>
              <p>London Luton (LTN) to Paris Le Bourget (LBG) &middot; Oct 10, 2025 &middot; $9,500</p>
              <a href="#">View details</a>
            </article>
            <article><a href="#">View details</a><p>No codes here</p></article>"##;
        let found = candidates_from_widget_cards(html, "u");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].origin.as_deref(), Some("LTN"));
        assert_eq!(found[0].destination.as_deref(), Some("LBG"));
        assert_eq!(found[0].departure_text.as_deref(), Some("Oct 10, 2025"));
    }

    #[test]
    fn test_iframe_src_resolution() {
        let source = AirPartnerSource::with_base_url("https://host.test").unwrap();
        assert_eq!(
            source.frame_url("//apps.avinode.com/widget?x=1"),
            "https://apps.avinode.com/widget?x=1"
        );
        assert_eq!(source.frame_url("/widget"), "https://host.test/widget");
        assert_eq!(
            source.frame_url("https://apps.avinode.com/w"),
            "https://apps.avinode.com/w"
        );
    }
}
