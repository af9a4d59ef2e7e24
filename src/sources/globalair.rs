use crate::domain::model::RawLegCandidate;
use crate::domain::ports::{ScrapeOptions, Source};
use crate::sources::extract;
use crate::utils::error::Result;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::LazyLock;

const DEFAULT_BASE_URL: &str = "https://www.globalaircharters.com";
const MAX_PAGES: usize = 10;

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table tbody tr, table.footable tr").unwrap());

static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Global Air Charters. The listings are a plain data table: route, date,
/// aircraft, price per row.
pub struct GlobalAirSource {
    client: reqwest::Client,
    base_url: String,
}

impl GlobalAirSource {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: extract::http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Source for GlobalAirSource {
    fn key(&self) -> &'static str {
        "globalair"
    }

    async fn scrape(&self, opts: &ScrapeOptions) -> Result<Vec<RawLegCandidate>> {
        let listing_url = format!("{}/empty-legs/", self.base_url);
        let pages = extract::fetch_paged(&self.client, &listing_url, MAX_PAGES).await?;
        extract::dump_artifact(
            opts,
            self.key(),
            "listing",
            pages.first().map(String::as_str).unwrap_or(""),
        )
        .await;

        let mut out = Vec::new();
        for (page_no, page) in pages.iter().enumerate() {
            out.extend(candidates_from_table(page, page_no, &listing_url));
        }
        Ok(out)
    }
}

fn candidates_from_table(page: &str, page_no: usize, page_url: &str) -> Vec<RawLegCandidate> {
    let doc = Html::parse_document(page);
    let mut out = Vec::new();

    for (row_no, row) in doc.select(&ROW_SELECTOR).enumerate() {
        let cells: Vec<String> = row
            .select(&CELL_SELECTOR)
            .map(|cell| cell.text().collect::<Vec<_>>().join(" ").trim().to_string())
            .collect();
        if cells.is_empty() {
            continue;
        }

        // Route is in the first cell; remaining columns are positional but
        // the site reorders them occasionally, so match by content.
        let Some((origin, destination)) = cells
            .iter()
            .find_map(|cell| extract::sweep_route_pairs(cell).into_iter().next())
        else {
            continue;
        };
        let row_text = cells.join(" · ");

        out.push(RawLegCandidate {
            id: row
                .value()
                .attr("data-id")
                .map(str::to_string)
                .unwrap_or_else(|| format!("globalair-row-{}-{}", page_no, row_no)),
            id_is_durable: false,
            operator: "globalair".to_string(),
            origin: Some(origin),
            destination: Some(destination),
            departure_text: extract::first_date_like(&row_text),
            price_text: row_text.contains('$').then(|| row_text.clone()),
            aircraft: cells
                .iter()
                .find(|cell| looks_like_aircraft(cell))
                .cloned(),
            seats: extract::first_seats(&row_text),
            url: page_url.to_string(),
            ..Default::default()
        });
    }
    out
}

fn looks_like_aircraft(cell: &str) -> bool {
    let upper = cell.to_uppercase();
    [
        "GULFSTREAM",
        "GLOBAL",
        "FALCON",
        "CHALLENGER",
        "CITATION",
        "LEAR",
        "HAWKER",
        "PHENOM",
        "PRAETOR",
        "LEGACY",
        "KING AIR",
        "PILATUS",
        "PC-12",
        "HONDAJET",
        "JET",
    ]
    .iter()
    .any(|brand| upper.contains(brand))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <table class="footable">
          <tbody>
            <tr data-id="ga-1">
              <td>KTEB - KOPF</td>
              <td>2025-10-10</td>
              <td>Gulfstream G550</td>
              <td>$18,500</td>
            </tr>
            <tr>
              <td>VNY to LAS</td>
              <td>Oct 12, 2025</td>
              <td>Citation CJ3</td>
              <td>Call for price</td>
            </tr>
            <tr><td>No route here</td></tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_table_rows_parsed() {
        let found = candidates_from_table(PAGE, 0, "u");
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].id, "ga-1");
        assert_eq!(found[0].origin.as_deref(), Some("KTEB"));
        assert_eq!(found[0].destination.as_deref(), Some("KOPF"));
        assert_eq!(found[0].departure_text.as_deref(), Some("2025-10-10"));
        assert_eq!(found[0].aircraft.as_deref(), Some("Gulfstream G550"));
        assert!(found[0].price_text.as_deref().unwrap().contains("18,500"));

        assert_eq!(found[1].id, "globalair-row-0-1");
        assert_eq!(found[1].origin.as_deref(), Some("VNY"));
        assert_eq!(found[1].price_text, None);
    }

    #[test]
    fn test_rows_without_routes_skipped() {
        let found = candidates_from_table("<table><tr><td>nothing</td></tr></table>", 0, "u");
        assert!(found.is_empty());
    }
}
