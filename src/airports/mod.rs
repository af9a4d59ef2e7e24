use crate::domain::model::AirportRecord;
use crate::utils::error::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// ICAO↔IATA and IATA→display lookups over the reference airport dataset.
///
/// Loaded once per process and passed by reference. Every lookup returns an
/// `Option` — an unknown code or a missing dataset degrades accuracy, it
/// never aborts ingestion.
#[derive(Debug, Default)]
pub struct AirportResolver {
    icao_to_iata: HashMap<String, String>,
    iata_to_icao: HashMap<String, String>,
    by_iata: HashMap<String, AirportRecord>,
}

/// Prebuilt index shape produced by the dataset build job.
#[derive(Debug, Deserialize)]
struct AirportIndexFile {
    #[serde(default, rename = "icaoToIata")]
    icao_to_iata: HashMap<String, String>,
    #[serde(default, rename = "iataToIcao")]
    iata_to_icao: HashMap<String, String>,
    #[serde(default)]
    cities: HashMap<String, CityEntry>,
}

#[derive(Debug, Deserialize)]
struct CityEntry {
    #[serde(default)]
    city: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
}

/// Row shape of the raw OurAirports csv.
#[derive(Debug, Deserialize)]
struct OurAirportsRow {
    ident: String,
    name: String,
    latitude_deg: Option<f64>,
    longitude_deg: Option<f64>,
    iso_country: String,
    municipality: Option<String>,
    iata_code: Option<String>,
}

impl AirportResolver {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a prebuilt `airports.index.json`.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: AirportIndexFile = serde_json::from_str(&raw)?;

        let mut resolver = Self {
            icao_to_iata: file.icao_to_iata,
            iata_to_icao: file.iata_to_icao,
            by_iata: HashMap::new(),
        };
        for (iata, entry) in file.cities {
            let iata = iata.to_uppercase();
            let icao = resolver.iata_to_icao.get(&iata).cloned().unwrap_or_default();
            resolver.by_iata.insert(
                iata.clone(),
                AirportRecord {
                    iata,
                    icao,
                    city: entry.city,
                    name: entry.name,
                    country: entry.country,
                    lat: entry.lat,
                    lon: entry.lon,
                },
            );
        }
        Ok(resolver)
    }

    /// Load the raw OurAirports csv directly, keeping rows that carry a
    /// 3-letter IATA code.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut resolver = Self::default();
        let mut kept = 0usize;

        for row in reader.deserialize::<OurAirportsRow>() {
            let row = match row {
                Ok(r) => r,
                // One malformed row should not sink the dataset.
                Err(e) => {
                    tracing::debug!("airports: skipping malformed csv row: {}", e);
                    continue;
                }
            };
            let iata = match row.iata_code.as_deref().map(str::trim) {
                Some(code) if code.len() == 3 => code.to_uppercase(),
                _ => continue,
            };
            let icao = row.ident.trim().to_uppercase();
            if icao.len() == 4 && icao.chars().all(|c| c.is_ascii_alphabetic()) {
                resolver.icao_to_iata.insert(icao.clone(), iata.clone());
                resolver.iata_to_icao.insert(iata.clone(), icao.clone());
            }
            resolver.by_iata.insert(
                iata.clone(),
                AirportRecord {
                    iata,
                    icao: if icao.len() == 4 { icao } else { String::new() },
                    city: row.municipality.unwrap_or_default(),
                    name: row.name,
                    country: row.iso_country,
                    lat: row.latitude_deg.unwrap_or(0.0),
                    lon: row.longitude_deg.unwrap_or(0.0),
                },
            );
            kept += 1;
        }

        tracing::debug!("airports: loaded {} records from csv", kept);
        Ok(resolver)
    }

    /// Load the dataset from disk, degrading to an empty resolver (with a
    /// warning) when the file is absent or unparsable.
    pub fn load_or_empty(path: &Path) -> Self {
        let loaded = if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            Self::load_csv(path)
        } else {
            Self::load_json(path)
        };
        match loaded {
            Ok(r) => {
                tracing::info!("🗺️  airports: index ready ({} IATA records)", r.len());
                r
            }
            Err(e) => {
                tracing::warn!(
                    "airports: failed to load {} ({}); lookups will degrade to code heuristics",
                    path.display(),
                    e
                );
                Self::empty()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_iata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_iata.is_empty() && self.icao_to_iata.is_empty()
    }

    /// Resolve a 3- or 4-letter code to an IATA code.
    ///
    /// Exact dataset match wins. Unknown 4-letter codes starting with `K`
    /// (continental US) or `C` (Canada) fall back to their trailing three
    /// letters.
    pub fn iata_for(&self, code: &str) -> Option<String> {
        let code = code.trim().to_uppercase();
        if !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        match code.len() {
            3 => Some(code),
            4 => {
                if let Some(iata) = self.icao_to_iata.get(&code) {
                    return Some(iata.clone());
                }
                if code.starts_with('K') || code.starts_with('C') {
                    return Some(code[1..].to_string());
                }
                None
            }
            _ => None,
        }
    }

    pub fn icao_for(&self, iata: &str) -> Option<String> {
        self.iata_to_icao.get(&iata.trim().to_uppercase()).cloned()
    }

    pub fn airport(&self, iata: &str) -> Option<&AirportRecord> {
        self.by_iata.get(&iata.trim().to_uppercase())
    }

    /// Reverse lookup: first airport whose city matches (case-insensitive).
    pub fn iata_for_city(&self, city: &str) -> Option<String> {
        let want = city.trim().to_lowercase();
        if want.is_empty() {
            return None;
        }
        let mut hits: Vec<&AirportRecord> = self
            .by_iata
            .values()
            .filter(|a| a.city.to_lowercase() == want)
            .collect();
        hits.sort_by(|a, b| a.iata.cmp(&b.iata));
        hits.first().map(|a| a.iata.clone())
    }
}
