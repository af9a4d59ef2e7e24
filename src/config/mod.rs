pub mod sources;

use crate::utils::error::{IngestError, Result};
use crate::utils::validation::{validate_range, validate_url, Validate};
use clap::Parser;
use std::path::PathBuf;

/// Ingest empty-leg charter listings into the canonical store.
#[derive(Parser, Debug, Clone)]
#[command(name = "empty-leg-etl", version, about)]
pub struct CliConfig {
    /// Postgres connection string. Required unless --dry-run.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Sources to run, in order.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "magellan,xo,flyvictor,globalair,aviapages,airpartner"
    )]
    pub sources: Vec<String>,

    /// Run these sources even while they are on cooldown (state is kept).
    #[arg(long, value_delimiter = ',')]
    pub force: Vec<String>,

    /// Substitute for unparsable departures: now | today | fixed:<RFC3339>.
    #[arg(long, default_value = "now")]
    pub depart_fallback: String,

    /// Seat count used when a listing omits one.
    #[arg(long, default_value_t = 1)]
    pub seats_fallback: i32,

    /// Scrape and normalize, but skip all database writes.
    #[arg(long)]
    pub dry_run: bool,

    /// Dump raw upstream captures under the tmp dir.
    #[arg(long)]
    pub dump_artifacts: bool,

    /// Scratch directory for cooldown state, artifacts, and failure dumps.
    #[arg(long, default_value = "tmp")]
    pub tmp_dir: PathBuf,

    /// How long a failed source stays disabled.
    #[arg(long, default_value_t = 360)]
    pub cooldown_minutes: i64,

    /// Airport dataset: prebuilt .json index or raw OurAirports .csv.
    #[arg(long, default_value = "data/airports.index.json")]
    pub airports_index: PathBuf,

    /// Optional per-source overrides (toml).
    #[arg(long)]
    pub sources_config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if !self.dry_run {
            let url = self.database_url.as_deref().ok_or_else(|| IngestError::ConfigError {
                message: "database_url: required unless --dry-run (set DATABASE_URL)".to_string(),
            })?;
            validate_url("database_url", url, &["postgres", "postgresql"])?;
        }

        if self.sources.is_empty() {
            return Err(IngestError::ConfigError {
                message: "sources: at least one source is required".to_string(),
            });
        }

        self.depart_fallback
            .parse::<crate::core::normalize::DepartFallback>()
            .map_err(|message| IngestError::ConfigError {
                message: format!("depart_fallback: {}", message),
            })?;

        validate_range("seats_fallback", self.seats_fallback, 0, 50)?;
        // One week is already an aggressive cooldown.
        validate_range("cooldown_minutes", self.cooldown_minutes, 1, 10_080)?;
        Ok(())
    }
}
