pub mod airports;
pub mod config;
pub mod core;
pub mod domain;
pub mod sources;
pub mod store;
pub mod utils;

pub use airports::AirportResolver;
pub use config::CliConfig;
pub use core::normalize::{DepartFallback, FallbackPolicy, Normalizer};
pub use core::orchestrator::{Orchestrator, RunOptions, RunSummary};
pub use domain::model::{CanonicalLeg, RawLegCandidate, SaveSummary};
pub use domain::ports::{LegStore, ScrapeOptions, Source, SourceStateStore};
pub use utils::error::{IngestError, Result};
