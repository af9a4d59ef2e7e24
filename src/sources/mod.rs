pub mod airpartner;
pub mod aviapages;
pub mod extract;
pub mod flyvictor;
pub mod globalair;
pub mod magellan;
pub mod xo;

use crate::airports::AirportResolver;
use crate::config::sources::SourcesConfig;
use crate::domain::ports::Source;
use crate::utils::error::{IngestError, Result};
use std::sync::Arc;

/// Build the adapters for the requested source keys, preserving request
/// order and honoring any base-url overrides. Unknown keys are reported,
/// not silently ignored.
pub fn build_sources(
    keys: &[String],
    resolver: Arc<AirportResolver>,
    overrides: &SourcesConfig,
) -> Result<Vec<Box<dyn Source>>> {
    let mut sources: Vec<Box<dyn Source>> = Vec::with_capacity(keys.len());
    for key in keys {
        let base = overrides.base_url(key);
        match key.as_str() {
            "magellan" => sources.push(Box::new(match base {
                Some(url) => magellan::MagellanSource::with_base_url(url)?,
                None => magellan::MagellanSource::new()?,
            })),
            "xo" => sources.push(Box::new(match base {
                Some(url) => xo::XoSource::with_base_url(url, resolver.clone())?,
                None => xo::XoSource::new(resolver.clone())?,
            })),
            "flyvictor" => sources.push(Box::new(match base {
                Some(url) => flyvictor::FlyVictorSource::with_base_url(url, resolver.clone())?,
                None => flyvictor::FlyVictorSource::new(resolver.clone())?,
            })),
            "globalair" => sources.push(Box::new(match base {
                Some(url) => globalair::GlobalAirSource::with_base_url(url)?,
                None => globalair::GlobalAirSource::new()?,
            })),
            "aviapages" => sources.push(Box::new(match base {
                Some(url) => aviapages::AviapagesSource::with_base_url(url)?,
                None => aviapages::AviapagesSource::new()?,
            })),
            "airpartner" => sources.push(Box::new(match base {
                Some(url) => airpartner::AirPartnerSource::with_base_url(url)?,
                None => airpartner::AirPartnerSource::new()?,
            })),
            other => {
                return Err(IngestError::ConfigError {
                    message: format!("unknown source '{}'", other),
                })
            }
        }
    }
    Ok(sources)
}
