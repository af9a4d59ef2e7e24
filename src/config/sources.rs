use crate::utils::error::Result;
use crate::utils::validation::validate_url;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Optional `sources.toml` overrides:
///
/// ```toml
/// [sources.magellan]
/// enabled = false
///
/// [sources.xo]
/// base_url = "https://staging.flyxo.com"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub sources: HashMap<String, SourceOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceOverride {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl SourcesConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SourcesConfig = toml::from_str(&raw)?;
        for (key, entry) in &config.sources {
            if let Some(url) = &entry.base_url {
                validate_url(&format!("sources.{}.base_url", key), url, &["http", "https"])?;
            }
        }
        Ok(config)
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.sources.get(key).map(|s| s.enabled).unwrap_or(true)
    }

    pub fn base_url(&self, key: &str) -> Option<&str> {
        self.sources.get(key).and_then(|s| s.base_url.as_deref())
    }

    /// Drop disabled keys from a requested source list, logging each drop.
    pub fn filter_enabled(&self, keys: Vec<String>) -> Vec<String> {
        keys.into_iter()
            .filter(|key| {
                let enabled = self.is_enabled(key);
                if !enabled {
                    tracing::info!("{}: disabled in sources config", key);
                }
                enabled
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_and_apply() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            f,
            r#"
[sources.magellan]
enabled = false

[sources.xo]
base_url = "https://staging.flyxo.com"
"#
        )
        .unwrap();
        f.flush().unwrap();

        let config = SourcesConfig::load(f.path()).unwrap();
        assert!(!config.is_enabled("magellan"));
        assert!(config.is_enabled("xo"));
        assert!(config.is_enabled("unlisted"));
        assert_eq!(config.base_url("xo"), Some("https://staging.flyxo.com"));

        let keys = config.filter_enabled(vec!["magellan".to_string(), "xo".to_string()]);
        assert_eq!(keys, vec!["xo"]);
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(f, "[sources.xo]\nbase_url = \"ftp://nope\"\n").unwrap();
        f.flush().unwrap();
        assert!(SourcesConfig::load(f.path()).is_err());
    }

    #[test]
    fn test_empty_config_enables_everything() {
        let config = SourcesConfig::default();
        assert!(config.is_enabled("anything"));
        assert_eq!(config.base_url("anything"), None);
    }
}
