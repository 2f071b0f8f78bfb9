//! Defines the configuration structures for the data model service.
//! This includes the main `Config` struct, the store endpoint table and timeouts.

use crate::options::{ExportStrategy, ProvenanceMode, ProvenanceOrdering};
use anyhow::Result;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Write};
use std::path::Path;
use std::time::Duration;

/// Base URLs of the graph-store datasets and external services. A missing store URL means the
/// corresponding dataset is kept in an in-memory store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Endpoints {
    /// Dataset holding model, resource, HasPart, Export and Position graphs.
    pub core: Option<String>,
    /// Dataset holding provenance entity graphs.
    pub provenance: Option<String>,
    /// Dataset caching externally resolved namespaces.
    pub imports: Option<String>,
    /// Dataset holding code-list schemes used for enumerations.
    pub scheme: Option<String>,
    pub concept_service: Option<String>,
    pub organization_service: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Builder)]
#[builder(default, setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct Config {
    pub endpoints: Endpoints,
    /// Language used when a request does not name one.
    pub default_language: String,
    /// Language tags accepted in labels and comments.
    pub languages: Vec<String>,
    pub provenance: ProvenanceMode,
    pub provenance_workers: usize,
    pub provenance_ordering: ProvenanceOrdering,
    pub export_strategy: ExportStrategy,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// offline mode (namespace resolution never touches the network)
    pub offline: bool,
    /// Base used for schema `$id` values and the OpenAPI server URL.
    pub api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoints: Endpoints::default(),
            default_language: "fi".to_string(),
            languages: vec!["fi".to_string(), "sv".to_string(), "en".to_string()],
            provenance: ProvenanceMode::default(),
            provenance_workers: 2,
            provenance_ordering: ProvenanceOrdering::default(),
            export_strategy: ExportStrategy::default(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            offline: false,
            api_base: "http://localhost:8084/api/v1/".to_string(),
        }
    }
}

impl ConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(0) = self.provenance_workers {
            return Err("provenance_workers must be at least 1".to_string());
        }
        if let Some(languages) = &self.languages {
            if languages.is_empty() {
                return Err("at least one language must be configured".to_string());
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// A configuration with every dataset in memory and the network disabled.
    pub fn in_memory() -> Self {
        Config {
            offline: true,
            ..Config::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Returns true if the given language tag is one of the configured languages.
    pub fn accepts_language(&self, lang: &str) -> bool {
        self.languages.iter().any(|l| l.eq_ignore_ascii_case(lang))
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let file = std::fs::File::open(file)?;
        let reader = BufReader::new(file);
        let mut config: Config = serde_json::from_reader(reader)?;
        if config.provenance_workers == 0 {
            config.provenance_workers = 1;
        }
        Ok(config)
    }

    /// Prints out the current Config in a clear and readable way for command line output.
    pub fn print(&self) {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "<in-memory>".to_string());
        println!("Configuration:");
        println!("  Endpoints:");
        println!("    core: {}", show(&self.endpoints.core));
        println!("    provenance: {}", show(&self.endpoints.provenance));
        println!("    imports: {}", show(&self.endpoints.imports));
        println!("    scheme: {}", show(&self.endpoints.scheme));
        println!("  Languages: {}", self.languages.join(", "));
        println!("  Default Language: {}", self.default_language);
        println!("  Provenance: {:?}", self.provenance);
        println!("  Provenance Workers: {}", self.provenance_workers);
        println!("  Provenance Ordering: {:?}", self.provenance_ordering);
        println!("  Export Strategy: {:?}", self.export_strategy);
        println!(
            "  Timeouts: connect {}s, read {}s",
            self.connect_timeout_secs, self.read_timeout_secs
        );
        println!("  Offline: {}", self.offline);
        println!("  API Base: {}", self.api_base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_and_validation() {
        let config = Config::builder()
            .offline(true)
            .provenance(ProvenanceMode::Background)
            .build()
            .unwrap();
        assert!(config.offline);
        assert_eq!(config.provenance, ProvenanceMode::Background);
        assert_eq!(config.default_language, "fi");
        assert!(config.accepts_language("EN"));
        assert!(!config.accepts_language("de"));

        let err = Config::builder().provenance_workers(0usize).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datamodel.json");
        let config = Config::builder()
            .api_base("https://example.org/api/")
            .endpoints(Endpoints {
                core: Some("http://localhost:3030/core".to_string()),
                ..Endpoints::default()
            })
            .build()
            .unwrap();
        config.save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"offline": true, "provenance": "disabled"}"#).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert!(loaded.offline);
        assert_eq!(loaded.provenance, ProvenanceMode::Disabled);
        assert_eq!(loaded.read_timeout_secs, 30);
    }
}
