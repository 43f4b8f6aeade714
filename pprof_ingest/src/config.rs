//! Parser and ingestion configuration.
//!
//! Metrics are configured by their pprof sample type name. A sample type
//! without an entry is not ingested unless the parser's filter is replaced.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How the storage side combines values of one series over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Average,
}

/// Emission policy for one sample type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleTypeConfig {
    /// Units override; when absent the profile's own unit string is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,

    /// Metric name used in the series key instead of the sample type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    pub aggregation: Aggregation,

    /// Values are monotonically increasing counters and are diffed against
    /// the previous call before being written.
    pub cumulative: bool,

    /// Values were collected by periodic sampling; a sample rate is derived
    /// from the profile period.
    pub sampled: bool,
}

/// Sample type configuration, keyed by pprof sample type name.
pub type SampleTypes = BTreeMap<String, SampleTypeConfig>;

/// The well-known sample types emitted by Go runtime profiles.
pub fn default_sample_types() -> SampleTypes {
    let entry = |display_name: Option<&str>, units: Option<&str>| SampleTypeConfig {
        units: units.map(String::from),
        display_name: display_name.map(String::from),
        ..Default::default()
    };

    let mut types = SampleTypes::new();
    types.insert(
        "samples".into(),
        SampleTypeConfig {
            sampled: true,
            ..entry(Some("cpu"), Some("samples"))
        },
    );
    for name in ["inuse_objects", "inuse_space", "goroutine"] {
        types.insert(
            name.into(),
            SampleTypeConfig {
                aggregation: Aggregation::Average,
                ..entry(None, None)
            },
        );
    }
    for name in ["alloc_objects", "alloc_space"] {
        types.insert(
            name.into(),
            SampleTypeConfig {
                cumulative: true,
                ..entry(None, None)
            },
        );
    }
    types.insert(
        "contentions".into(),
        SampleTypeConfig {
            cumulative: true,
            ..entry(Some("mutex_count"), None)
        },
    );
    types.insert(
        "delay".into(),
        SampleTypeConfig {
            cumulative: true,
            ..entry(Some("mutex_duration"), None)
        },
    );
    types
}

/// Construction configuration of a [`StreamingParser`](crate::StreamingParser).
#[derive(Debug, Clone)]
pub struct ParserConfig<P> {
    /// Storage sink receiving every emitted series.
    pub putter: P,
    /// Source tag attached to every write.
    pub spy_name: String,
    /// Labels merged into every series key. They take precedence over sample
    /// labels of the same name.
    pub labels: BTreeMap<String, String>,
    /// Only write the exemplar-free aggregate of samples carrying a profile id.
    pub skip_exemplars: bool,
    pub sample_types: SampleTypes,
}

impl<P> ParserConfig<P> {
    pub fn new(putter: P) -> Self {
        Self {
            putter,
            spy_name: String::new(),
            labels: BTreeMap::new(),
            skip_exemplars: false,
            sample_types: default_sample_types(),
        }
    }
}

/// On-disk form of the ingestion settings used by the `pprof_ingest` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub spy_name: String,
    pub labels: BTreeMap<String, String>,
    pub skip_exemplars: bool,
    pub sample_types: SampleTypes,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            spy_name: "pprof".into(),
            labels: BTreeMap::new(),
            skip_exemplars: false,
            sample_types: default_sample_types(),
        }
    }
}

impl IngestConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Parser configuration writing to `putter`.
    pub fn into_parser_config<P>(self, putter: P) -> ParserConfig<P> {
        ParserConfig {
            putter,
            spy_name: self.spy_name,
            labels: self.labels,
            skip_exemplars: self.skip_exemplars,
            sample_types: self.sample_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mapping_covers_go_runtime_profiles() {
        let types = default_sample_types();

        let cpu = &types["samples"];
        assert_eq!(cpu.display_name.as_deref(), Some("cpu"));
        assert_eq!(cpu.units.as_deref(), Some("samples"));
        assert!(cpu.sampled);
        assert!(!cpu.cumulative);

        assert_eq!(types["inuse_space"].aggregation, Aggregation::Average);
        assert!(types["alloc_objects"].cumulative);
        assert_eq!(
            types["delay"].display_name.as_deref(),
            Some("mutex_duration")
        );
        assert_eq!(types.len(), 9);
    }

    #[test]
    fn ingest_config_fills_missing_fields() {
        let config: IngestConfig =
            serde_json::from_str(r#"{"labels": {"__name__": "app"}}"#).unwrap();

        assert_eq!(config.spy_name, "pprof");
        assert_eq!(config.labels["__name__"], "app");
        assert_eq!(config.sample_types, default_sample_types());
    }

    #[test]
    fn sample_type_entries_parse_partially() {
        let config: IngestConfig = serde_json::from_str(
            r#"{"sample_types": {"cpu": {"aggregation": "average", "cumulative": true}}}"#,
        )
        .unwrap();

        let cpu = &config.sample_types["cpu"];
        assert_eq!(cpu.aggregation, Aggregation::Average);
        assert!(cpu.cumulative);
        assert!(!cpu.sampled);
        assert_eq!(cpu.units, None);
        assert_eq!(config.sample_types.len(), 1);
    }

    #[test]
    fn unknown_aggregation_is_rejected() {
        let result: Result<SampleTypeConfig, _> =
            serde_json::from_str(r#"{"aggregation": "max"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let result = IngestConfig::from_file("/nonexistent/pprof_ingest.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
