//! Metrics Configuration
//!
//! Declarative description of a meter and the metrics it creates, loaded
//! from YAML or JSON.
//!
//! ```yaml
//! instrument: checkout
//! instrumentVersion: v1.4.0
//! attributes:
//!   service: checkout
//! collectTimeoutMs: 2000
//! metrics:
//!   - name: orders_total
//!     kind: counter
//!     help: Orders placed
//!   - name: order_latency_seconds
//!     kind: histogram
//!     buckets: [0.05, 0.1, 0.5, 1.0]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Attribute, AttributeValue, Attributes, MetricKind};
use crate::error::{Error, Result};
use crate::meter::{Meter, MeterOption, MetricHandle, MetricOption};
use crate::performer::histogram::validate_buckets;

// =============================================================================
// Configuration
// =============================================================================

/// Meter identity plus the metrics to create on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    /// Instrumentation scope name. Empty means anonymous.
    #[serde(default)]
    pub instrument: String,

    /// Instrumentation scope version.
    #[serde(default)]
    pub instrument_version: String,

    /// Attributes added to every metric.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,

    /// Deadline handed to callbacks during one collection cycle.
    /// Zero disables the deadline.
    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: u64,

    /// Buckets for histograms that declare none.
    #[serde(default)]
    pub default_buckets: Vec<f64>,

    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
}

/// One metric to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    pub name: String,

    pub kind: MetricKind,

    #[serde(default)]
    pub help: String,

    #[serde(default)]
    pub unit: String,

    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,

    /// Histogram bucket bounds; only valid for histograms.
    #[serde(default)]
    pub buckets: Vec<f64>,
}

fn default_collect_timeout_ms() -> u64 {
    5000
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            instrument: String::new(),
            instrument_version: String::new(),
            attributes: BTreeMap::new(),
            collect_timeout_ms: default_collect_timeout_ms(),
            default_buckets: Vec::new(),
            metrics: Vec::new(),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl MetricsConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, choosing the format by extension (`.json` is JSON,
    /// anything else YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    /// Check names are present and unique, and bucket layouts are valid.
    pub fn validate(&self) -> Result<()> {
        if self.instrument.is_empty() && !self.instrument_version.is_empty() {
            return Err(Error::Config(
                "instrumentVersion requires an instrument name".to_string(),
            ));
        }
        validate_buckets("defaultBuckets", &self.default_buckets)
            .map_err(|e| Error::Config(e.to_string()))?;

        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if metric.name.trim().is_empty() {
                return Err(Error::Config("metric name cannot be empty".to_string()));
            }
            if !seen.insert(metric.name.as_str()) {
                return Err(Error::Config(format!(
                    "metric \"{}\" is defined more than once",
                    metric.name
                )));
            }
            if !metric.buckets.is_empty() && metric.kind != MetricKind::Histogram {
                return Err(Error::Config(format!(
                    "metric \"{}\" is a {} and cannot have buckets",
                    metric.name, metric.kind
                )));
            }
            validate_buckets(&metric.name, &metric.buckets)
                .map_err(|e| Error::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Meter identity and shared attributes.
    pub fn meter_option(&self) -> MeterOption {
        MeterOption::new(&self.instrument, &self.instrument_version)
            .with_attributes(to_attributes(&self.attributes))
    }

    /// Collection deadline; `None` when disabled.
    pub fn collect_timeout(&self) -> Option<Duration> {
        (self.collect_timeout_ms > 0).then(|| Duration::from_millis(self.collect_timeout_ms))
    }

    /// Create every declared metric on `meter`, in declaration order.
    pub fn build(&self, meter: &Meter) -> Result<Vec<MetricHandle>> {
        self.metrics
            .iter()
            .map(|metric| meter.create(&metric.name, metric.kind, self.metric_option(metric)))
            .collect()
    }

    fn metric_option(&self, metric: &MetricDefinition) -> MetricOption {
        let buckets = if metric.kind == MetricKind::Histogram && metric.buckets.is_empty() {
            self.default_buckets.clone()
        } else {
            metric.buckets.clone()
        };
        MetricOption::new()
            .with_help(metric.help.clone())
            .with_unit(metric.unit.clone())
            .with_attributes(to_attributes(&metric.attributes))
            .with_buckets(buckets)
    }
}

/// Map-form attributes, ordered by key.
fn to_attributes(map: &BTreeMap<String, AttributeValue>) -> Attributes {
    map.iter()
        .map(|(key, value)| Attribute::new(key.clone(), value.clone()))
        .collect()
}
