//! Histogram Performer
//!
//! Synchronous histogram: every `record` goes straight to the backend.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{Attributes, HistogramInstrument, MetricBackend, MetricInfo, ObserveOption};
use crate::error::{Error, Result};

/// Bucket upper bounds used when a histogram is defined without any.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Histogram recording each value as it happens.
#[derive(Debug)]
pub struct HistogramPerformer {
    info: Arc<MetricInfo>,
    instrument: Arc<dyn HistogramInstrument>,
    buckets: Vec<f64>,
}

impl HistogramPerformer {
    pub fn new(backend: &dyn MetricBackend, info: Arc<MetricInfo>) -> Result<Self> {
        let buckets = if info.buckets().is_empty() {
            DEFAULT_BUCKETS.to_vec()
        } else {
            info.buckets().to_vec()
        };
        validate_buckets(info.name(), &buckets)?;

        let instrument = backend
            .create_histogram(info.descriptor(), &buckets)
            .map_err(|source| Error::Internal {
                metric: info.name().to_string(),
                kind: info.kind(),
                source,
            })?;
        debug!(metric = %info.name(), buckets = buckets.len(), "Created histogram performer");

        Ok(Self {
            info,
            instrument,
            buckets,
        })
    }

    /// Record one value with the static attributes plus those in `options`.
    pub fn record(&self, value: f64, options: &[ObserveOption]) {
        let mut attributes = self.info.attributes().clone();
        for option in options {
            attributes.extend_from(&option.attributes);
        }
        self.instrument.record(value, &attributes);
    }

    /// Record with an explicit attribute set appended to the static ones.
    pub fn record_with(&self, value: f64, attributes: &Attributes) {
        self.instrument
            .record(value, &self.info.attributes().concat(attributes));
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    pub fn info(&self) -> &MetricInfo {
        &self.info
    }
}

/// Bucket bounds must be finite and strictly increasing.
pub(crate) fn validate_buckets(metric: &str, buckets: &[f64]) -> Result<()> {
    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(Error::InvalidArgument(format!(
            "histogram \"{}\" has non-finite bucket bounds",
            metric
        )));
    }
    if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::InvalidArgument(format!(
            "histogram \"{}\" buckets must be strictly increasing",
            metric
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryBackend;
    use crate::domain::{AttributeValue, MetricKind};
    use assert_matches::assert_matches;

    #[test]
    fn test_default_buckets() {
        let backend = InMemoryBackend::new();
        let info = MetricInfo::new("latency_seconds", MetricKind::Histogram);
        let histogram = HistogramPerformer::new(&backend, Arc::new(info)).unwrap();
        assert_eq!(histogram.buckets(), DEFAULT_BUCKETS);
    }

    #[test]
    fn test_record_merges_attributes() {
        let backend = InMemoryBackend::new();
        let info = MetricInfo::new("latency_seconds", MetricKind::Histogram)
            .with_attributes(Attributes::new().with("service", "api"))
            .with_buckets(vec![0.1, 1.0]);
        let histogram = HistogramPerformer::new(&backend, Arc::new(info)).unwrap();

        histogram.record(0.05, &[ObserveOption::new(Attributes::new().with("route", "/"))]);
        histogram.record_with(2.0, &Attributes::new().with("route", "/x"));

        let records = backend.histogram_records("latency_seconds");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 0.05);
        assert_eq!(
            records[0].1,
            Attributes::new().with("service", "api").with("route", "/")
        );
        assert_eq!(records[1].1.get("route"), Some(&AttributeValue::from("/x")));
    }

    #[test]
    fn test_rejects_unordered_buckets() {
        let backend = InMemoryBackend::new();
        let info = MetricInfo::new("latency_seconds", MetricKind::Histogram)
            .with_buckets(vec![1.0, 0.5]);
        assert_matches!(
            HistogramPerformer::new(&backend, Arc::new(info)),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn test_validate_buckets() {
        assert!(validate_buckets("h", &[0.1, 0.2, 5.0]).is_ok());
        assert!(validate_buckets("h", &[]).is_ok());
        assert!(validate_buckets("h", &[0.1, 0.1]).is_err());
        assert!(validate_buckets("h", &[f64::INFINITY]).is_err());
    }
}
