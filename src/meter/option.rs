//! Meter and Metric Options

use std::fmt;
use std::sync::Arc;

use crate::domain::{Attributes, CallbackResult, MetricCallback, MetricInstrument, ObserveContext};

/// Identity and shared attributes of a meter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterOption {
    pub instrument: String,
    pub instrument_version: String,
    /// Attributes added to every metric created by the meter.
    pub attributes: Attributes,
}

impl MeterOption {
    pub fn new(instrument: impl Into<String>, instrument_version: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            instrument_version: instrument_version.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn metric_instrument(&self) -> MetricInstrument {
        MetricInstrument::new(&self.instrument, &self.instrument_version)
    }
}

/// Per-metric settings passed to the meter's constructors.
#[derive(Clone, Default)]
pub struct MetricOption {
    pub help: String,
    pub unit: String,
    pub attributes: Attributes,
    /// Histogram bucket bounds; ignored by observable kinds.
    pub buckets: Vec<f64>,
    /// External callback that replaces local state when reporting.
    pub callback: Option<MetricCallback>,
}

impl MetricOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ObserveContext) -> anyhow::Result<Option<CallbackResult>> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for MetricOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricOption")
            .field("help", &self.help)
            .field("unit", &self.unit)
            .field("attributes", &self.attributes)
            .field("buckets", &self.buckets)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_option_instrument() {
        let option = MeterOption::new("billing", "v2");
        assert_eq!(option.metric_instrument(), MetricInstrument::new("billing", "v2"));
        assert!(MeterOption::default().metric_instrument().is_anonymous());
    }

    #[test]
    fn test_metric_option_builder() {
        let option = MetricOption::new()
            .with_help("Total requests")
            .with_unit("1")
            .with_callback(|_ctx| Ok(Some(CallbackResult::new(1.0))));
        assert_eq!(option.help, "Total requests");
        assert!(option.callback.is_some());
        assert!(format!("{:?}", option).contains("has_callback: true"));
    }
}
