//! Prometheus metrics for the HTTP surface.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub operation: String,
    /// `ok` or the error code.
    pub outcome: String,
}

pub struct ApiMetrics {
    registry: Registry,
    operations: Family<OperationLabels, Counter>,
    donors_notified: Counter,
    dispatch_failures: Counter,
    disaster_mode: Gauge,
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("bloodbridge");
        let operations = Family::<OperationLabels, Counter>::default();
        let donors_notified = Counter::default();
        let dispatch_failures = Counter::default();
        let disaster_mode = Gauge::default();

        registry.register("operations", "Engine operations by outcome", operations.clone());
        registry.register("donors_notified", "Donor alerts delivered", donors_notified.clone());
        registry.register("dispatch_failures", "Donor alerts that could not be delivered", dispatch_failures.clone());
        registry.register("disaster_mode", "1 while disaster wording is active", disaster_mode.clone());

        Self { registry, operations, donors_notified, dispatch_failures, disaster_mode }
    }

    pub fn record(&self, operation: &str, outcome: &str) {
        self.operations
            .get_or_create(&OperationLabels { operation: operation.to_owned(), outcome: outcome.to_owned() })
            .inc();
    }

    pub fn record_dispatch(&self, delivered: usize, failed: usize) {
        self.donors_notified.inc_by(delivered as u64);
        self.dispatch_failures.inc_by(failed as u64);
    }

    pub fn set_disaster_mode(&self, active: bool) {
        self.disaster_mode.set(i64::from(active));
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}
