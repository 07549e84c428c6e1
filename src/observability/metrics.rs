use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Central registry for all Prometheus metrics, mirroring the telemetry
/// collector's counters so an external scrape endpoint can expose them
/// without the core depending on an HTTP framework itself.
pub struct MetricsRegistry {
	registry: Registry,

	pub operations_total: IntCounterVec,
	pub operation_errors_total: IntCounterVec,
	pub operation_duration_ms: Histogram,

	pub batches_total: IntCounter,
	pub avg_batch_size: Gauge,
	pub avg_batch_duration_ms: Gauge,

	pub admission_active: IntGaugeVec,
	pub admission_capacity: IntGaugeVec,

	pub adaptive_batch_size: Gauge,
	pub adaptive_control_period_ms: Gauge,
}

impl MetricsRegistry {
	pub fn new() -> Self {
		let registry = Registry::new();

		let operations_total = IntCounterVec::new(
			Opts::new("ofrc_operations_total", "Total operations processed, by class").namespace("ofrc"),
			&["class"],
		)
		.unwrap();

		let operation_errors_total = IntCounterVec::new(
			Opts::new("ofrc_operation_errors_total", "Total operation errors, by class and kind").namespace("ofrc"),
			&["class", "kind"],
		)
		.unwrap();

		let operation_duration_ms = Histogram::with_opts(
			HistogramOpts::new("ofrc_operation_duration_ms", "Per-operation duration in milliseconds")
				.namespace("ofrc")
				.buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0]),
		)
		.unwrap();

		let batches_total =
			IntCounter::with_opts(Opts::new("ofrc_batches_total", "Total batches executed").namespace("ofrc")).unwrap();

		let avg_batch_size =
			Gauge::with_opts(Opts::new("ofrc_avg_batch_size", "Moving average of batch size").namespace("ofrc")).unwrap();

		let avg_batch_duration_ms = Gauge::with_opts(
			Opts::new("ofrc_avg_batch_duration_ms", "Moving average of batch duration in milliseconds").namespace("ofrc"),
		)
		.unwrap();

		let admission_active = IntGaugeVec::new(
			Opts::new("ofrc_admission_active", "Active permits, by class").namespace("ofrc"),
			&["class"],
		)
		.unwrap();

		let admission_capacity = IntGaugeVec::new(
			Opts::new("ofrc_admission_capacity", "Configured capacity, by class").namespace("ofrc"),
			&["class"],
		)
		.unwrap();

		let adaptive_batch_size = Gauge::with_opts(
			Opts::new("ofrc_adaptive_batch_size", "Current adaptive batch size").namespace("ofrc"),
		)
		.unwrap();

		let adaptive_control_period_ms = Gauge::with_opts(
			Opts::new("ofrc_adaptive_control_period_ms", "Current adaptive control period in milliseconds")
				.namespace("ofrc"),
		)
		.unwrap();

		registry.register(Box::new(operations_total.clone())).unwrap();
		registry.register(Box::new(operation_errors_total.clone())).unwrap();
		registry.register(Box::new(operation_duration_ms.clone())).unwrap();
		registry.register(Box::new(batches_total.clone())).unwrap();
		registry.register(Box::new(avg_batch_size.clone())).unwrap();
		registry.register(Box::new(avg_batch_duration_ms.clone())).unwrap();
		registry.register(Box::new(admission_active.clone())).unwrap();
		registry.register(Box::new(admission_capacity.clone())).unwrap();
		registry.register(Box::new(adaptive_batch_size.clone())).unwrap();
		registry.register(Box::new(adaptive_control_period_ms.clone())).unwrap();

		Self {
			registry,
			operations_total,
			operation_errors_total,
			operation_duration_ms,
			batches_total,
			avg_batch_size,
			avg_batch_duration_ms,
			admission_active,
			admission_capacity,
			adaptive_batch_size,
			adaptive_control_period_ms,
		}
	}

	/// Encode metrics in Prometheus text format.
	pub fn encode(&self) -> String {
		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		match encoder.encode_to_string(&metric_families) {
			Ok(s) => s,
			Err(e) => {
				eprintln!("Failed to encode metrics: {}", e);
				String::new()
			}
		}
	}

	/// Mirror a `PerformanceReport` snapshot into the gauges/counters this
	/// registry exposes. Called periodically by the adaptive controller's
	/// tick, not on every operation, since counters here are cumulative
	/// mirrors rather than the source of truth (C1 owns that).
	pub fn observe_report(&self, report: &crate::telemetry::PerformanceReport) {
		self.avg_batch_size.set(report.avg_batch_size);
		self.avg_batch_duration_ms.set(report.avg_batch_duration_ms);
		for (class, active) in &report.active_concurrency {
			self.admission_active.with_label_values(&[class]).set(*active as i64);
		}
	}
}

impl Default for MetricsRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Initialize the global metrics registry.
pub fn init_metrics() -> anyhow::Result<Arc<MetricsRegistry>> {
	Ok(Arc::new(MetricsRegistry::new()))
}

#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn metrics_registry_creation() {
		let registry = super::MetricsRegistry::new();
		assert!(!registry.encode().is_empty());
	}

	#[test]
	fn metrics_increment() {
		let registry = super::MetricsRegistry::new();
		registry.operations_total.with_label_values(&["sync"]).inc();
		registry.batches_total.inc();
		assert!(!registry.encode().is_empty());
	}
}
