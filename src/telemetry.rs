//! C1 — Telemetry Collector.
//!
//! Process-wide counters, timers and moving averages for every operation
//! class, plus the `PerformanceReport` / `Recommendations` snapshots the
//! adaptive controller and operational endpoints read. Every mutator here
//! must be safe under parallel writers; readers may observe
//! a slightly stale-relative-to-each-other but never torn snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::operation_class::OperationClass;

/// Per-class running counters: total/success/error counts and the sum of
/// durations needed to compute an arithmetic mean.
#[derive(Default)]
struct ClassStats {
	total: AtomicU64,
	success: AtomicU64,
	error: AtomicU64,
	duration_sum_ms: AtomicU64,
	active: AtomicU64,
	peak_active: AtomicU64,
}

impl ClassStats {
	fn record(&self, success: bool, duration_ms: u64) {
		self.total.fetch_add(1, Ordering::Relaxed);
		if success {
			self.success.fetch_add(1, Ordering::Relaxed);
		} else {
			self.error.fetch_add(1, Ordering::Relaxed);
		}
		self.duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
	}

	fn mean_duration_ms(&self) -> f64 {
		let total = self.total.load(Ordering::Relaxed);
		if total == 0 {
			return 0.0;
		}
		self.duration_sum_ms.load(Ordering::Relaxed) as f64 / total as f64
	}

	/// Mirror a gauge read from the admission controller and keep a
	/// peak-held high-water mark, compare-and-swap style so concurrent
	/// writers never regress the peak.
	fn set_active(&self, active: u64) {
		self.active.store(active, Ordering::Relaxed);
		let mut peak = self.peak_active.load(Ordering::Relaxed);
		while active > peak {
			match self.peak_active.compare_exchange_weak(
				peak,
				active,
				Ordering::Relaxed,
				Ordering::Relaxed,
			) {
				Ok(_) => break,
				Err(cur) => peak = cur,
			}
		}
	}
}

/// Weighted moving average: 0.2 weight on the new sample, 0.8 on the prior;
/// the first sample is written directly.
struct MovingAverage {
	value: Mutex<Option<f64>>,
}

impl Default for MovingAverage {
	fn default() -> Self {
		Self { value: Mutex::new(None) }
	}
}

impl MovingAverage {
	fn update(&self, sample: f64) -> f64 {
		let mut guard = self.value.lock().expect("moving average mutex poisoned");
		let next = match *guard {
			None => sample,
			Some(prev) => 0.2 * sample + 0.8 * prev,
		};
		*guard = Some(next);
        next
	}

	fn get(&self) -> f64 {
		self.value.lock().expect("moving average mutex poisoned").unwrap_or(0.0)
	}
}

struct Window {
	ops_in_window: AtomicU64,
	started_at: Mutex<Instant>,
}

impl Default for Window {
	fn default() -> Self {
		Self {
			ops_in_window: AtomicU64::new(0),
			started_at: Mutex::new(Instant::now()),
		}
	}
}

/// An immutable snapshot of the telemetry state, suitable for the
/// `GET /metrics/performance` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
	pub discovered: u64,
	pub synced: u64,
	pub validated: u64,
	pub monitored: u64,
	pub batches: u64,
	pub errors: u64,
	pub api_calls: u64,
	pub total_operations: u64,
	pub successful_operations: u64,
	pub efficiency: f64,
	pub error_rate: f64,
	pub current_throughput: f64,
	pub avg_batch_size: f64,
	pub avg_batch_duration_ms: f64,
	pub per_class_mean_duration_ms: HashMap<String, f64>,
	pub per_class_total_ops: HashMap<String, u64>,
	pub active_concurrency: HashMap<String, u64>,
	pub peak_concurrency: HashMap<String, u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Recommendations {
	pub recommended_batch_size: u32,
	pub recommended_concurrency: u32,
}

/// C1. Owned by `Core`, shared via `Arc` with every pipeline task and the
/// adaptive controller. Never an ambient global (Design Note
/// "Global singletons").
pub struct TelemetryCollector {
	per_class: HashMap<OperationClass, ClassStats>,
	batches_total: AtomicU64,
	errors_total: AtomicU64,
	error_breakdown: Mutex<HashMap<(ErrorKind, OperationClass), u64>>,
	avg_batch_size: MovingAverage,
	avg_batch_duration_ms: MovingAverage,
	window: Window,
}

impl Default for TelemetryCollector {
	fn default() -> Self {
		let mut per_class = HashMap::new();
		for class in OperationClass::ALL {
			per_class.insert(class, ClassStats::default());
		}
		Self {
			per_class,
			batches_total: AtomicU64::new(0),
			errors_total: AtomicU64::new(0),
			error_breakdown: Mutex::new(HashMap::new()),
			avg_batch_size: MovingAverage::default(),
			avg_batch_duration_ms: MovingAverage::default(),
			window: Window::default(),
		}
	}
}

impl TelemetryCollector {
	pub fn new() -> Self {
		Self::default()
	}

	fn stats(&self, class: OperationClass) -> &ClassStats {
		self.per_class.get(&class).expect("every OperationClass has stats")
	}

	/// Record the outcome of a single operation within `class`.
	pub fn record_operation(&self, class: OperationClass, success: bool, duration_ms: u64) {
		self.stats(class).record(success, duration_ms);
		if !success {
			self.errors_total.fetch_add(1, Ordering::Relaxed);
		}
		self.window.ops_in_window.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a completed batch: updates the moving averages for batch size
	/// and duration, and the batch counter.
	pub fn record_batch(&self, count: usize, duration_ms: u64) {
		self.batches_total.fetch_add(1, Ordering::Relaxed);
		self.avg_batch_size.update(count as f64);
		self.avg_batch_duration_ms.update(duration_ms as f64);
	}

	/// Record an error breakdown entry by `(kind, class)`. Does not touch
	/// `errors_total` — `record_operation` already counted this failure once;
	/// this only adds the finer-grained breakdown. `retryable` is accepted
	/// for callers that want to log it but does not change accounting here;
	/// retry accounting lives on the `ProcessingJob`.
	pub fn record_error(&self, kind: ErrorKind, class: OperationClass, _retryable: bool) {
		let mut breakdown = self.error_breakdown.lock().expect("error breakdown mutex poisoned");
		*breakdown.entry((kind, class)).or_insert(0) += 1;
	}

	/// Mirror an admission-controller active-count read into the
	/// peak-held gauge for `class`.
	pub fn set_active(&self, class: OperationClass, active: u64) {
		self.stats(class).set_active(active);
	}

	/// Reset the sliding throughput window. Independent of the full reset.
	pub fn reset_window(&self) {
		self.window.ops_in_window.store(0, Ordering::Relaxed);
		*self.window.started_at.lock().expect("window mutex poisoned") = Instant::now();
	}

	/// Explicit full reset of every counter, for operator-triggered resets
	/// only (invariant: counters are otherwise strictly non-decreasing).
	pub fn reset(&self) {
		for class in OperationClass::ALL {
			let s = self.stats(class);
			s.total.store(0, Ordering::Relaxed);
			s.success.store(0, Ordering::Relaxed);
			s.error.store(0, Ordering::Relaxed);
			s.duration_sum_ms.store(0, Ordering::Relaxed);
		}
		self.batches_total.store(0, Ordering::Relaxed);
		self.errors_total.store(0, Ordering::Relaxed);
		self.error_breakdown.lock().expect("error breakdown mutex poisoned").clear();
		self.reset_window();
	}

	fn current_throughput(&self) -> f64 {
		let ops = self.window.ops_in_window.load(Ordering::Relaxed) as f64;
		let elapsed_ms = self
			.window
			.started_at
			.lock()
			.expect("window mutex poisoned")
			.elapsed()
			.as_millis() as f64;
		if elapsed_ms <= 0.0 {
			0.0
		} else {
			ops * 1000.0 / elapsed_ms
		}
	}

	fn total_and_successful(&self) -> (u64, u64) {
		let mut total = 0u64;
		let mut success = 0u64;
		for class in OperationClass::ALL {
			let s = self.stats(class);
			total += s.total.load(Ordering::Relaxed);
			success += s.success.load(Ordering::Relaxed);
		}
		(total, success)
	}

	pub fn get_report(&self) -> PerformanceReport {
		let (total, success) = self.total_and_successful();
		let errors = self.errors_total.load(Ordering::Relaxed);
		let efficiency = if total == 0 { 1.0 } else { success as f64 / total as f64 };
		let error_rate = if total == 0 { 0.0 } else { errors as f64 / total as f64 };

		let mut per_class_mean = HashMap::new();
		let mut per_class_total = HashMap::new();
		let mut active = HashMap::new();
		let mut peak = HashMap::new();
		for class in OperationClass::ALL {
			let s = self.stats(class);
			per_class_mean.insert(class.as_str().to_string(), s.mean_duration_ms());
			per_class_total.insert(class.as_str().to_string(), s.total.load(Ordering::Relaxed));
			active.insert(class.as_str().to_string(), s.active.load(Ordering::Relaxed));
			peak.insert(class.as_str().to_string(), s.peak_active.load(Ordering::Relaxed));
		}

		PerformanceReport {
			discovered: self.stats(OperationClass::Discovery).success.load(Ordering::Relaxed),
			synced: self.stats(OperationClass::Sync).success.load(Ordering::Relaxed),
			validated: self.stats(OperationClass::Validation).success.load(Ordering::Relaxed),
			monitored: self.stats(OperationClass::Monitoring).success.load(Ordering::Relaxed),
			batches: self.batches_total.load(Ordering::Relaxed),
			errors,
			api_calls: self.stats(OperationClass::ApiCall).total.load(Ordering::Relaxed),
			total_operations: total,
			successful_operations: success,
			efficiency,
			error_rate,
			current_throughput: self.current_throughput(),
			avg_batch_size: self.avg_batch_size.get(),
			avg_batch_duration_ms: self.avg_batch_duration_ms.get(),
			per_class_mean_duration_ms: per_class_mean,
			per_class_total_ops: per_class_total,
			active_concurrency: active,
			peak_concurrency: peak,
		}
	}

	/// `(recommendedBatchSize, recommendedConcurrency)` from the threshold
	/// table below.
	pub fn get_recommendations(&self) -> Recommendations {
		let report = self.get_report();
		let (batch, concurrency) = recommend(report.efficiency, report.current_throughput);
		Recommendations {
			recommended_batch_size: batch,
			recommended_concurrency: concurrency,
		}
	}
}

/// The recommendation table, also used by the adaptive
/// controller when in the neutral zone.
pub fn recommend(efficiency: f64, throughput: f64) -> (u32, u32) {
	if efficiency > 0.9 && throughput > 100.0 {
		(500, 200)
	} else if efficiency > 0.8 && throughput > 50.0 {
		(300, 100)
	} else if efficiency > 0.7 {
		(200, 50)
	} else {
		(100, 20)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn efficiency_and_error_rate_start_neutral() {
		let t = TelemetryCollector::new();
		let report = t.get_report();
		assert_eq!(report.total_operations, 0);
		assert_eq!(report.efficiency, 1.0);
		assert_eq!(report.error_rate, 0.0);
	}

	#[test]
	fn record_operation_updates_counters_and_error_rate() {
		let t = TelemetryCollector::new();
		for _ in 0..8 {
			t.record_operation(OperationClass::Sync, true, 10);
		}
		for _ in 0..2 {
			t.record_operation(OperationClass::Sync, false, 10);
		}
		let report = t.get_report();
		assert_eq!(report.total_operations, 10);
		assert_eq!(report.synced, 8);
		assert!((report.efficiency - 0.8).abs() < 1e-9);
		assert!((report.error_rate - 0.2).abs() < 1e-9);
	}

	#[test]
	fn record_error_does_not_double_count_a_failure_already_recorded() {
		let t = TelemetryCollector::new();
		t.record_operation(OperationClass::Sync, false, 10);
		t.record_error(ErrorKind::Upstream5xx, OperationClass::Sync, true);
		let report = t.get_report();
		assert_eq!(report.total_operations, 1);
		assert_eq!(report.errors, 1);
		assert!((report.error_rate - 1.0).abs() < 1e-9);
	}

	#[test]
	fn moving_average_first_sample_is_direct() {
		let t = TelemetryCollector::new();
		t.record_batch(100, 50);
		let report = t.get_report();
		assert_eq!(report.avg_batch_size, 100.0);
		assert_eq!(report.avg_batch_duration_ms, 50.0);
	}

	#[test]
	fn moving_average_weights_new_sample_at_point_two() {
		let t = TelemetryCollector::new();
		t.record_batch(100, 0);
		t.record_batch(200, 0);
		let report = t.get_report();
		assert!((report.avg_batch_size - (0.2 * 200.0 + 0.8 * 100.0)).abs() < 1e-9);
	}

	#[test]
	fn counters_are_non_decreasing_until_explicit_reset() {
		let t = TelemetryCollector::new();
		t.record_operation(OperationClass::Discovery, true, 5);
		let before = t.get_report().total_operations;
		t.record_operation(OperationClass::Discovery, true, 5);
		let after = t.get_report().total_operations;
		assert!(after >= before);
		t.reset();
		assert_eq!(t.get_report().total_operations, 0);
	}

	#[test]
	fn recommendation_table_matches_expected_breakpoints() {
		assert_eq!(recommend(0.95, 150.0), (500, 200));
		assert_eq!(recommend(0.85, 60.0), (300, 100));
		assert_eq!(recommend(0.75, 1.0), (200, 50));
		assert_eq!(recommend(0.3, 1.0), (100, 20));
	}
}
