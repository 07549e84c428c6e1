//! C3 — Adaptive Controller.
//!
//! A periodic task with a self-adjusting period: reads a host sample and the
//! telemetry report each tick, recomputes batch size, global concurrency,
//! per-class concurrency and the control period itself, then writes new
//! capacities to the admission controller. The loop sleeps
//! rather than using a fixed `tokio::time::interval` because the interval
//! length is itself one of the things being recomputed every tick.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::admission::AdmissionController;
use crate::operation_class::OperationClass;
use crate::telemetry::{recommend, TelemetryCollector};

/// One host sample: CPU load and memory use, both normalized to `[0,1]`.
#[derive(Debug, Clone, Copy)]
pub struct HostSample {
	pub cpu_load: f64,
	pub mem_use: f64,
}

/// Source of host load/memory samples. The default implementation reads
/// `/proc/loadavg` and `/proc/meminfo`; tests supply a fixed sampler instead
/// of depending on the real machine's load.
pub trait HostSampler: Send + Sync {
	fn sample(&self) -> HostSample;
}

/// Reads `/proc/loadavg` and `/proc/meminfo`. CPU load is defined as
/// `loadAverage / available_parallelism()`, clamped to `[0,1]` — the single
/// consistent CPU-load definition this crate picks in place of a per-OS
/// CPU-time-delta sampler (see DESIGN.md, Open Question resolution).
pub struct ProcHostSampler;

impl HostSampler for ProcHostSampler {
	fn sample(&self) -> HostSample {
		let cpu_load = read_loadavg()
			.map(|load1| {
				let parallelism = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) as f64;
				(load1 / parallelism).clamp(0.0, 1.0)
			})
			.unwrap_or(0.0);
		let mem_use = read_meminfo_ratio().unwrap_or(0.0);
		HostSample { cpu_load, mem_use }
	}
}

fn read_loadavg() -> Option<f64> {
	let contents = fs::read_to_string("/proc/loadavg").ok()?;
	contents.split_whitespace().next()?.parse::<f64>().ok()
}

fn read_meminfo_ratio() -> Option<f64> {
	let contents = fs::read_to_string("/proc/meminfo").ok()?;
	let mut total_kb = None;
	let mut avail_kb = None;
	for line in contents.lines() {
		if let Some(rest) = line.strip_prefix("MemTotal:") {
			total_kb = parse_kb(rest);
		} else if let Some(rest) = line.strip_prefix("MemAvailable:") {
			avail_kb = parse_kb(rest);
		}
	}
	let total = total_kb?;
	let avail = avail_kb?;
	if total <= 0.0 {
		return None;
	}
	Some(((total - avail) / total).clamp(0.0, 1.0))
}

fn parse_kb(rest: &str) -> Option<f64> {
	rest.split_whitespace().next()?.parse::<f64>().ok()
}

/// Every numeric threshold the control loop depends on, exposed as
/// configuration rather than hardcoded.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveConfig {
	pub cpu_high: f64,
	pub cpu_low: f64,
	pub mem_high: f64,
	pub mem_low: f64,
	pub min_batch: u32,
	pub max_batch: u32,
	pub min_concurrency: u32,
	pub max_concurrency: u32,
	pub control_period_min: Duration,
	pub control_period_max: Duration,
	pub control_period_initial: Duration,
	/// Bounds for the job worker's drain-loop cadence. Distinct from the
	/// control period: the control period governs how often this controller
	/// itself re-tunes; the processing interval governs how often the job
	/// worker comes back to ask for another batch.
	pub processing_interval_min: Duration,
	pub processing_interval_max: Duration,
	pub processing_interval_initial: Duration,
	/// Weight given to the newest sample in every moving average this
	/// controller reads from C1 (mirrors `windowWeightNew`; the controller
	/// itself does not recompute averages, but surfaces this for callers
	/// that build their own).
	pub window_weight_new: f64,
}

impl Default for AdaptiveConfig {
	fn default() -> Self {
		Self {
			cpu_high: 0.80,
			cpu_low: 0.40,
			mem_high: 0.85,
			mem_low: 0.50,
			min_batch: 50,
			max_batch: 1000,
			min_concurrency: 10,
			max_concurrency: 500,
			control_period_min: Duration::from_secs(10),
			control_period_max: Duration::from_secs(120),
			control_period_initial: Duration::from_secs(30),
			processing_interval_min: Duration::from_millis(100),
			processing_interval_max: Duration::from_secs(5),
			processing_interval_initial: Duration::from_secs(1),
			window_weight_new: 0.2,
		}
	}
}

/// Per-class delta magnitudes (grow/shrink) for each resize step.
fn class_delta(class: OperationClass) -> (u32, u32) {
	match class {
		OperationClass::Discovery => (10, 5),
		OperationClass::Sync => (15, 10),
		OperationClass::Validation => (5, 3),
		OperationClass::Monitoring => (8, 5),
		OperationClass::ApiCall => (50, 30),
		OperationClass::BatchProcessing => (0, 0),
	}
}

/// C3. Owns the current batch size and control period as atomics so the job
/// worker can read them without locking; capacities live in C2, not here.
pub struct AdaptiveController {
	config: AdaptiveConfig,
	admission: Arc<AdmissionController>,
	telemetry: Arc<TelemetryCollector>,
	sampler: Box<dyn HostSampler>,
	batch_size: AtomicU64,
	control_period_ms: AtomicU64,
	processing_interval_ms: AtomicU64,
}

impl AdaptiveController {
	pub fn new(
		config: AdaptiveConfig,
		admission: Arc<AdmissionController>,
		telemetry: Arc<TelemetryCollector>,
		sampler: Box<dyn HostSampler>,
	) -> Self {
		let initial_batch = config.min_batch.max(config.max_batch.min(100));
		Self {
			batch_size: AtomicU64::new(initial_batch as u64),
			control_period_ms: AtomicU64::new(config.control_period_initial.as_millis() as u64),
			processing_interval_ms: AtomicU64::new(config.processing_interval_initial.as_millis() as u64),
			config,
			admission,
			telemetry,
			sampler,
		}
	}

	pub fn current_batch_size(&self) -> u32 {
		self.batch_size.load(Ordering::Relaxed) as u32
	}

	pub fn current_control_period(&self) -> Duration {
		Duration::from_millis(self.control_period_ms.load(Ordering::Relaxed))
	}

	/// The job worker's drain-loop cadence. Recomputed every tick alongside
	/// the control period but tuned independently: it backs off when the
	/// host is saturated or efficiency drops, and tightens up when idle and
	/// efficient, regardless of whether the control period itself moved.
	pub fn current_processing_interval(&self) -> Duration {
		Duration::from_millis(self.processing_interval_ms.load(Ordering::Relaxed))
	}

	pub fn config(&self) -> &AdaptiveConfig {
		&self.config
	}

	/// Samples the host directly, for the job worker's `shouldProcessNow`
	/// check, independent of the tick cadence.
	pub fn sample_host(&self) -> HostSample {
		self.sampler.sample()
	}

	/// Runs until `token` is cancelled, sleeping for `current_control_period`
	/// between ticks.
	pub async fn run(self: Arc<Self>, token: CancellationToken) {
		loop {
			let period = self.current_control_period();
			tokio::select! {
				biased;
				_ = token.cancelled() => break,
				_ = tokio::time::sleep(period) => {}
			}
			self.tick().await;
		}
	}

	#[instrument(skip(self))]
	async fn tick(&self) {
		let sample = self.sampler.sample();
		let report = self.telemetry.get_report();

		let new_batch = self.recompute_batch_size(sample, &report);
		self.batch_size.store(new_batch as u64, Ordering::Relaxed);

		let new_concurrency = self.recompute_global_concurrency(sample, &report);

		for class in OperationClass::RESIZABLE {
			let target = self.recompute_class_capacity(class, sample, &report, new_concurrency);
			self.admission.resize(class, target).await;
		}

		let new_period = self.recompute_control_period(sample, &report);
		self.control_period_ms.store(new_period.as_millis() as u64, Ordering::Relaxed);

		let new_processing_interval = self.recompute_processing_interval(sample, &report);
		self.processing_interval_ms
			.store(new_processing_interval.as_millis() as u64, Ordering::Relaxed);

		debug!(
			cpu = sample.cpu_load,
			mem = sample.mem_use,
			batch_size = new_batch,
			control_period_ms = new_period.as_millis() as u64,
			processing_interval_ms = new_processing_interval.as_millis() as u64,
			"adaptive tick"
		);
	}

	fn recompute_batch_size(&self, sample: HostSample, report: &crate::telemetry::PerformanceReport) -> u32 {
		let cfg = &self.config;
		let current = self.current_batch_size();
		if sample.cpu_load < cfg.cpu_low && sample.mem_use < cfg.mem_low && report.efficiency > 0.85 {
			(current + 50).clamp(cfg.min_batch, cfg.max_batch)
		} else if sample.cpu_load > cfg.cpu_high || sample.mem_use > cfg.mem_high || report.efficiency < 0.70 {
			current.saturating_sub(50).clamp(cfg.min_batch, cfg.max_batch)
		} else {
			let (rec_batch, _) = recommend(report.efficiency, report.current_throughput);
			rec_batch.clamp(cfg.min_batch, cfg.max_batch)
		}
	}

	fn recompute_global_concurrency(&self, sample: HostSample, report: &crate::telemetry::PerformanceReport) -> u32 {
		let cfg = &self.config;
		let current_total: u64 = OperationClass::SCHEDULED.iter().map(|c| self.admission.capacity(*c)).sum();
		let current = current_total as u32;
		if report.current_throughput < 50.0 && report.error_rate < 0.05 {
			(current + 20).clamp(cfg.min_concurrency, cfg.max_concurrency)
		} else if sample.cpu_load > cfg.cpu_high || report.error_rate > 0.15 {
			current.saturating_sub(20).clamp(cfg.min_concurrency, cfg.max_concurrency)
		} else {
			let (_, rec_concurrency) = recommend(report.efficiency, report.current_throughput);
			rec_concurrency.clamp(cfg.min_concurrency, cfg.max_concurrency)
		}
	}

	/// Computes the class's target capacity for this tick. The gating
	/// resource is CPU for CPU-bound classes (Discovery, Validation) and
	/// memory for I/O-heavy classes (Sync, Monitoring); `ApiCall`
	/// additionally gates on error rate.
	fn recompute_class_capacity(
		&self,
		class: OperationClass,
		sample: HostSample,
		report: &crate::telemetry::PerformanceReport,
		_global_concurrency_hint: u32,
	) -> u32 {
		let cfg = &self.config;
		let (grow, shrink) = class_delta(class);
		let current = self.admission.capacity(class) as u32;

		let class_ops = report.per_class_total_ops.get(class.as_str()).copied().unwrap_or(0);
		let share = class_ops as f64 / report.total_operations.max(1) as f64;

		let gating_low = match class {
			OperationClass::Sync | OperationClass::Monitoring => sample.mem_use < cfg.mem_low,
			_ => sample.cpu_load < cfg.cpu_low,
		};
		let gating_high = match class {
			OperationClass::Sync | OperationClass::Monitoring => sample.mem_use > cfg.mem_high,
			_ => sample.cpu_load > cfg.cpu_high,
		};
		let error_gate = class == OperationClass::ApiCall && report.error_rate > 0.15;

		if share > 0.5 && gating_low && !error_gate {
			current + grow
		} else if share < 0.1 || gating_high || error_gate {
			current.saturating_sub(shrink)
		} else {
			current
		}
	}

	fn recompute_control_period(&self, sample: HostSample, report: &crate::telemetry::PerformanceReport) -> Duration {
		let cfg = &self.config;
		let current = self.current_control_period();
		if sample.cpu_load > cfg.cpu_high || sample.mem_use > cfg.mem_high || report.efficiency < 0.70 {
			let shrunk = current.saturating_sub(Duration::from_secs(5));
			shrunk.clamp(cfg.control_period_min, cfg.control_period_max)
		} else if sample.cpu_load < cfg.cpu_low && report.efficiency > 0.85 {
			(current + Duration::from_secs(5)).clamp(cfg.control_period_min, cfg.control_period_max)
		} else {
			current
		}
	}

	/// Backs off the drain-loop cadence when the host is saturated or
	/// efficiency drops, tightens it when idle and efficient, otherwise
	/// leaves it unchanged. Moves independently of `recompute_control_period`:
	/// the two share host pressure as an input but not a value.
	fn recompute_processing_interval(&self, sample: HostSample, report: &crate::telemetry::PerformanceReport) -> Duration {
		let cfg = &self.config;
		let current = self.current_processing_interval();
		if sample.cpu_load > cfg.cpu_high || sample.mem_use > cfg.mem_high || report.efficiency < 0.70 {
			(current + Duration::from_millis(200)).clamp(cfg.processing_interval_min, cfg.processing_interval_max)
		} else if sample.cpu_load < cfg.cpu_low && sample.mem_use < cfg.mem_low && report.efficiency > 0.85 {
			current
				.saturating_sub(Duration::from_millis(100))
				.clamp(cfg.processing_interval_min, cfg.processing_interval_max)
		} else {
			current
		}
	}
}
