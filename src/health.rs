//! Process-wide `HealthStatus` payload, the `GET /health` shape.
//! Not an HTTP handler — serving it is the out-of-scope collaborator's job —
//! just the computation and the DOWN-downgrade rule.

use serde::{Deserialize, Serialize};

use crate::adaptive::HostSample;
use crate::telemetry::PerformanceReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
	Up,
	Down,
}

/// `GET /health` payload: `{status, cpuUsage, memoryUsage, errorRate,
/// throughput, activeVirtualThreads}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
	pub status: OverallStatus,
	pub cpu_usage: f64,
	pub memory_usage: f64,
	pub error_rate: f64,
	pub throughput: f64,
	pub active_virtual_threads: u64,
}

impl HealthStatus {
	/// Downgrades to DOWN if error rate exceeds 25%, efficiency drops below
	/// 60%, or CPU/memory exceed 95%.
	pub fn compute(sample: HostSample, report: &PerformanceReport, active_concurrency_total: u64) -> Self {
		let down = report.error_rate > 0.25
			|| report.efficiency < 0.60
			|| sample.cpu_load > 0.95
			|| sample.mem_use > 0.95;
		Self {
			status: if down { OverallStatus::Down } else { OverallStatus::Up },
			cpu_usage: sample.cpu_load,
			memory_usage: sample.mem_use,
			error_rate: report.error_rate,
			throughput: report.current_throughput,
			active_virtual_threads: active_concurrency_total,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn report(error_rate: f64, efficiency: f64) -> PerformanceReport {
		PerformanceReport {
			discovered: 0,
			synced: 0,
			validated: 0,
			monitored: 0,
			batches: 0,
			errors: 0,
			api_calls: 0,
			total_operations: 100,
			successful_operations: (efficiency * 100.0) as u64,
			efficiency,
			error_rate,
			current_throughput: 10.0,
			avg_batch_size: 0.0,
			avg_batch_duration_ms: 0.0,
			per_class_mean_duration_ms: Default::default(),
			per_class_total_ops: Default::default(),
			active_concurrency: Default::default(),
			peak_concurrency: Default::default(),
		}
	}

	#[test]
	fn healthy_system_reports_up() {
		let status = HealthStatus::compute(HostSample { cpu_load: 0.2, mem_use: 0.2 }, &report(0.01, 0.99), 5);
		assert_eq!(status.status, OverallStatus::Up);
	}

	#[test]
	fn high_error_rate_downgrades_to_down() {
		let status = HealthStatus::compute(HostSample { cpu_load: 0.2, mem_use: 0.2 }, &report(0.3, 0.9), 5);
		assert_eq!(status.status, OverallStatus::Down);
	}

	#[test]
	fn saturated_host_downgrades_to_down() {
		let status = HealthStatus::compute(HostSample { cpu_load: 0.97, mem_use: 0.2 }, &report(0.0, 1.0), 5);
		assert_eq!(status.status, OverallStatus::Down);
	}
}
