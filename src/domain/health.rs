use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
	Up,
	Degraded,
	Down,
	Unknown,
}

/// Per-resource rolling health record, recomputed on every sample via the
/// weighted-update rule below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceHealth {
	pub status: HealthState,
	pub health_score: f64,
	pub avg_response_ms: f64,
	pub p95_response_ms: f64,
	pub p99_response_ms: f64,
	pub uptime: f64,
	pub total_requests: u64,
	pub successful_requests: u64,
	pub error_rate: f64,
}

impl Default for ResourceHealth {
	fn default() -> Self {
		Self {
			status: HealthState::Unknown,
			health_score: 0.0,
			avg_response_ms: 0.0,
			p95_response_ms: 0.0,
			p99_response_ms: 0.0,
			uptime: 1.0,
			total_requests: 0,
			successful_requests: 0,
			error_rate: 0.0,
		}
	}
}

impl ResourceHealth {
	/// `performanceScore` is piecewise on `(avg, p95)`: full credit under
	/// 200ms/500ms, linearly decaying to zero by 2s/5s. The breakpoints are
	/// this crate's own choice among several that would satisfy a
	/// piecewise-defined score.
	fn performance_score(avg_ms: f64, p95_ms: f64) -> f64 {
		fn score(value: f64, good: f64, bad: f64) -> f64 {
			if value <= good {
				1.0
			} else if value >= bad {
				0.0
			} else {
				1.0 - (value - good) / (bad - good)
			}
		}
		let avg_score = score(avg_ms, 200.0, 2_000.0);
		let p95_score = score(p95_ms, 500.0, 5_000.0);
		(avg_score + p95_score) / 2.0
	}

	/// `healthScore = 0.4*uptime + 0.3*performanceScore + 0.3*successRate`.
	fn recompute_health_score(&mut self) {
		let success_rate = if self.total_requests == 0 {
			1.0
		} else {
			self.successful_requests as f64 / self.total_requests as f64
		};
		let perf = Self::performance_score(self.avg_response_ms, self.p95_response_ms);
		self.health_score = 0.4 * self.uptime + 0.3 * perf + 0.3 * success_rate;
		self.status = if self.health_score >= 0.8 {
			HealthState::Up
		} else if self.health_score >= 0.4 {
			HealthState::Degraded
		} else {
			HealthState::Down
		};
	}

	/// Apply the weighted-update rule for a single monitoring sample.
	pub fn record_sample(&mut self, ok: bool, sample_ms: f64) {
		let new_total = self.total_requests + 1;
		let new_success = self.successful_requests + if ok { 1 } else { 0 };
		self.avg_response_ms =
			(self.avg_response_ms * self.total_requests as f64 + sample_ms) / new_total as f64;
		self.total_requests = new_total;
		self.successful_requests = new_success;
		self.error_rate = (new_total - new_success) as f64 / new_total as f64;
		// p95/p99 are exposed for API parity but this crate does not retain a
		// full sample distribution; approximate from the running average.
		self.p95_response_ms = self.avg_response_ms.max(self.p95_response_ms * 0.8 + sample_ms * 0.2);
		self.p99_response_ms = self.p95_response_ms.max(self.p99_response_ms * 0.8 + sample_ms * 0.2);
		self.uptime = new_success as f64 / new_total as f64;
		self.recompute_health_score();
	}
}
