//! In-process per-resource `ResourceHealth` state. Not part of the
//! persisted-state layout — only `Resource` snapshots and `ProcessingJob`
//! rows are persisted, so this lives alongside `TelemetryCollector` rather
//! than behind `RepositoryPort`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::ResourceHealth;

#[derive(Default)]
pub struct HealthRegistry {
	entries: Mutex<HashMap<String, ResourceHealth>>,
}

impl HealthRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn snapshot(&self, resource_id: &str) -> ResourceHealth {
		self.entries.lock().expect("health registry mutex poisoned").get(resource_id).cloned().unwrap_or_default()
	}

	/// Apply the weighted-update rule for one monitoring sample and return
	/// the resulting snapshot.
	pub fn record_sample(&self, resource_id: &str, ok: bool, sample_ms: f64) -> ResourceHealth {
		let mut entries = self.entries.lock().expect("health registry mutex poisoned");
		let entry = entries.entry(resource_id.to_string()).or_default();
		entry.record_sample(ok, sample_ms);
		entry.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unseen_resource_reports_default_health() {
		let registry = HealthRegistry::new();
		let snapshot = registry.snapshot("unknown");
		assert_eq!(snapshot.total_requests, 0);
	}

	#[test]
	fn recording_samples_accumulates_per_resource() {
		let registry = HealthRegistry::new();
		registry.record_sample("r1", true, 50.0);
		registry.record_sample("r1", true, 60.0);
		let snapshot = registry.snapshot("r1");
		assert_eq!(snapshot.total_requests, 2);
		assert!(snapshot.health_score > 0.9);
	}
}
