//! C2 — Admission Controller.
//!
//! Six independent bounded counting semaphores, one per `OperationClass`,
//! with non-blocking `try_acquire` so the scheduler never stalls on
//! admission: only `try_acquire`, never a blocking acquire, on the
//! admission path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::operation_class::OperationClass;
use crate::telemetry::TelemetryCollector;

/// Initial capacities and resize bounds for every class.
/// `batch_processing`'s bound is fixed at 10.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionConfig {
	pub discovery_initial: u32,
	pub discovery_bounds: (u32, u32),
	pub sync_initial: u32,
	pub sync_bounds: (u32, u32),
	pub validation_initial: u32,
	pub validation_bounds: (u32, u32),
	pub monitoring_initial: u32,
	pub monitoring_bounds: (u32, u32),
	pub api_call_initial: u32,
	pub api_call_bounds: (u32, u32),
	pub batch_processing_initial: u32,
}

impl Default for AdmissionConfig {
	fn default() -> Self {
		Self {
			discovery_initial: 50,
			discovery_bounds: (5, 200),
			sync_initial: 75,
			sync_bounds: (10, 300),
			validation_initial: 30,
			validation_bounds: (5, 100),
			monitoring_initial: 40,
			monitoring_bounds: (5, 150),
			api_call_initial: 200,
			api_call_bounds: (20, 1000),
			batch_processing_initial: 10,
		}
	}
}

impl AdmissionConfig {
	fn initial(&self, class: OperationClass) -> u32 {
		match class {
			OperationClass::Discovery => self.discovery_initial,
			OperationClass::Sync => self.sync_initial,
			OperationClass::Validation => self.validation_initial,
			OperationClass::Monitoring => self.monitoring_initial,
			OperationClass::ApiCall => self.api_call_initial,
			OperationClass::BatchProcessing => self.batch_processing_initial,
		}
	}

	/// Bounds for `resize`. `BatchProcessing` is fixed at its initial value.
	pub fn bounds(&self, class: OperationClass) -> (u32, u32) {
		match class {
			OperationClass::Discovery => self.discovery_bounds,
			OperationClass::Sync => self.sync_bounds,
			OperationClass::Validation => self.validation_bounds,
			OperationClass::Monitoring => self.monitoring_bounds,
			OperationClass::ApiCall => self.api_call_bounds,
			OperationClass::BatchProcessing => (self.batch_processing_initial, self.batch_processing_initial),
		}
	}
}

struct ClassSemaphore {
	semaphore: Arc<Semaphore>,
	capacity: AtomicU64,
	active: Arc<AtomicU64>,
}

/// RAII guard returned by `try_acquire`. Releasing the active count and the
/// underlying semaphore permit happens on every exit path, including panics
/// and cancellation, because it happens in `Drop` — this is the mechanism
/// behind the no-permit-leak invariant.
pub struct AdmissionPermit {
	class: OperationClass,
	active: Arc<AtomicU64>,
	telemetry: Option<Arc<TelemetryCollector>>,
	_permit: tokio::sync::OwnedSemaphorePermit,
}

impl Drop for AdmissionPermit {
	fn drop(&mut self) {
		let remaining = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
		if let Some(t) = &self.telemetry {
			t.set_active(self.class, remaining);
		}
	}
}

pub struct AdmissionController {
	classes: HashMap<OperationClass, ClassSemaphore>,
	config: AdmissionConfig,
	telemetry: Arc<TelemetryCollector>,
}

/// Live view of one class's admission state, for `utilization()`.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ClassUtilization {
	pub active: u64,
	pub available: u64,
	pub capacity: u64,
}

/// `GET /metrics/resources` payload shape. Host CPU/memory
/// are filled in by the caller (the adaptive controller owns the host
/// sampler); admission only knows about permits.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceUtilization {
	pub classes: HashMap<String, ClassUtilization>,
}

impl AdmissionController {
	pub fn new(config: AdmissionConfig, telemetry: Arc<TelemetryCollector>) -> Self {
		let mut classes = HashMap::new();
		for class in OperationClass::ALL {
			let capacity = config.initial(class);
			classes.insert(
				class,
				ClassSemaphore {
					semaphore: Arc::new(Semaphore::new(capacity as usize)),
					capacity: AtomicU64::new(capacity as u64),
					active: Arc::new(AtomicU64::new(0)),
				},
			);
		}
		Self { classes, config, telemetry }
	}

	fn class(&self, class: OperationClass) -> &ClassSemaphore {
		self.classes.get(&class).expect("every OperationClass is registered")
	}

	/// Non-blocking acquisition. Returns `None` on saturation; callers must
	/// treat that as "skip this item, not an error".
	pub fn try_acquire(self: &Arc<Self>, class: OperationClass) -> Option<AdmissionPermit> {
		let entry = self.class(class);
		let permit = Arc::clone(&entry.semaphore).try_acquire_owned().ok()?;
		let active = entry.active.fetch_add(1, Ordering::SeqCst) + 1;
		self.telemetry.set_active(class, active);
		Some(AdmissionPermit {
			class,
			active: Arc::clone(&entry.active),
			telemetry: Some(Arc::clone(&self.telemetry)),
			_permit: permit,
		})
	}

	/// Atomically resize `class`'s capacity to `new_capacity`, clamped to
	/// the class's declared bounds. Growing releases extra permits
	/// immediately; shrinking acquires-and-forgets the delta, which may
	/// briefly block if more work is currently in flight than the new cap
	/// allows — an accepted tradeoff of the resize contract.
	pub async fn resize(&self, class: OperationClass, new_capacity: u32) {
		let (lo, hi) = self.config.bounds(class);
		let new_capacity = new_capacity.clamp(lo, hi) as u64;
		let entry = self.class(class);
		let current = entry.capacity.load(Ordering::SeqCst);
		if new_capacity == current {
			return;
		}
		if new_capacity > current {
			let delta = (new_capacity - current) as usize;
			entry.semaphore.add_permits(delta);
		} else {
			let delta = (current - new_capacity) as u32;
			if let Ok(permits) = entry.semaphore.acquire_many(delta).await {
				permits.forget();
			}
		}
		entry.capacity.store(new_capacity, Ordering::SeqCst);
	}

	pub fn capacity(&self, class: OperationClass) -> u64 {
		self.class(class).capacity.load(Ordering::SeqCst)
	}

	pub fn active(&self, class: OperationClass) -> u64 {
		self.class(class).active.load(Ordering::SeqCst)
	}

	pub fn utilization(&self) -> ResourceUtilization {
		let mut classes = HashMap::new();
		for class in OperationClass::ALL {
			let entry = self.class(class);
			let capacity = entry.capacity.load(Ordering::SeqCst);
			let active = entry.active.load(Ordering::SeqCst);
			classes.insert(
				class.as_str().to_string(),
				ClassUtilization {
					active,
					available: capacity.saturating_sub(active),
					capacity,
				},
			);
		}
		ResourceUtilization { classes }
	}
}
