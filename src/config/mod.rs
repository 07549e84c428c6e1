use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

/// Runtime configuration for the core.
///
/// Values are loaded from (in order): `config` file (optional) and
/// environment variables prefixed with `OFRC_` (e.g. `OFRC_SCHEDULER__BATCH__SIZE`).
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
	pub resources_enabled: bool,
	pub scheduler_enabled: bool,
	pub scheduler_startup_delay_ms: u64,
	pub scheduler_backup_interval_ms: u64,
	pub scheduler_batch_size: u32,
	pub scheduler_max_concurrent: u32,
	pub scheduler_retry_max_attempts: u32,
	pub scheduler_timeout_task_ms: u64,
	pub scheduler_timeout_batch_ms: u64,
	pub adaptive_memory_threshold: f64,
	pub adaptive_cpu_threshold: f64,
	pub adaptive_interval_min_ms: u64,
	pub adaptive_interval_max_ms: u64,
	pub batch_size_bound_min: u32,
	pub batch_size_bound_max: u32,
	pub batch_max_concurrent: u32,
	pub batch_parallel_factor: u32,
}

impl Default for CoreConfig {
	fn default() -> Self {
		Self {
			resources_enabled: true,
			scheduler_enabled: true,
			scheduler_startup_delay_ms: 0,
			scheduler_backup_interval_ms: 60_000,
			scheduler_batch_size: 100,
			scheduler_max_concurrent: 100,
			scheduler_retry_max_attempts: 3,
			scheduler_timeout_task_ms: 30_000,
			scheduler_timeout_batch_ms: 120_000,
			adaptive_memory_threshold: 0.85,
			adaptive_cpu_threshold: 0.80,
			adaptive_interval_min_ms: 10_000,
			adaptive_interval_max_ms: 120_000,
			batch_size_bound_min: 50,
			batch_size_bound_max: 1000,
			batch_max_concurrent: 500,
			batch_parallel_factor: 4,
		}
	}
}

impl CoreConfig {
	pub fn scheduler_timeout_task(&self) -> Duration {
		Duration::from_millis(self.scheduler_timeout_task_ms)
	}

	pub fn scheduler_timeout_batch(&self) -> Duration {
		Duration::from_millis(self.scheduler_timeout_batch_ms)
	}

	pub fn scheduler_startup_delay(&self) -> Duration {
		Duration::from_millis(self.scheduler_startup_delay_ms)
	}

	pub fn scheduler_backup_interval(&self) -> Duration {
		Duration::from_millis(self.scheduler_backup_interval_ms)
	}
}

/// Partial settings used to overlay environment/file values on top of
/// defaults; every field optional so a sparse environment never clobbers a
/// default with `None`.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
	resources_enabled: Option<bool>,
	scheduler_enabled: Option<bool>,
	scheduler_startup_delay_ms: Option<u64>,
	scheduler_backup_interval_ms: Option<u64>,
	scheduler_batch_size: Option<u32>,
	scheduler_max_concurrent: Option<u32>,
	scheduler_retry_max_attempts: Option<u32>,
	scheduler_timeout_task_ms: Option<u64>,
	scheduler_timeout_batch_ms: Option<u64>,
	adaptive_memory_threshold: Option<f64>,
	adaptive_cpu_threshold: Option<f64>,
	adaptive_interval_min_ms: Option<u64>,
	adaptive_interval_max_ms: Option<u64>,
	batch_size_bound_min: Option<u32>,
	batch_size_bound_max: Option<u32>,
	batch_max_concurrent: Option<u32>,
	batch_parallel_factor: Option<u32>,
}

/// Load configuration from an optional `config` file and `OFRC_`-prefixed
/// environment variables, then apply a direct-env-var overlay pass.
///
/// The two-pass pattern — `config` crate layering, then a second explicit
/// `std::env::var` read per field — is deliberate: some environments (CI,
/// test harnesses) set env vars in ways the `config` crate's automatic
/// double-underscore mapping doesn't always catch, so the direct reads are
/// the authoritative final word.
pub fn load() -> Result<CoreConfig> {
	let builder = config::Config::builder()
		.add_source(config::File::with_name("config").required(false))
		.add_source(config::Environment::with_prefix("OFRC").separator("__"));

	let cfg = builder.build()?;
	let partial: PartialConfig = cfg.try_deserialize().unwrap_or_default();

	let mut c = CoreConfig::default();
	macro_rules! overlay {
		($field:ident) => {
			if let Some(v) = partial.$field {
				c.$field = v;
			}
		};
	}
	overlay!(resources_enabled);
	overlay!(scheduler_enabled);
	overlay!(scheduler_startup_delay_ms);
	overlay!(scheduler_backup_interval_ms);
	overlay!(scheduler_batch_size);
	overlay!(scheduler_max_concurrent);
	overlay!(scheduler_retry_max_attempts);
	overlay!(scheduler_timeout_task_ms);
	overlay!(scheduler_timeout_batch_ms);
	overlay!(adaptive_memory_threshold);
	overlay!(adaptive_cpu_threshold);
	overlay!(adaptive_interval_min_ms);
	overlay!(adaptive_interval_max_ms);
	overlay!(batch_size_bound_min);
	overlay!(batch_size_bound_max);
	overlay!(batch_max_concurrent);
	overlay!(batch_parallel_factor);

	// Explicit direct-env-var overlay, mirroring the defensive second pass
	// used for the original Settings loader.
	macro_rules! overlay_env_bool {
		($var:literal, $field:ident) => {
			if let Ok(v) = std::env::var($var) {
				if let Ok(parsed) = v.parse::<bool>() {
					c.$field = parsed;
				}
			}
		};
	}
	macro_rules! overlay_env_num {
		($var:literal, $field:ident, $ty:ty) => {
			if let Ok(v) = std::env::var($var) {
				if let Ok(parsed) = v.parse::<$ty>() {
					c.$field = parsed;
				}
			}
		};
	}

	overlay_env_bool!("OFRC_RESOURCES_ENABLED", resources_enabled);
	overlay_env_bool!("OFRC_SCHEDULER_ENABLED", scheduler_enabled);
	overlay_env_num!("OFRC_SCHEDULER_STARTUP_DELAY_MS", scheduler_startup_delay_ms, u64);
	overlay_env_num!("OFRC_SCHEDULER_BACKUP_INTERVAL_MS", scheduler_backup_interval_ms, u64);
	overlay_env_num!("OFRC_SCHEDULER_BATCH_SIZE", scheduler_batch_size, u32);
	overlay_env_num!("OFRC_SCHEDULER_MAX_CONCURRENT", scheduler_max_concurrent, u32);
	overlay_env_num!("OFRC_SCHEDULER_RETRY_MAX_ATTEMPTS", scheduler_retry_max_attempts, u32);
	overlay_env_num!("OFRC_SCHEDULER_TIMEOUT_TASK_MS", scheduler_timeout_task_ms, u64);
	overlay_env_num!("OFRC_SCHEDULER_TIMEOUT_BATCH_MS", scheduler_timeout_batch_ms, u64);
	overlay_env_num!("OFRC_ADAPTIVE_MEMORY_THRESHOLD", adaptive_memory_threshold, f64);
	overlay_env_num!("OFRC_ADAPTIVE_CPU_THRESHOLD", adaptive_cpu_threshold, f64);
	overlay_env_num!("OFRC_ADAPTIVE_INTERVAL_MIN_MS", adaptive_interval_min_ms, u64);
	overlay_env_num!("OFRC_ADAPTIVE_INTERVAL_MAX_MS", adaptive_interval_max_ms, u64);
	overlay_env_num!("OFRC_BATCH_SIZE_BOUND_MIN", batch_size_bound_min, u32);
	overlay_env_num!("OFRC_BATCH_SIZE_BOUND_MAX", batch_size_bound_max, u32);
	overlay_env_num!("OFRC_BATCH_MAX_CONCURRENT", batch_max_concurrent, u32);
	overlay_env_num!("OFRC_BATCH_PARALLEL_FACTOR", batch_parallel_factor, u32);

	Ok(c)
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use std::env;

	#[test]
	fn load_defaults_and_env_overlay() {
		let orig = env::var_os("OFRC_SCHEDULER_BATCH_SIZE");
		unsafe { env::remove_var("OFRC_SCHEDULER_BATCH_SIZE") };

		let c = load().expect("load should succeed with defaults");
		let d = CoreConfig::default();
		assert_eq!(c.scheduler_batch_size, d.scheduler_batch_size);
		assert_eq!(c.resources_enabled, d.resources_enabled);

		unsafe { env::set_var("OFRC_SCHEDULER_BATCH_SIZE", "250") };
		let c2 = load().expect("load should succeed with env");
		assert_eq!(c2.scheduler_batch_size, 250);

		match orig {
			Some(v) => unsafe { env::set_var("OFRC_SCHEDULER_BATCH_SIZE", v) },
			None => unsafe { env::remove_var("OFRC_SCHEDULER_BATCH_SIZE") },
		}
	}

	#[test]
	fn master_switches_default_to_enabled() {
		let c = CoreConfig::default();
		assert!(c.resources_enabled);
		assert!(c.scheduler_enabled);
	}
}
