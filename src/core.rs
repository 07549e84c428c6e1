//! `Core` ties C1–C5 together into one explicitly-constructed object, not an
//! ambient global (Design Note "Global singletons"): a caller builds one
//! `Core` per process, hands it the three out-of-scope port implementations,
//! and calls `start` to spawn the adaptive controller and job worker.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adaptive::{AdaptiveConfig, AdaptiveController, ProcHostSampler};
use crate::admission::{AdmissionConfig, AdmissionController};
use crate::config::CoreConfig;
use crate::executor::ExecutorConfig;
use crate::health_registry::HealthRegistry;
use crate::pipeline::{JobWorker, PipelineContext};
use crate::ports::{DirectoryClientPort, InstitutionClientPort, RepositoryPort};
use crate::telemetry::TelemetryCollector;

pub struct Core {
	pub telemetry: Arc<TelemetryCollector>,
	pub admission: Arc<AdmissionController>,
	pub adaptive: Arc<AdaptiveController>,
	pub pipeline_ctx: Arc<PipelineContext>,
	pub job_worker: Arc<JobWorker>,
	pub config: CoreConfig,
}

impl Core {
	pub fn new(
		config: CoreConfig,
		repository: Arc<dyn RepositoryPort>,
		institution_client: Arc<dyn InstitutionClientPort>,
		directory_client: Arc<dyn DirectoryClientPort>,
		discovery_endpoints: Vec<String>,
	) -> Arc<Self> {
		let telemetry = Arc::new(TelemetryCollector::new());
		let admission = Arc::new(AdmissionController::new(AdmissionConfig::default(), Arc::clone(&telemetry)));

		let adaptive_config = AdaptiveConfig {
			cpu_high: config.adaptive_cpu_threshold,
			mem_high: config.adaptive_memory_threshold,
			min_batch: config.batch_size_bound_min,
			max_batch: config.batch_size_bound_max,
			max_concurrency: config.batch_max_concurrent,
			control_period_min: std::time::Duration::from_millis(config.adaptive_interval_min_ms),
			control_period_max: std::time::Duration::from_millis(config.adaptive_interval_max_ms),
			..AdaptiveConfig::default()
		};
		let adaptive = Arc::new(AdaptiveController::new(
			adaptive_config,
			Arc::clone(&admission),
			Arc::clone(&telemetry),
			Box::new(ProcHostSampler),
		));

		let executor_config = ExecutorConfig {
			sync_timeout: config.scheduler_timeout_task(),
			..ExecutorConfig::default()
		};

		let pipeline_ctx = Arc::new(PipelineContext {
			repository,
			institution_client,
			directory_client,
			admission: Arc::clone(&admission),
			telemetry: Arc::clone(&telemetry),
			resource_health: Arc::new(HealthRegistry::new()),
			executor_config,
		});

		let job_worker = Arc::new(JobWorker::new(Arc::clone(&pipeline_ctx), Arc::clone(&adaptive), discovery_endpoints));

		Arc::new(Self { telemetry, admission, adaptive, pipeline_ctx, job_worker, config })
	}

	/// Spawns C3 and C5's two long-running tasks. A no-op for whichever half
	/// its matching `*_enabled` master switch turns off.
	pub fn start(self: &Arc<Self>, token: CancellationToken) {
		if self.config.resources_enabled {
			let adaptive = Arc::clone(&self.adaptive);
			let adaptive_token = token.clone();
			tokio::spawn(async move {
				info!("adaptive controller starting");
				adaptive.run(adaptive_token).await;
				info!("adaptive controller stopped");
			});
		}

		if self.config.scheduler_enabled {
			let worker = Arc::clone(&self.job_worker);
			let worker_token = token.clone();
			let startup_delay = self.config.scheduler_startup_delay();
			tokio::spawn(async move {
				if !startup_delay.is_zero() {
					tokio::time::sleep(startup_delay).await;
				}
				info!("job worker starting");
				worker.run(worker_token).await;
				info!("job worker stopped");
			});

			let backup_worker = Arc::clone(&self.job_worker);
			let backup_token = token.clone();
			tokio::spawn(async move {
				backup_worker.run_scheduled_backup(backup_token).await;
			});
		}
	}
}
