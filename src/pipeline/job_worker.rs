//! Job Worker. The drain loop: evaluate
//! `should_process_now`, fetch up to the current batch size, run collect-all,
//! apply per-result status transitions, sleep the adaptive processing
//! interval, and honor a 30 s graceful-stop window. Also invoked by a 60 s
//! scheduled backup trigger that is a no-op while a batch is already in
//! flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::adaptive::AdaptiveController;
use crate::domain::{JobStatus, JobType, ProcessingJob};
use crate::error::CoreError;
use crate::executor::StructuredBatchExecutor;
use crate::operation_class::OperationClass;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::discovery;
use crate::pipeline::generic::GenericJobOperation;
use crate::pipeline::monitoring::MonitoringOperation;
use crate::pipeline::operation::Operation;
use crate::pipeline::sync::SyncOperation;
use crate::pipeline::validation::ValidationOperation;

const STOP_GRACE: Duration = Duration::from_secs(30);
const SCHEDULED_BACKUP_INTERVAL: Duration = Duration::from_secs(60);

/// Dispatches a job to its operation by `job_type`. Discovery
/// has no `JobType` of its own (it operates over endpoints, not
/// jobs) so it never appears in this match.
fn dispatch(job_type: JobType) -> &'static dyn Operation {
	match job_type {
		JobType::ResourceSync => &SyncOperation,
		JobType::ResourceValidation => &ValidationOperation,
		JobType::ResourceMonitoring => &MonitoringOperation,
		JobType::ConsentProcessing | JobType::AccountSync | JobType::AccountBalanceUpdate | JobType::Custom => {
			&GenericJobOperation
		}
	}
}

pub struct JobWorker {
	ctx: Arc<PipelineContext>,
	adaptive: Arc<AdaptiveController>,
	discovery_endpoints: Vec<String>,
	batch_in_flight: AtomicBool,
}

impl JobWorker {
	pub fn new(ctx: Arc<PipelineContext>, adaptive: Arc<AdaptiveController>, discovery_endpoints: Vec<String>) -> Self {
		Self { ctx, adaptive, discovery_endpoints, batch_in_flight: AtomicBool::new(false) }
	}

	/// `shouldProcessNow()`: false if CPU/memory are above their high
	/// thresholds, if `BatchProcessing` has no free permit, or if a previous
	/// batch is still in flight.
	fn should_process_now(&self) -> bool {
		if self.batch_in_flight.load(Ordering::SeqCst) {
			return false;
		}
		let sample = self.adaptive.sample_host();
		let cfg = self.adaptive.config();
		if sample.cpu_load > cfg.cpu_high || sample.mem_use > cfg.mem_high {
			return false;
		}
		self.ctx.admission.active(OperationClass::BatchProcessing) < self.ctx.admission.capacity(OperationClass::BatchProcessing)
	}

	/// The continuous drain loop. Runs until `token` is cancelled, then awaits
	/// the in-flight batch up to `STOP_GRACE` before returning.
	#[instrument(skip(self, token))]
	pub async fn run(self: Arc<Self>, token: CancellationToken) {
		loop {
			tokio::select! {
				biased;
				_ = token.cancelled() => break,
				_ = async {
					if self.should_process_now() {
						self.run_one_batch().await;
					}
					tokio::time::sleep(self.adaptive.current_processing_interval()).await;
				} => {}
			}
		}
		info!("stop signal received, awaiting in-flight batch");
		let wait_for_drain = async {
			while self.batch_in_flight.load(Ordering::SeqCst) {
				tokio::time::sleep(Duration::from_millis(100)).await;
			}
		};
		if tokio::time::timeout(STOP_GRACE, wait_for_drain).await.is_err() {
			warn!("batch did not drain within grace period, exiting anyway");
		}
	}

	/// The 60 s scheduled backup trigger. A no-op while a batch is already in
	/// flight.
	pub async fn run_scheduled_backup(self: Arc<Self>, token: CancellationToken) {
		loop {
			tokio::select! {
				biased;
				_ = token.cancelled() => break,
				_ = tokio::time::sleep(SCHEDULED_BACKUP_INTERVAL) => {}
			}
			if !self.discovery_endpoints.is_empty() {
				if let Err(e) = discovery::run_discovery_round(self.discovery_endpoints.clone(), &self.ctx).await {
					warn!(error = %e.message, "scheduled discovery round failed");
				}
			}
			if !self.batch_in_flight.load(Ordering::SeqCst) {
				self.run_one_batch().await;
			}
		}
	}

	async fn run_one_batch(&self) {
		self.batch_in_flight.store(true, Ordering::SeqCst);
		let outcome = self.process_batch().await;
		self.batch_in_flight.store(false, Ordering::SeqCst);
		if let Err(e) = outcome {
			warn!(error = %e.message, "batch fetch failed");
		}
	}

	async fn process_batch(&self) -> Result<(), CoreError> {
		let limit = self.adaptive.current_batch_size();
		let jobs = self.ctx.repository.fetch_next_batch(limit).await?;
		if jobs.is_empty() {
			return Ok(());
		}

		let deadline = self.ctx.executor_config.sync_timeout;
		let ctx = Arc::clone(&self.ctx);
		let results = StructuredBatchExecutor::run_collect_all(jobs, deadline, move |job| {
			let ctx = ctx.clone();
			async move { run_job(job, &ctx).await }
		})
		.await;

		let count = results.len();
		let mut errors = 0u64;
		for result in &results {
			if !result.success {
				errors += 1;
			}
			apply_result(&self.ctx, result).await;
		}
		self.ctx.telemetry.record_batch(count, 0);
		if errors > 0 {
			info!(errors, total = count, "batch completed with errors");
		}
		Ok(())
	}
}

async fn run_job(mut job: ProcessingJob, ctx: &PipelineContext) -> Result<(), CoreError> {
	job.mark_running();
	let operation = dispatch(job.job_type);
	operation.execute(&job, ctx).await
}

/// Applies the per-result status transition:
/// success → `Completed`; retryable failure with budget → `Pending` with
/// incremented `retryCount`; otherwise → `Failed`. Admission denial is
/// excluded from the failure path entirely — callers must not route it here.
async fn apply_result(ctx: &PipelineContext, result: &crate::executor::ItemResult<ProcessingJob>) {
	let job = &result.item_id;
	if result.success {
		let _ = ctx.repository.mark_job_completed(&job.id).await;
		return;
	}

	let error = result.error.as_ref();
	if let Some(e) = error {
		if e.kind == crate::error::ErrorKind::AdmissionDenied {
			// Not a failure: leave the job Pending for the next cycle.
			return;
		}
	}

	let message = error.map(|e| e.message.clone()).unwrap_or_else(|| "unknown failure".to_string());
	let fatal = error.map(|e| !e.retryable()).unwrap_or(true);

	if !fatal && job.executions_remaining() > 1 {
		let _ = ctx.repository.increment_retry_count(&job.id).await;
		let _ = ctx.repository.update_job_status(&job.id, JobStatus::Pending).await;
	} else {
		let _ = ctx.repository.mark_job_failed(&job.id, &message).await;
	}
}
