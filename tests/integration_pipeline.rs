//! End-to-end scenarios over the Operation Pipeline and its collaborators,
//! exercising the admission-bound and retry-budget invariants through the
//! same seams a real deployment would use.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeDirectory, FakeInstitution, FakeRepo};
use openfinance_resource_core::admission::{AdmissionConfig, AdmissionController};
use openfinance_resource_core::domain::{JobStatus, JobType, ProcessingJob, Resource, ResourceType};
use openfinance_resource_core::executor::{ExecutorConfig, StructuredBatchExecutor};
use openfinance_resource_core::health_registry::HealthRegistry;
use openfinance_resource_core::operation_class::OperationClass;
use openfinance_resource_core::pipeline::PipelineContext;
use openfinance_resource_core::ports::RepositoryPort;
use openfinance_resource_core::telemetry::TelemetryCollector;

fn context(repo: Arc<FakeRepo>, fail: bool) -> Arc<PipelineContext> {
	let telemetry = Arc::new(TelemetryCollector::new());
	Arc::new(PipelineContext {
		repository: repo,
		institution_client: Arc::new(FakeInstitution { fail }),
		directory_client: Arc::new(FakeDirectory { resources: vec![] }),
		admission: Arc::new(AdmissionController::new(AdmissionConfig::default(), telemetry.clone())),
		telemetry,
		resource_health: Arc::new(HealthRegistry::new()),
		executor_config: ExecutorConfig::default(),
	})
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn sync_batch_stamps_resources_and_reports_per_item_results() {
	let resources: Vec<Resource> = (0..5).map(|i| Resource::new(format!("r{i}"), "org1", ResourceType::Bank)).collect();
	let repo = Arc::new(FakeRepo::with_jobs(vec![], resources.clone()));
	let ctx = context(repo.clone(), false);

	let ids: Vec<String> = resources.iter().map(|r| r.resource_id.clone()).collect();
	let results = openfinance_resource_core::pipeline::sync::run_sync_batch(ids.clone(), ctx).await;

	assert_eq!(results.len(), 5);
	assert!(results.iter().all(|r| r.success));
	for id in &ids {
		let stored = repo.resources.lock().unwrap().get(id).cloned().expect("resource still present");
		assert!(stored.last_synced_at.is_some(), "sync must stamp last_synced_at on success");
	}
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn admission_never_exceeds_configured_capacity_under_concurrent_load() {
	let telemetry = Arc::new(TelemetryCollector::new());
	let admission = Arc::new(AdmissionController::new(AdmissionConfig::default(), telemetry));
	let capacity = admission.capacity(OperationClass::Sync);

	let mut handles = vec![];
	for _ in 0..(capacity * 3) {
		let admission = admission.clone();
		handles.push(tokio::spawn(async move {
			let permit = admission.try_acquire(OperationClass::Sync);
			if permit.is_some() {
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
			permit.is_some()
		}));
	}

	let mut granted = 0u64;
	for h in handles {
		if h.await.unwrap() {
			granted += 1;
		}
	}
	assert!(granted <= capacity);
	assert_eq!(admission.active(OperationClass::Sync), 0, "every permit must be released once its holder finishes");
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn retryable_failures_exhaust_budget_then_land_in_failed() {
	let job = ProcessingJob::new("j1", JobType::ResourceSync, "missing-resource", 2);
	let repo = Arc::new(FakeRepo::with_jobs(vec![job], vec![]));

	// SyncOperation's "resource not found" path is an invariant violation
	// (non-retryable), so drive the retry budget directly through the
	// repository contract instead to exercise the budget-exhaustion path in
	// isolation from any one operation's specific error classification.
	for _ in 0..2 {
		repo.increment_retry_count("j1").await.unwrap();
		repo.update_job_status("j1", JobStatus::Pending).await.unwrap();
		assert_eq!(repo.job_status("j1"), Some(JobStatus::Pending));
	}
	repo.mark_job_failed("j1", "still failing").await.unwrap();
	assert_eq!(repo.job_status("j1"), Some(JobStatus::Failed));
	assert_eq!(repo.retry_count("j1"), Some(2));
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn shutdown_on_failure_batch_cancels_remaining_siblings() {
	let items = vec![1u32, 2, 3, 4, 5];
	let result = StructuredBatchExecutor::run_shutdown_on_failure(items, Duration::from_secs(5), |item, _token| async move {
		if item == 2 {
			Err(openfinance_resource_core::error::CoreError::new(
				openfinance_resource_core::error::ErrorKind::ValidationError,
				"boom",
			))
		} else {
			tokio::time::sleep(Duration::from_millis(50)).await;
			Ok(())
		}
	})
	.await;
	assert!(result.is_err());
}

#[tokio::test]
#[cfg(feature = "integration-tests")]
async fn collect_all_batch_reports_every_item_regardless_of_individual_failures() {
	let items = vec![1u32, 2, 3];
	let results = StructuredBatchExecutor::run_collect_all(items, Duration::from_secs(5), |item| async move {
		if item == 2 {
			Err(openfinance_resource_core::error::CoreError::new(
				openfinance_resource_core::error::ErrorKind::Upstream5xx,
				"transient",
			))
		} else {
			Ok(())
		}
	})
	.await;
	assert_eq!(results.len(), 3);
	assert_eq!(results.iter().filter(|r| r.success).count(), 2);
	assert_eq!(results.iter().filter(|r| !r.success).count(), 1);
}
