//! Discovery. Runs over a set of discovery endpoints, not
//! over `ProcessingJob`s — the job worker never dispatches into this module;
//! it is invoked as its own round by the scheduler bootstrapping collaborator
//! (out of scope) or directly by a caller that owns the endpoint list.

use tracing::instrument;

use crate::domain::Resource;
use crate::error::{CoreError, ErrorKind};
use crate::executor::StructuredBatchExecutor;
use crate::operation_class::OperationClass;
use crate::pipeline::context::PipelineContext;

/// Runs discovery for every endpoint as a shutdown-on-failure batch: a
/// single malformed directory aborts the round, recorded as a retryable
/// error.
#[instrument(skip(ctx, endpoints))]
pub async fn run_discovery_round(endpoints: Vec<String>, ctx: &PipelineContext) -> Result<(), CoreError> {
	let admission = ctx.admission.clone();
	let directory_client = ctx.directory_client.clone();
	let repository = ctx.repository.clone();
	let telemetry = ctx.telemetry.clone();
	let deadline = ctx.executor_config.discovery_timeout;

	StructuredBatchExecutor::run_shutdown_on_failure(endpoints, deadline, move |endpoint, _token| {
		let admission = admission.clone();
		let directory_client = directory_client.clone();
		let repository = repository.clone();
		let telemetry = telemetry.clone();
		async move {
			let start = std::time::Instant::now();
			let permit = admission
				.try_acquire(OperationClass::Discovery)
				.ok_or_else(CoreError::admission_denied)?;

			let result = discover_one(&endpoint, &directory_client, &repository).await;
			drop(permit);

			let ok = result.is_ok();
			telemetry.record_operation(OperationClass::Discovery, ok, start.elapsed().as_millis() as u64);
			if let Err(e) = &result {
				telemetry.record_error(e.kind, OperationClass::Discovery, e.retryable());
			}
			result
		}
	})
	.await
}

async fn discover_one(
	endpoint: &str,
	directory_client: &std::sync::Arc<dyn crate::ports::DirectoryClientPort>,
	repository: &std::sync::Arc<dyn crate::ports::RepositoryPort>,
) -> Result<(), CoreError> {
	let discovered = directory_client.list_resources(endpoint).await.map_err(|e| {
		CoreError::new(ErrorKind::Upstream5xx, format!("directory listing failed for {endpoint}: {}", e.message))
	})?;

	let resources: Vec<Resource> = discovered
		.into_iter()
		.map(|d| Resource::new(d.resource_id, d.organization_id, d.resource_type))
		.collect();

	repository.save_all(&resources).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::admission::{AdmissionConfig, AdmissionController};
	use crate::domain::{ResourceStatus, ResourceType};
	use crate::ports::{DiscoveredResource, InstitutionResponse, RequestHeaders};
	use async_trait::async_trait;
	use std::sync::{Arc, Mutex};

	struct FakeDirectory {
		resources: Vec<DiscoveredResource>,
		fail: bool,
	}

	#[async_trait]
	impl crate::ports::DirectoryClientPort for FakeDirectory {
		async fn list_resources(&self, _endpoint: &str) -> Result<Vec<DiscoveredResource>, CoreError> {
			if self.fail {
				Err(CoreError::new(ErrorKind::Upstream5xx, "directory down"))
			} else {
				Ok(self.resources.clone())
			}
		}
	}

	impl Clone for DiscoveredResource {
		fn clone(&self) -> Self {
			Self {
				resource_id: self.resource_id.clone(),
				organization_id: self.organization_id.clone(),
				resource_type: self.resource_type,
			}
		}
	}

	struct FakeRepo {
		saved: Mutex<Vec<Resource>>,
	}

	#[async_trait]
	impl crate::ports::RepositoryPort for FakeRepo {
		async fn fetch_next_batch(&self, _limit: u32) -> Result<Vec<crate::domain::ProcessingJob>, CoreError> {
			Ok(vec![])
		}
		async fn update_job_status(&self, _id: &str, _status: crate::domain::JobStatus) -> Result<(), CoreError> {
			Ok(())
		}
		async fn increment_retry_count(&self, _id: &str) -> Result<(), CoreError> {
			Ok(())
		}
		async fn mark_job_completed(&self, _id: &str) -> Result<(), CoreError> {
			Ok(())
		}
		async fn mark_job_failed(&self, _id: &str, _error_message: &str) -> Result<(), CoreError> {
			Ok(())
		}
		async fn count_by_status(&self, _status: crate::domain::JobStatus) -> Result<u64, CoreError> {
			Ok(0)
		}
		async fn save(&self, resource: &Resource) -> Result<(), CoreError> {
			self.saved.lock().unwrap().push(resource.clone());
			Ok(())
		}
		async fn save_all(&self, resources: &[Resource]) -> Result<(), CoreError> {
			self.saved.lock().unwrap().extend(resources.iter().cloned());
			Ok(())
		}
		async fn find_by_id(&self, _resource_id: &str) -> Result<Option<Resource>, CoreError> {
			Ok(None)
		}
		async fn find_by_status(&self, _status: ResourceStatus) -> Result<Vec<Resource>, CoreError> {
			Ok(vec![])
		}
		async fn find_by_organization_id(&self, _organization_id: &str) -> Result<Vec<Resource>, CoreError> {
			Ok(vec![])
		}
		async fn find_resources_needing_sync(
			&self,
			_threshold: chrono::DateTime<chrono::Utc>,
		) -> Result<Vec<Resource>, CoreError> {
			Ok(vec![])
		}
		async fn find_resources_needing_validation(
			&self,
			_threshold: chrono::DateTime<chrono::Utc>,
		) -> Result<Vec<Resource>, CoreError> {
			Ok(vec![])
		}
		async fn find_resources_needing_monitoring(
			&self,
			_threshold: chrono::DateTime<chrono::Utc>,
		) -> Result<Vec<Resource>, CoreError> {
			Ok(vec![])
		}
		async fn update_resource_status(&self, _resource_id: &str, _status: ResourceStatus) -> Result<(), CoreError> {
			Ok(())
		}
		async fn update_last_sync_at(
			&self,
			_resource_id: &str,
			_at: chrono::DateTime<chrono::Utc>,
		) -> Result<(), CoreError> {
			Ok(())
		}
	}

	struct FakeInstitution;
	#[async_trait]
	impl crate::ports::InstitutionClientPort for FakeInstitution {
		async fn call(
			&self,
			_method: &str,
			_path: &str,
			_body: Option<&str>,
			_headers: &RequestHeaders,
		) -> Result<InstitutionResponse, CoreError> {
			Ok(InstitutionResponse { status: 200, body: String::new(), x_fapi_interaction_id: "x".into() })
		}
	}

	fn context(directory: FakeDirectory, repo: Arc<FakeRepo>) -> PipelineContext {
		let telemetry = Arc::new(crate::telemetry::TelemetryCollector::new());
		PipelineContext {
			repository: repo,
			institution_client: Arc::new(FakeInstitution),
			directory_client: Arc::new(directory),
			admission: Arc::new(AdmissionController::new(AdmissionConfig::default(), telemetry.clone())),
			telemetry,
			resource_health: Arc::new(crate::health_registry::HealthRegistry::new()),
			executor_config: crate::executor::ExecutorConfig::default(),
		}
	}

	#[tokio::test]
	async fn discovery_round_persists_discovered_resources() {
		let directory = FakeDirectory {
			resources: vec![DiscoveredResource {
				resource_id: "r1".into(),
				organization_id: "org1".into(),
				resource_type: ResourceType::Bank,
			}],
			fail: false,
		};
		let repo = Arc::new(FakeRepo { saved: Mutex::new(vec![]) });
		let ctx = context(directory, repo.clone());
		let result = run_discovery_round(vec!["https://directory.example/v1".into()], &ctx).await;
		assert!(result.is_ok());
		assert_eq!(repo.saved.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn malformed_directory_aborts_round() {
		let directory = FakeDirectory { resources: vec![], fail: true };
		let repo = Arc::new(FakeRepo { saved: Mutex::new(vec![]) });
		let ctx = context(directory, repo);
		let result = run_discovery_round(vec!["https://directory.example/v1".into()], &ctx).await;
		assert!(result.is_err());
	}
}
