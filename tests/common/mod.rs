//! Shared in-memory port fakes for integration tests against `Core` and the
//! pipeline operations end to end.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openfinance_resource_core::domain::{JobStatus, ProcessingJob, Resource, ResourceStatus};
use openfinance_resource_core::error::CoreError;
use openfinance_resource_core::ports::{
	DirectoryClientPort, DiscoveredResource, InstitutionClientPort, InstitutionResponse, RepositoryPort, RequestHeaders,
};

#[derive(Default)]
pub struct FakeRepo {
	pub resources: Mutex<HashMap<String, Resource>>,
	pub jobs: Mutex<HashMap<String, ProcessingJob>>,
}

impl FakeRepo {
	pub fn with_jobs(jobs: Vec<ProcessingJob>, resources: Vec<Resource>) -> Self {
		let repo = Self::default();
		for j in jobs {
			repo.jobs.lock().unwrap().insert(j.id.clone(), j);
		}
		for r in resources {
			repo.resources.lock().unwrap().insert(r.resource_id.clone(), r);
		}
		repo
	}

	pub fn job_status(&self, id: &str) -> Option<JobStatus> {
		self.jobs.lock().unwrap().get(id).map(|j| j.status)
	}

	pub fn retry_count(&self, id: &str) -> Option<u32> {
		self.jobs.lock().unwrap().get(id).map(|j| j.retry_count)
	}
}

#[async_trait]
impl RepositoryPort for FakeRepo {
	async fn fetch_next_batch(&self, limit: u32) -> Result<Vec<ProcessingJob>, CoreError> {
		let jobs = self.jobs.lock().unwrap();
		Ok(jobs.values().filter(|j| j.status == JobStatus::Pending).take(limit as usize).cloned().collect())
	}

	async fn update_job_status(&self, id: &str, status: JobStatus) -> Result<(), CoreError> {
		if let Some(job) = self.jobs.lock().unwrap().get_mut(id) {
			job.status = status;
		}
		Ok(())
	}

	async fn increment_retry_count(&self, id: &str) -> Result<(), CoreError> {
		if let Some(job) = self.jobs.lock().unwrap().get_mut(id) {
			job.retry_count += 1;
		}
		Ok(())
	}

	async fn mark_job_completed(&self, id: &str) -> Result<(), CoreError> {
		if let Some(job) = self.jobs.lock().unwrap().get_mut(id) {
			job.mark_completed();
		}
		Ok(())
	}

	async fn mark_job_failed(&self, id: &str, error_message: &str) -> Result<(), CoreError> {
		if let Some(job) = self.jobs.lock().unwrap().get_mut(id) {
			let fatal = job.retry_count >= job.max_retries;
			job.mark_failed(error_message, fatal);
		}
		Ok(())
	}

	async fn count_by_status(&self, status: JobStatus) -> Result<u64, CoreError> {
		Ok(self.jobs.lock().unwrap().values().filter(|j| j.status == status).count() as u64)
	}

	async fn save(&self, resource: &Resource) -> Result<(), CoreError> {
		self.resources.lock().unwrap().insert(resource.resource_id.clone(), resource.clone());
		Ok(())
	}

	async fn save_all(&self, resources: &[Resource]) -> Result<(), CoreError> {
		let mut store = self.resources.lock().unwrap();
		for r in resources {
			store.insert(r.resource_id.clone(), r.clone());
		}
		Ok(())
	}

	async fn find_by_id(&self, resource_id: &str) -> Result<Option<Resource>, CoreError> {
		Ok(self.resources.lock().unwrap().get(resource_id).cloned())
	}

	async fn find_by_status(&self, status: ResourceStatus) -> Result<Vec<Resource>, CoreError> {
		Ok(self.resources.lock().unwrap().values().filter(|r| r.status == status).cloned().collect())
	}

	async fn find_by_organization_id(&self, organization_id: &str) -> Result<Vec<Resource>, CoreError> {
		Ok(self
			.resources
			.lock()
			.unwrap()
			.values()
			.filter(|r| r.organization_id == organization_id)
			.cloned()
			.collect())
	}

	async fn find_resources_needing_sync(&self, _threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError> {
		Ok(self.resources.lock().unwrap().values().cloned().collect())
	}

	async fn find_resources_needing_validation(&self, _threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError> {
		Ok(self.resources.lock().unwrap().values().cloned().collect())
	}

	async fn find_resources_needing_monitoring(&self, _threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError> {
		Ok(self.resources.lock().unwrap().values().cloned().collect())
	}

	async fn update_resource_status(&self, resource_id: &str, status: ResourceStatus) -> Result<(), CoreError> {
		let mut store = self.resources.lock().unwrap();
		if let Some(resource) = store.get(resource_id) {
			if let Some(next) = resource.with_status(status) {
				store.insert(resource_id.to_string(), next);
			}
		}
		Ok(())
	}

	async fn update_last_sync_at(&self, resource_id: &str, _at: DateTime<Utc>) -> Result<(), CoreError> {
		let mut store = self.resources.lock().unwrap();
		if let Some(resource) = store.get(resource_id) {
			let next = resource.with_synced_now();
			store.insert(resource_id.to_string(), next);
		}
		Ok(())
	}
}

/// Always succeeds unless `fail` is set, in which case every call returns a
/// 503 classified as `Upstream5xx` (retryable).
pub struct FakeInstitution {
	pub fail: bool,
}

#[async_trait]
impl InstitutionClientPort for FakeInstitution {
	async fn call(
		&self,
		_method: &str,
		_path: &str,
		_body: Option<&str>,
		_headers: &RequestHeaders,
	) -> Result<InstitutionResponse, CoreError> {
		if self.fail {
			Ok(InstitutionResponse { status: 503, body: String::new(), x_fapi_interaction_id: "x".into() })
		} else {
			Ok(InstitutionResponse { status: 200, body: "{}".into(), x_fapi_interaction_id: "x".into() })
		}
	}
}

pub struct FakeDirectory {
	pub resources: Vec<DiscoveredResource>,
}

#[async_trait]
impl DirectoryClientPort for FakeDirectory {
	async fn list_resources(&self, _endpoint: &str) -> Result<Vec<DiscoveredResource>, CoreError> {
		Ok(self.resources.clone())
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
