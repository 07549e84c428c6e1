//! In-memory implementations of the three out-of-scope ports: persistence,
//! the institution API, and the directory are all external collaborators.
//! These exist only to give the demo binary something to run against; a
//! real deployment supplies its own.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{JobStatus, JobType, ProcessingJob, Resource, ResourceStatus, ResourceType};
use crate::error::CoreError;
use crate::ports::{
	DirectoryClientPort, DiscoveredResource, InstitutionClientPort, InstitutionResponse, RepositoryPort, RequestHeaders,
};

/// A single-process store guarded by a `Mutex`. `fetch_next_batch`'s
/// claim-and-lease contract (`ports::repository`) is satisfied trivially
/// here since there is only ever one caller.
pub struct InMemoryRepository {
	resources: Mutex<HashMap<String, Resource>>,
	jobs: Mutex<HashMap<String, ProcessingJob>>,
}

impl InMemoryRepository {
	pub fn new() -> Self {
		Self { resources: Mutex::new(HashMap::new()), jobs: Mutex::new(HashMap::new()) }
	}

	/// Seeds a handful of discovered resources and their matching jobs, for
	/// the demo binary to have something to process on startup.
	pub fn seeded(organization_id: &str, count: usize) -> Self {
		let repo = Self::new();
		let mut resources = repo.resources.lock().unwrap();
		let mut jobs = repo.jobs.lock().unwrap();
		for i in 0..count {
			let resource_id = format!("demo-resource-{i}");
			resources.insert(resource_id.clone(), Resource::new(&resource_id, organization_id, ResourceType::Bank));
			let job_id = format!("demo-job-{i}");
			jobs.insert(job_id.clone(), ProcessingJob::new(job_id.clone(), JobType::ResourceSync, &resource_id, 3));
		}
		drop(resources);
		drop(jobs);
		repo
	}
}

impl Default for InMemoryRepository {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl RepositoryPort for InMemoryRepository {
	async fn fetch_next_batch(&self, limit: u32) -> Result<Vec<ProcessingJob>, CoreError> {
		let jobs = self.jobs.lock().unwrap();
		Ok(jobs
			.values()
			.filter(|j| j.status == JobStatus::Pending)
			.take(limit as usize)
			.cloned()
			.collect())
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
		let jobs = self.jobs.lock().unwrap();
		Ok(jobs.values().filter(|j| j.status == status).count() as u64)
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

	async fn find_resources_needing_sync(&self, threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError> {
		Ok(self
			.resources
			.lock()
			.unwrap()
			.values()
			.filter(|r| r.last_synced_at.is_none_or(|t| t < threshold))
			.cloned()
			.collect())
	}

	async fn find_resources_needing_validation(&self, threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError> {
		Ok(self
			.resources
			.lock()
			.unwrap()
			.values()
			.filter(|r| r.last_validated_at.is_none_or(|t| t < threshold))
			.cloned()
			.collect())
	}

	async fn find_resources_needing_monitoring(&self, threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError> {
		Ok(self
			.resources
			.lock()
			.unwrap()
			.values()
			.filter(|r| r.last_monitored_at.is_none_or(|t| t < threshold))
			.cloned()
			.collect())
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

/// Always answers 200 with an empty body. Good enough to exercise every
/// operation's success path without a real participant to call.
pub struct EchoInstitutionClient;

#[async_trait]
impl InstitutionClientPort for EchoInstitutionClient {
	async fn call(
		&self,
		_method: &str,
		_path: &str,
		_body: Option<&str>,
		_headers: &RequestHeaders,
	) -> Result<InstitutionResponse, CoreError> {
		Ok(InstitutionResponse { status: 200, body: "{}".to_string(), x_fapi_interaction_id: "demo".to_string() })
	}
}

/// Reports a fixed set of resources regardless of the endpoint queried.
pub struct StaticDirectoryClient {
	organization_id: String,
	count: usize,
}

impl StaticDirectoryClient {
	pub fn new(organization_id: impl Into<String>, count: usize) -> Self {
		Self { organization_id: organization_id.into(), count }
	}
}

#[async_trait]
impl DirectoryClientPort for StaticDirectoryClient {
	async fn list_resources(&self, _endpoint: &str) -> Result<Vec<DiscoveredResource>, CoreError> {
		Ok((0..self.count)
			.map(|i| DiscoveredResource {
				resource_id: format!("demo-resource-{i}"),
				organization_id: self.organization_id.clone(),
				resource_type: ResourceType::Bank,
			})
			.collect())
	}
}
