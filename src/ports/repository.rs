//! Repository port — the persistence collaborator, out of scope for this
//! crate. A `Send + Sync + 'static` async trait any storage backend can
//! implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ProcessingJob, Resource, ResourceStatus};
use crate::error::CoreError;

/// Persistence contract for `Resource` snapshots and `ProcessingJob` rows.
///
/// **Required contract for `fetch_next_batch`**: implementations must make
/// it atomic and non-overlapping across concurrent callers, including
/// multiple core instances sharing the same store (e.g. `SELECT ... FOR
/// UPDATE SKIP LOCKED` or an equivalent claim-and-lease scheme). The core
/// cannot enforce this itself; it is a precondition of the admission-bound
/// invariant holding across a fleet.
#[async_trait]
pub trait RepositoryPort: Send + Sync + 'static {
	async fn fetch_next_batch(&self, limit: u32) -> Result<Vec<ProcessingJob>, CoreError>;

	/// Idempotent: applying the same status twice has the same effect as
	/// applying it once.
	async fn update_job_status(&self, id: &str, status: crate::domain::JobStatus) -> Result<(), CoreError>;
	async fn increment_retry_count(&self, id: &str) -> Result<(), CoreError>;
	async fn mark_job_completed(&self, id: &str) -> Result<(), CoreError>;
	async fn mark_job_failed(&self, id: &str, error_message: &str) -> Result<(), CoreError>;
	async fn count_by_status(&self, status: crate::domain::JobStatus) -> Result<u64, CoreError>;

	async fn save(&self, resource: &Resource) -> Result<(), CoreError>;
	async fn save_all(&self, resources: &[Resource]) -> Result<(), CoreError>;
	async fn find_by_id(&self, resource_id: &str) -> Result<Option<Resource>, CoreError>;
	async fn find_by_status(&self, status: ResourceStatus) -> Result<Vec<Resource>, CoreError>;
	async fn find_by_organization_id(&self, organization_id: &str) -> Result<Vec<Resource>, CoreError>;

	async fn find_resources_needing_sync(&self, threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError>;
	async fn find_resources_needing_validation(&self, threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError>;
	async fn find_resources_needing_monitoring(&self, threshold: DateTime<Utc>) -> Result<Vec<Resource>, CoreError>;

	async fn update_resource_status(&self, resource_id: &str, status: ResourceStatus) -> Result<(), CoreError>;
	async fn update_last_sync_at(&self, resource_id: &str, at: DateTime<Utc>) -> Result<(), CoreError>;
}
