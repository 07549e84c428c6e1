//! Sync. One job per resource: acquire `sync` and
//! `api_call` permits, call the institution, stamp `last_synced_at` on
//! success. Run as collect-all so one resource's failure never blocks its
//! siblings.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::ProcessingJob;
use crate::error::CoreError;
use crate::operation_class::OperationClass;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::operation::Operation;
use crate::ports::RequestHeaders;

pub struct SyncOperation;

#[async_trait]
impl Operation for SyncOperation {
	#[instrument(skip(self, job, ctx), fields(resource_id = %job.target_entity_id))]
	async fn execute(&self, job: &ProcessingJob, ctx: &PipelineContext) -> Result<(), CoreError> {
		sync_one(&job.target_entity_id, ctx).await
	}
}

async fn sync_one(resource_id: &str, ctx: &PipelineContext) -> Result<(), CoreError> {
	let start = Instant::now();

	let _sync_permit = ctx.admission.try_acquire(OperationClass::Sync).ok_or_else(CoreError::admission_denied)?;
	let _api_permit = ctx.admission.try_acquire(OperationClass::ApiCall).ok_or_else(CoreError::admission_denied)?;

	let resource = ctx
		.repository
		.find_by_id(resource_id)
		.await?
		.ok_or_else(|| CoreError::invariant_violation(format!("resource {resource_id} vanished mid-sync")))?;

	let result = ctx
		.institution_client
		.call(
			"GET",
			&format!("/resources/{resource_id}/accounts"),
			None,
			&RequestHeaders {
				x_fapi_interaction_id: uuid_like(resource_id),
				..Default::default()
			},
		)
		.await;

	let ok = result.is_ok();
	ctx.telemetry.record_operation(OperationClass::Sync, ok, start.elapsed().as_millis() as u64);

	match result {
		Ok(_response) => {
			let now = chrono::Utc::now();
			ctx.repository.update_last_sync_at(resource_id, now).await?;
			let _ = resource.with_synced_now();
			Ok(())
		}
		Err(e) => {
			ctx.telemetry.record_error(e.kind, OperationClass::Sync, e.retryable());
			Err(e)
		}
	}
}

/// A stable-enough interaction id for headers without pulling in a UUID
/// dependency the rest of the stack doesn't otherwise need.
fn uuid_like(seed: &str) -> String {
	format!("{seed}-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0))
}

/// Runs a batch of resource ids through `sync_one`, collect-all, via C4.
pub async fn run_sync_batch(resource_ids: Vec<String>, ctx: Arc<PipelineContext>) -> Vec<crate::executor::ItemResult<String>> {
	let deadline = ctx.executor_config.sync_timeout;
	crate::executor::StructuredBatchExecutor::run_collect_all(resource_ids, deadline, move |resource_id| {
		let ctx = ctx.clone();
		async move { sync_one(&resource_id, &ctx).await }
	})
	.await
}
