//! Monitoring. Acquires `monitoring` + `api_call`
//! permits, probes the resource's endpoint, and feeds the sample into the
//! in-process `HealthRegistry`'s weighted-update rule.

use std::time::Instant;

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::ProcessingJob;
use crate::error::CoreError;
use crate::operation_class::OperationClass;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::operation::Operation;
use crate::ports::RequestHeaders;

pub struct MonitoringOperation;

#[async_trait]
impl Operation for MonitoringOperation {
	#[instrument(skip(self, job, ctx), fields(resource_id = %job.target_entity_id))]
	async fn execute(&self, job: &ProcessingJob, ctx: &PipelineContext) -> Result<(), CoreError> {
		monitor_one(&job.target_entity_id, ctx).await
	}
}

async fn monitor_one(resource_id: &str, ctx: &PipelineContext) -> Result<(), CoreError> {
	let _monitoring_permit =
		ctx.admission.try_acquire(OperationClass::Monitoring).ok_or_else(CoreError::admission_denied)?;
	let _api_permit = ctx.admission.try_acquire(OperationClass::ApiCall).ok_or_else(CoreError::admission_denied)?;

	ctx.repository
		.find_by_id(resource_id)
		.await?
		.ok_or_else(|| CoreError::invariant_violation(format!("resource {resource_id} vanished mid-monitor")))?;

	let probe_start = Instant::now();
	let result = ctx
		.institution_client
		.call("GET", &format!("/resources/{resource_id}/status"), None, &RequestHeaders::default())
		.await;
	let sample_ms = probe_start.elapsed().as_millis() as f64;

	let ok = result.is_ok();
	ctx.resource_health.record_sample(resource_id, ok, sample_ms);
	ctx.telemetry.record_operation(OperationClass::Monitoring, ok, sample_ms as u64);

	match result {
		Ok(_response) => Ok(()),
		Err(e) => {
			ctx.telemetry.record_error(e.kind, OperationClass::Monitoring, e.retryable());
			Err(e)
		}
	}
}

/// Runs a batch of resource ids through `monitor_one`, collect-all semantics,
/// matching Sync's batch shape.
pub async fn run_monitoring_batch(
	resource_ids: Vec<String>,
	ctx: std::sync::Arc<PipelineContext>,
) -> Vec<crate::executor::ItemResult<String>> {
	let deadline = ctx.executor_config.monitoring_timeout;
	crate::executor::StructuredBatchExecutor::run_collect_all(resource_ids, deadline, move |resource_id| {
		let ctx = ctx.clone();
		async move { monitor_one(&resource_id, &ctx).await }
	})
	.await
}
