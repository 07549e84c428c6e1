//! Generic institution-call operations for the three `JobType` variants
//! that are named but never elaborated beyond the bare job-type list
//! (`ConsentProcessing`, `AccountSync`, `AccountBalanceUpdate`) plus
//! `Custom`. None of Discovery/Sync/Validation/Monitoring map onto
//! them. Resolved (see DESIGN.md) as thin forwarders through the same
//! `api_call`-gated institution client every fully-specified operation uses,
//! rather than left unimplemented: each acquires an `api_call` permit,
//! issues one call shaped by its job type, and succeeds/fails on the
//! resulting status the same way Sync does.

use std::time::Instant;

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::{JobType, ProcessingJob};
use crate::error::CoreError;
use crate::operation_class::OperationClass;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::operation::Operation;
use crate::ports::RequestHeaders;

pub struct GenericJobOperation;

#[async_trait]
impl Operation for GenericJobOperation {
	#[instrument(skip(self, job, ctx), fields(job_type = ?job.job_type, target = %job.target_entity_id))]
	async fn execute(&self, job: &ProcessingJob, ctx: &PipelineContext) -> Result<(), CoreError> {
		let (method, path) = route(job);
		let start = Instant::now();

		let _permit = ctx.admission.try_acquire(OperationClass::ApiCall).ok_or_else(CoreError::admission_denied)?;

		let result = ctx.institution_client.call(method, &path, job.payload.as_deref(), &RequestHeaders::default()).await;

		let ok = result.is_ok();
		ctx.telemetry.record_operation(OperationClass::ApiCall, ok, start.elapsed().as_millis() as u64);
		if let Err(e) = &result {
			ctx.telemetry.record_error(e.kind, OperationClass::ApiCall, e.retryable());
		}
		result.map(|_| ())
	}
}

fn route(job: &ProcessingJob) -> (&'static str, String) {
	match job.job_type {
		JobType::ConsentProcessing => ("POST", format!("/consents/{}", job.target_entity_id)),
		JobType::AccountSync => ("GET", format!("/accounts/{}", job.target_entity_id)),
		JobType::AccountBalanceUpdate => ("GET", format!("/accounts/{}/balances", job.target_entity_id)),
		JobType::Custom => ("POST", format!("/custom/{}", job.target_entity_id)),
		JobType::ResourceSync | JobType::ResourceValidation | JobType::ResourceMonitoring => {
			unreachable!("job_worker routes these through their dedicated operations")
		}
	}
}
