//! Common dispatch seam for the four operation classes the job worker runs.
//! One `Operation` trait, four implementations, one `match` in
//! `job_worker::dispatch` — the Rust replacement for the "use-case +
//! service-implementation" inheritance pair the original design used.

use async_trait::async_trait;

use crate::domain::ProcessingJob;
use crate::error::CoreError;
use crate::pipeline::context::PipelineContext;

#[async_trait]
pub trait Operation: Send + Sync {
	async fn execute(&self, job: &ProcessingJob, ctx: &PipelineContext) -> Result<(), CoreError>;
}
