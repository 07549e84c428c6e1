//! Shared context every pipeline operation needs: the three external ports,
//! plus handles to C1/C2/C3 so operations can acquire permits and record
//! telemetry without each one threading its own copies through.

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::executor::ExecutorConfig;
use crate::health_registry::HealthRegistry;
use crate::ports::{DirectoryClientPort, InstitutionClientPort, RepositoryPort};
use crate::telemetry::TelemetryCollector;

pub struct PipelineContext {
	pub repository: Arc<dyn RepositoryPort>,
	pub institution_client: Arc<dyn InstitutionClientPort>,
	pub directory_client: Arc<dyn DirectoryClientPort>,
	pub admission: Arc<AdmissionController>,
	pub telemetry: Arc<TelemetryCollector>,
	pub resource_health: Arc<HealthRegistry>,
	pub executor_config: ExecutorConfig,
}
