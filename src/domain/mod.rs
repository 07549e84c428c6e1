pub mod health;
pub mod job;
pub mod resource;

pub use health::{HealthState, ResourceHealth};
pub use job::{JobStatus, JobType, ProcessingJob};
pub use resource::{Resource, ResourceStatus, ResourceType};
