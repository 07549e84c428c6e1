//! C5 — Operation Pipeline: Discovery, Sync, Validation, Monitoring and the
//! Job Worker drain loop, tied together by a shared `PipelineContext`.

pub mod context;
pub mod discovery;
pub mod generic;
pub mod job_worker;
pub mod monitoring;
pub mod operation;
pub mod sync;
pub mod validation;

pub use context::PipelineContext;
pub use job_worker::JobWorker;
pub use operation::Operation;
