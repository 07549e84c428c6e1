use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
	ConsentProcessing,
	AccountSync,
	AccountBalanceUpdate,
	ResourceSync,
	ResourceValidation,
	ResourceMonitoring,
	Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
	Pending,
	Running,
	Completed,
	Failed,
	Cancelled,
}

impl JobStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
	}
}

/// A unit of scheduled work. Invariants:
/// (i) reaches `Completed`/`Failed` at most once, (ii) `retry_count <=
/// max_retries`, (iii) on failure with budget remaining it returns to
/// `Pending`, otherwise becomes `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
	pub id: String,
	pub job_type: JobType,
	pub target_entity_id: String,
	pub status: JobStatus,
	pub retry_count: u32,
	pub max_retries: u32,
	pub payload: Option<String>,
	pub last_error: Option<String>,
	pub scheduled_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
	pub fn new(id: impl Into<String>, job_type: JobType, target_entity_id: impl Into<String>, max_retries: u32) -> Self {
		Self {
			id: id.into(),
			job_type,
			target_entity_id: target_entity_id.into(),
			status: JobStatus::Pending,
			retry_count: 0,
			max_retries,
			payload: None,
			last_error: None,
			scheduled_at: Utc::now(),
			started_at: None,
			completed_at: None,
		}
	}

	/// Apply a successful completion. No-op if the job is already terminal,
	/// which enforces invariant (i).
	pub fn mark_completed(&mut self) {
		if self.status.is_terminal() {
			return;
		}
		self.status = JobStatus::Completed;
		self.completed_at = Some(Utc::now());
	}

	/// Apply a failure outcome: retries if budget remains (invariant iii),
	/// otherwise transitions to `Failed`. `fatal` forces `Failed` regardless
	/// of remaining budget, for an `INVARIANT_VIOLATION`.
	pub fn mark_failed(&mut self, error_message: impl Into<String>, fatal: bool) {
		if self.status.is_terminal() {
			return;
		}
		self.last_error = Some(error_message.into());
		if !fatal && self.retry_count < self.max_retries {
			self.retry_count += 1;
			self.status = JobStatus::Pending;
		} else {
			self.status = JobStatus::Failed;
			self.completed_at = Some(Utc::now());
		}
	}

	pub fn mark_running(&mut self) {
		if self.status.is_terminal() {
			return;
		}
		self.status = JobStatus::Running;
		self.started_at.get_or_insert_with(Utc::now);
	}

	/// Number of times this job may still be executed: `max_retries + 1 -
	/// retry_count`, per the retry-bound invariant.
	pub fn executions_remaining(&self) -> u32 {
		(self.max_retries + 1).saturating_sub(self.retry_count)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn completed_is_idempotent() {
		let mut j = ProcessingJob::new("1", JobType::ResourceSync, "r1", 3);
		j.mark_completed();
		let completed_at = j.completed_at;
		j.mark_completed();
		assert_eq!(j.status, JobStatus::Completed);
		assert_eq!(j.completed_at, completed_at);
	}

	#[test]
	fn retries_until_budget_exhausted_then_fails() {
		let mut j = ProcessingJob::new("1", JobType::ResourceSync, "r1", 2);
		j.mark_failed("boom", false);
		assert_eq!(j.status, JobStatus::Pending);
		assert_eq!(j.retry_count, 1);
		j.mark_failed("boom", false);
		assert_eq!(j.status, JobStatus::Pending);
		assert_eq!(j.retry_count, 2);
		j.mark_failed("boom", false);
		assert_eq!(j.status, JobStatus::Failed);
		assert_eq!(j.retry_count, 2);
	}

	#[test]
	fn invariant_violation_is_fatal_regardless_of_budget() {
		let mut j = ProcessingJob::new("1", JobType::ResourceSync, "r1", 5);
		j.mark_failed("inconsistent state", true);
		assert_eq!(j.status, JobStatus::Failed);
		assert_eq!(j.retry_count, 0);
	}

	#[test]
	fn terminal_job_never_regresses() {
		let mut j = ProcessingJob::new("1", JobType::ResourceSync, "r1", 3);
		j.mark_failed("boom", true);
		assert_eq!(j.status, JobStatus::Failed);
		j.mark_completed();
		assert_eq!(j.status, JobStatus::Failed);
	}
}
