use thiserror::Error;

/// The closed set of error kinds the core ever produces, per the error
/// handling design: every per-item failure surfaced by the structured batch
/// executor carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
	/// No admission permit was available. Not counted as an error; the
	/// caller must treat this as "try again next cycle", never as a failure.
	AdmissionDenied,
	/// The per-item deadline elapsed before the operation completed.
	UpstreamTimeout,
	/// The institution responded with a 5xx status.
	Upstream5xx,
	/// The institution responded with a 4xx status other than 429.
	Upstream4xx,
	/// The institution responded with 429 Too Many Requests.
	Upstream429,
	/// A business-rule validation check failed.
	ValidationError,
	/// The repository port returned an error.
	PersistenceError,
	/// An internal consistency invariant was violated.
	InvariantViolation,
}

impl ErrorKind {
	/// Whether a failure of this kind should be retried.
	/// `ADMISSION_DENIED` is excluded here deliberately: it is not a failure
	/// at all and must never reach this method from the job worker's retry
	/// path.
	pub fn is_retryable(self) -> bool {
		match self {
			ErrorKind::AdmissionDenied => false,
			ErrorKind::UpstreamTimeout => true,
			ErrorKind::Upstream5xx => true,
			ErrorKind::Upstream4xx => false,
			ErrorKind::Upstream429 => true,
			ErrorKind::ValidationError => false,
			ErrorKind::PersistenceError => true,
			ErrorKind::InvariantViolation => false,
		}
	}
}

/// The core's single error type. Carries enough context for the job worker
/// to decide retry vs terminal failure, and for the telemetry collector to
/// break errors down by `(kind, class)`.
#[derive(Debug, Error, Clone)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
	pub kind: ErrorKind,
	pub message: String,
}

impl CoreError {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}

	pub fn admission_denied() -> Self {
		Self::new(ErrorKind::AdmissionDenied, "no admission permit available")
	}

	pub fn timeout(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::UpstreamTimeout, message)
	}

	pub fn invariant_violation(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::InvariantViolation, message)
	}

	/// Whether this specific error should be retried. `INVARIANT_VIOLATION`
	/// is fatal regardless of remaining retry budget.
	pub fn retryable(&self) -> bool {
		self.kind.is_retryable()
	}
}
