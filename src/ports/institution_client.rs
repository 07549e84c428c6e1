//! Institution client port — issues calls to an Open Finance participant's
//! API. The core forwards FAPI headers; it never mints or
//! signs them (signing is an out-of-scope outbound collaborator).
//!
//! `ResilientInstitutionClient` is a decorator adding circuit breaking, a
//! token-bucket rate limiter and exponential-backoff-with-jitter retry
//! around any `InstitutionClientPort`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{CoreError, ErrorKind};

/// Headers the core forwards but never constructs. `x_jws_signature` is
/// required only on POST `/consents` and `/consents/{id}/extends`.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
	pub authorization: String,
	pub x_fapi_auth_date: String,
	pub x_fapi_customer_ip_address: String,
	pub x_fapi_interaction_id: String,
	pub x_customer_user_agent: String,
	pub x_jws_signature: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InstitutionResponse {
	pub status: u16,
	pub body: String,
	/// Echoed back from the upstream response; the core records it on
	/// every call.
	pub x_fapi_interaction_id: String,
}

/// Port for a single outbound call to an institution's `/consents` base
/// path. Implementations own the transport; the core only needs 2xx/4xx/5xx
/// classification.
#[async_trait]
pub trait InstitutionClientPort: Send + Sync + 'static {
	async fn call(
		&self,
		method: &str,
		path: &str,
		body: Option<&str>,
		headers: &RequestHeaders,
	) -> Result<InstitutionResponse, CoreError>;
}

fn classify_status(status: u16) -> Option<ErrorKind> {
	match status {
		200..=299 => None,
		429 => Some(ErrorKind::Upstream429),
		400..=499 => Some(ErrorKind::Upstream4xx),
		500..=599 => Some(ErrorKind::Upstream5xx),
		_ => Some(ErrorKind::Upstream5xx),
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
	Closed,
	Open { opened_at: Instant },
	HalfOpen,
}

struct CircuitBreaker {
	state: CircuitState,
	failure_count: u32,
	threshold: u32,
	timeout: Duration,
}

impl CircuitBreaker {
	fn new(threshold: u32, timeout: Duration) -> Self {
		Self { state: CircuitState::Closed, failure_count: 0, threshold, timeout }
	}

	fn record_success(&mut self) {
		match self.state {
			CircuitState::HalfOpen | CircuitState::Closed => {
				self.state = CircuitState::Closed;
				self.failure_count = 0;
			}
			CircuitState::Open { .. } => {}
		}
	}

	fn record_failure(&mut self) {
		self.failure_count += 1;
		match self.state {
			CircuitState::Closed if self.failure_count >= self.threshold => {
				warn!(failures = self.failure_count, "circuit breaker opening");
				self.state = CircuitState::Open { opened_at: Instant::now() };
			}
			CircuitState::HalfOpen => {
				self.state = CircuitState::Open { opened_at: Instant::now() };
			}
			_ => {}
		}
	}

	fn can_attempt(&mut self) -> bool {
		match self.state {
			CircuitState::Closed | CircuitState::HalfOpen => true,
			CircuitState::Open { opened_at } => {
				if Instant::now().duration_since(opened_at) >= self.timeout {
					self.state = CircuitState::HalfOpen;
					true
				} else {
					false
				}
			}
		}
	}
}

struct TokenBucket {
	capacity: f64,
	tokens: f64,
	refill_per_sec: f64,
	last_refill: Instant,
}

impl TokenBucket {
	fn new(capacity: u32, refill_per_sec: u32) -> Self {
		Self {
			capacity: capacity as f64,
			tokens: capacity as f64,
			refill_per_sec: refill_per_sec as f64,
			last_refill: Instant::now(),
		}
	}

	fn try_acquire(&mut self) -> bool {
		let now = Instant::now();
		let elapsed = now.duration_since(self.last_refill).as_secs_f64();
		self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
		self.last_refill = now;
		if self.tokens >= 1.0 {
			self.tokens -= 1.0;
			true
		} else {
			false
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct ResilienceConfig {
	pub max_retries: u32,
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
	pub circuit_breaker_threshold: u32,
	pub circuit_breaker_timeout: Duration,
	pub rate_limit_burst: u32,
	pub rate_limit_rps: u32,
}

impl Default for ResilienceConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			initial_backoff: Duration::from_millis(200),
			max_backoff: Duration::from_secs(5),
			circuit_breaker_threshold: 5,
			circuit_breaker_timeout: Duration::from_secs(30),
			rate_limit_burst: 50,
			rate_limit_rps: 20,
		}
	}
}

pub struct ResilientInstitutionClient<C: InstitutionClientPort> {
	inner: C,
	config: ResilienceConfig,
	circuit_breaker: Arc<Mutex<CircuitBreaker>>,
	rate_limiter: Arc<Mutex<TokenBucket>>,
}

impl<C: InstitutionClientPort> ResilientInstitutionClient<C> {
	pub fn new(inner: C, config: ResilienceConfig) -> Self {
		Self {
			circuit_breaker: Arc::new(Mutex::new(CircuitBreaker::new(
				config.circuit_breaker_threshold,
				config.circuit_breaker_timeout,
			))),
			rate_limiter: Arc::new(Mutex::new(TokenBucket::new(config.rate_limit_burst, config.rate_limit_rps))),
			inner,
			config,
		}
	}
}

#[async_trait]
impl<C: InstitutionClientPort> InstitutionClientPort for ResilientInstitutionClient<C> {
	async fn call(
		&self,
		method: &str,
		path: &str,
		body: Option<&str>,
		headers: &RequestHeaders,
	) -> Result<InstitutionResponse, CoreError> {
		let mut attempts = 0u32;
		let mut backoff = self.config.initial_backoff;

		loop {
			{
				let mut cb = self.circuit_breaker.lock().await;
				if !cb.can_attempt() {
					return Err(CoreError::new(ErrorKind::Upstream5xx, "circuit breaker open"));
				}
			}
			{
				let mut rl = self.rate_limiter.lock().await;
				if !rl.try_acquire() {
					return Err(CoreError::new(ErrorKind::Upstream429, "local rate limit exceeded"));
				}
			}

			let outcome = self.inner.call(method, path, body, headers).await;
			match outcome {
				Ok(response) => match classify_status(response.status) {
					None => {
						self.circuit_breaker.lock().await.record_success();
						return Ok(response);
					}
					Some(kind) => {
						attempts += 1;
						let retryable = kind.is_retryable();
						if !retryable || attempts > self.config.max_retries {
							self.circuit_breaker.lock().await.record_failure();
							return Err(CoreError::new(kind, format!("upstream status {}", response.status)));
						}
						warn!(attempts, status = response.status, "retrying institution call");
						sleep(backoff).await;
						backoff = jittered_backoff(backoff, self.config.max_backoff);
					}
				},
				Err(e) => {
					attempts += 1;
					if !e.retryable() || attempts > self.config.max_retries {
						self.circuit_breaker.lock().await.record_failure();
						return Err(e);
					}
					sleep(backoff).await;
					backoff = jittered_backoff(backoff, self.config.max_backoff);
				}
			}
		}
	}
}

fn jittered_backoff(current: Duration, max: Duration) -> Duration {
	let doubled = (current * 2).min(max);
	let max_jitter_ms = (doubled.as_millis() as u64 / 4).max(1);
	let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter_ms);
	doubled.saturating_add(Duration::from_millis(jitter_ms))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct FlakyClient {
		fail_times: AtomicU32,
	}

	#[async_trait]
	impl InstitutionClientPort for FlakyClient {
		async fn call(
			&self,
			_method: &str,
			_path: &str,
			_body: Option<&str>,
			_headers: &RequestHeaders,
		) -> Result<InstitutionResponse, CoreError> {
			if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
				Ok(InstitutionResponse { status: 503, body: String::new(), x_fapi_interaction_id: "x".into() })
			} else {
				Ok(InstitutionResponse { status: 200, body: "ok".into(), x_fapi_interaction_id: "x".into() })
			}
		}
	}

	#[tokio::test]
	async fn retries_transient_5xx_then_succeeds() {
		let client = ResilientInstitutionClient::new(
			FlakyClient { fail_times: AtomicU32::new(2) },
			ResilienceConfig { initial_backoff: Duration::from_millis(1), ..Default::default() },
		);
		let result = client.call("GET", "/consents/1", None, &RequestHeaders::default()).await;
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn circuit_opens_after_threshold_failures() {
		struct AlwaysFails;
		#[async_trait]
		impl InstitutionClientPort for AlwaysFails {
			async fn call(
				&self,
				_method: &str,
				_path: &str,
				_body: Option<&str>,
				_headers: &RequestHeaders,
			) -> Result<InstitutionResponse, CoreError> {
				Ok(InstitutionResponse { status: 500, body: String::new(), x_fapi_interaction_id: "x".into() })
			}
		}
		let client = ResilientInstitutionClient::new(
			AlwaysFails,
			ResilienceConfig {
				max_retries: 0,
				circuit_breaker_threshold: 2,
				initial_backoff: Duration::from_millis(1),
				..Default::default()
			},
		);
		let _ = client.call("GET", "/consents/1", None, &RequestHeaders::default()).await;
		let _ = client.call("GET", "/consents/1", None, &RequestHeaders::default()).await;
		let result = client.call("GET", "/consents/1", None, &RequestHeaders::default()).await;
		assert!(result.is_err());
		assert_eq!(result.unwrap_err().kind, ErrorKind::Upstream5xx);
	}
}
