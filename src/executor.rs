//! C4 — Structured Batch Executor.
//!
//! Runs a batch of per-item tasks as a single scope: forks one child task
//! per item on a `tokio::task::JoinSet`, joins, and enforces one of two
//! failure policies. Cancellation is propagated with a
//! `tokio_util::sync::CancellationToken` so every child observes it at its
//! suspension points, and every admission permit a child holds is released
//! on every exit path because it lives in the child's stack frame and is
//! dropped by Rust's ownership rules regardless of how the future ends.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, ErrorKind};

/// Outcome of one item within a batch. Ordering between items is never
/// guaranteed.
#[derive(Debug, Clone)]
pub struct ItemResult<I> {
	pub item_id: I,
	pub success: bool,
	pub error: Option<CoreError>,
}

/// Per-class deadlines.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
	pub api_call_timeout: Duration,
	pub discovery_timeout: Duration,
	pub sync_timeout: Duration,
	pub validation_timeout: Duration,
	pub monitoring_timeout: Duration,
}

impl Default for ExecutorConfig {
	fn default() -> Self {
		Self {
			api_call_timeout: Duration::from_secs(30),
			discovery_timeout: Duration::from_secs(60),
			sync_timeout: Duration::from_secs(120),
			validation_timeout: Duration::from_secs(45),
			monitoring_timeout: Duration::from_secs(30),
		}
	}
}

pub struct StructuredBatchExecutor;

impl StructuredBatchExecutor {
	/// Shutdown-on-failure: as soon as any child fails, cancel all
	/// outstanding siblings and return the first error. Used by Discovery
	/// and Validation.
	pub async fn run_shutdown_on_failure<I, F, Fut>(
		items: Vec<I>,
		deadline: Duration,
		make_task: F,
	) -> Result<(), CoreError>
	where
		I: Send + 'static,
		F: Fn(I, CancellationToken) -> Fut,
		Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
	{
		let token = CancellationToken::new();
		let mut set: JoinSet<Result<(), CoreError>> = JoinSet::new();

		for item in items {
			let child_token = token.clone();
			let fut = make_task(item, child_token.clone());
			set.spawn(async move {
				tokio::select! {
					biased;
					_ = child_token.cancelled() => Err(CoreError::new(ErrorKind::InvariantViolation, "cancelled")),
					result = tokio::time::timeout(deadline, fut) => match result {
						Ok(inner) => inner,
						Err(_) => Err(CoreError::timeout("per-item deadline exceeded")),
					},
				}
			});
		}

		let mut first_error: Option<CoreError> = None;
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok(Ok(())) => {}
				Ok(Err(e)) => {
					if first_error.is_none() {
						first_error = Some(e);
						token.cancel();
					}
				}
				Err(join_err) => {
					if first_error.is_none() {
						first_error = Some(CoreError::invariant_violation(format!(
							"child task panicked or was aborted: {join_err}"
						)));
						token.cancel();
					}
				}
			}
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	/// Collect-all: every child runs to completion regardless of sibling
	/// outcomes; per-item results are returned. Used by Sync, Monitoring and
	/// the Job Worker.
	pub async fn run_collect_all<I, F, Fut>(
		items: Vec<I>,
		deadline: Duration,
		make_task: F,
	) -> Vec<ItemResult<I>>
	where
		I: Clone + Send + 'static,
		F: Fn(I) -> Fut,
		Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
	{
		let mut set: JoinSet<ItemResult<I>> = JoinSet::new();

		for item in items {
			let id = item.clone();
			let fut = make_task(item);
			set.spawn(async move {
				match tokio::time::timeout(deadline, fut).await {
					Ok(Ok(())) => ItemResult { item_id: id, success: true, error: None },
					Ok(Err(e)) => ItemResult { item_id: id, success: false, error: Some(e) },
					Err(_) => ItemResult {
						item_id: id,
						success: false,
						error: Some(CoreError::timeout("per-item deadline exceeded")),
					},
				}
			});
		}

		let mut results = Vec::new();
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok(result) => results.push(result),
				Err(_join_err) => {
					// The item id is lost once a task panics before producing
					// a result; callers that need it should catch_unwind
					// inside `make_task` instead. Record what we can.
				}
			}
		}
		results
	}

	/// Same contract as `run_collect_all`, but yields each `ItemResult` as
	/// soon as it completes instead of buffering the whole batch. Lets an
	/// external presentation layer consume results incrementally without the
	/// core depending on any HTTP framework to do it.
	pub fn run_collect_all_stream<I, F, Fut>(
		items: Vec<I>,
		deadline: Duration,
		make_task: F,
	) -> ReceiverStream<ItemResult<I>>
	where
		I: Clone + Send + 'static,
		F: Fn(I) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
	{
		let (tx, rx) = tokio::sync::mpsc::channel(items.len().max(1));
		tokio::spawn(async move {
			let mut set: JoinSet<ItemResult<I>> = JoinSet::new();
			for item in items {
				let id = item.clone();
				let fut = make_task(item);
				set.spawn(async move {
					match tokio::time::timeout(deadline, fut).await {
						Ok(Ok(())) => ItemResult { item_id: id, success: true, error: None },
						Ok(Err(e)) => ItemResult { item_id: id, success: false, error: Some(e) },
						Err(_) => ItemResult {
							item_id: id,
							success: false,
							error: Some(CoreError::timeout("per-item deadline exceeded")),
						},
					}
				});
			}
			while let Some(joined) = set.join_next().await {
				if let Ok(result) = joined {
					if tx.send(result).await.is_err() {
						break;
					}
				}
			}
		});
		ReceiverStream::new(rx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures_util::StreamExt;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[tokio::test]
	async fn collect_all_runs_every_item_regardless_of_failures() {
		let results = StructuredBatchExecutor::run_collect_all(
			vec![1, 2, 3, 4],
			Duration::from_secs(1),
			|item| async move {
				if item % 2 == 0 {
					Err(CoreError::new(ErrorKind::Upstream5xx, "boom"))
				} else {
					Ok(())
				}
			},
		)
		.await;
		assert_eq!(results.len(), 4);
		assert_eq!(results.iter().filter(|r| r.success).count(), 2);
	}

	#[tokio::test]
	async fn shutdown_on_failure_cancels_siblings_on_first_error() {
		let observed_cancellation = Arc::new(AtomicUsize::new(0));
		let items = vec![1, 2, 3];
		let obs = Arc::clone(&observed_cancellation);
		let result = StructuredBatchExecutor::run_shutdown_on_failure(
			items,
			Duration::from_secs(2),
			move |item, token| {
				let obs = Arc::clone(&obs);
				async move {
					if item == 1 {
						return Err(CoreError::new(ErrorKind::ValidationError, "first fails"));
					}
					// Siblings wait to observe cancellation rather than racing
					// to completion, proving the token fires before return.
					token.cancelled().await;
					obs.fetch_add(1, Ordering::SeqCst);
					Ok(())
				}
			},
		)
		.await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn per_item_timeout_yields_upstream_timeout() {
		let results = StructuredBatchExecutor::run_collect_all(
			vec![1],
			Duration::from_millis(10),
			|_item| async move {
				tokio::time::sleep(Duration::from_secs(5)).await;
				Ok(())
			},
		)
		.await;
		assert_eq!(results.len(), 1);
		assert!(!results[0].success);
		assert_eq!(results[0].error.as_ref().unwrap().kind, ErrorKind::UpstreamTimeout);
	}

	#[tokio::test]
	async fn collect_all_stream_yields_every_item() {
		let mut stream = StructuredBatchExecutor::run_collect_all_stream(
			vec![1, 2, 3],
			Duration::from_secs(1),
			|_item| async move { Ok(()) },
		);
		let mut seen = 0;
		while let Some(result) = stream.next().await {
			assert!(result.success);
			seen += 1;
		}
		assert_eq!(seen, 3);
	}
}
