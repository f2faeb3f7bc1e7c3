//! Partial-success execution: run a batch of independent operations and
//! keep going past individual failures, reporting what succeeded and what
//! didn't instead of failing the whole batch on the first error.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Outcome of running a batch of `I`-keyed operations, each producing `T` on
/// success. `failed` pairs the original input with the error it produced,
/// so a caller can retry or report per-item failures without re-deriving
/// which item a positional index referred to.
#[derive(Clone, Debug, Default)]
pub struct PartialResult<T, I> {
    pub successful: Vec<T>,
    pub failed: Vec<(I, CoreError)>,
    pub total: usize,
}

impl<T, I> PartialResult<T, I> {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successful.len() as f64 / self.total as f64
        }
    }

    pub fn is_acceptable(&self, min_success_rate: f64) -> bool {
        self.success_rate() >= min_success_rate
    }

    pub fn merge(mut self, other: PartialResult<T, I>) -> Self {
        self.successful.extend(other.successful);
        self.failed.extend(other.failed);
        self.total += other.total;
        self
    }
}

/// Summary form of a [`PartialResult`], safe to embed in a report or an
/// observability event without carrying the full item/error payloads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartialResultSummary {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
    pub success_rate: f64,
}

impl<T, I> From<&PartialResult<T, I>> for PartialResultSummary {
    fn from(result: &PartialResult<T, I>) -> Self {
        Self {
            successful: result.successful.len(),
            failed: result.failed.len(),
            total: result.total,
            success_rate: result.success_rate(),
        }
    }
}

/// Run `op` over `items` one at a time, in order, collecting successes and
/// failures rather than stopping at the first error.
pub async fn apply_sequential<I, T, F, Fut>(items: Vec<I>, op: F) -> PartialResult<T, I>
where
    I: Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let total = items.len();
    let mut successful = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for item in items {
        let item_for_error = item.clone();
        match op(item).await {
            Ok(value) => successful.push(value),
            Err(err) => failed.push((item_for_error, err)),
        }
    }
    PartialResult {
        successful,
        failed,
        total,
    }
}

/// Run `op` over `items` with at most `max_in_flight` concurrent
/// invocations, restoring input order in the returned successes/failures
/// once every task completes (`buffer_unordered` itself makes no ordering
/// guarantee — this sorts by the original index before partitioning).
pub async fn apply_bounded_parallel<I, T, F, Fut>(
    items: Vec<I>,
    max_in_flight: usize,
    op: F,
) -> PartialResult<T, I>
where
    I: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, CoreError>> + Send,
{
    let total = items.len();
    let max_in_flight = max_in_flight.max(1);
    let op = Arc::new(op);

    let mut indexed: Vec<(usize, I, Result<T, CoreError>)> = stream::iter(items.into_iter().enumerate())
        .map(|(idx, item)| {
            let op = Arc::clone(&op);
            let item_for_result = item.clone();
            async move { (idx, item_for_result, op(item).await) }
        })
        .buffer_unordered(max_in_flight)
        .collect()
        .await;

    indexed.sort_by_key(|(idx, _, _)| *idx);

    let mut successful = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for (_, item, result) in indexed {
        match result {
            Ok(value) => successful.push(value),
            Err(err) => failed.push((item, err)),
        }
    }
    PartialResult {
        successful,
        failed,
        total,
    }
}
