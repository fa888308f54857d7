//! Bounded-concurrency batch execution

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;

/// Run `op` over `items` in consecutive batches of `batch_size`.
///
/// Items inside a batch run concurrently, batches run one after another and
/// `delay` is slept between batches (never after the last one). Results come
/// back in input order; a failing item only affects its own slot.
pub async fn process_in_batches<T, R, E, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    delay: Duration,
    op: F,
) -> Vec<Result<R, E>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let batch_size = batch_size.max(1);
    let total = items.len();
    let batch_count = total.div_ceil(batch_size);
    let mut results = Vec::with_capacity(total);
    let mut remaining = items.into_iter();

    for batch_index in 0..batch_count {
        let batch: Vec<T> = remaining.by_ref().take(batch_size).collect();
        tracing::debug!(
            batch = batch_index + 1,
            batch_count = batch_count,
            batch_len = batch.len(),
            "Processing batch"
        );

        results.extend(join_all(batch.into_iter().map(&op)).await);

        if !delay.is_zero() && batch_index + 1 < batch_count {
            tokio::time::sleep(delay).await;
        }
    }

    results
}
