//! Bounded, ordered, fail-fast fan-out
//!
//! Every upstream read of a build runs through [`try_join_ordered`]: at most
//! `max_concurrent` futures are in flight, results come back in input order
//! regardless of completion order, and the first failure aborts every sibling.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Run `f` over `items` with bounded concurrency, returning results in input order
///
/// # Errors
/// Returns the first error any task produced, or the [`JoinError`] of a task
/// that panicked. All remaining tasks are aborted before returning.
pub async fn try_join_ordered<I, T, E, F, Fut>(
    items: I,
    max_concurrent: usize,
    f: F,
) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();
    let mut count = 0;

    for (position, item) in items.into_iter().enumerate() {
        let call = f(item);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await;
            (position, call.await)
        });
        count += 1;
    }

    let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (position, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                tasks.abort_all();
                return Err(e.into());
            }
        };
        match outcome {
            Ok(value) => {
                if let Some(slot) = results.get_mut(position) {
                    *slot = Some(value);
                }
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    Ok(results.into_iter().flatten().collect())
}
