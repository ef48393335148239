//! Bounded task pool.
//!
//! Fans work items out with a concurrency cap. One cancellation token is
//! shared by every item: once it fires, items that have not started are
//! skipped, while items already running finish on their own terms.

use futures::future::join_all;
use std::future::Future;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of one work item.
#[derive(Debug)]
pub enum PoolItem<T, E> {
    /// The item finished
    Completed(T),
    /// The item failed
    Failed(E),
    /// Not started because the pool was cancelled first
    Skipped,
}

/// Per-item outcomes in input order.
#[derive(Debug)]
pub struct PoolReport<T, E> {
    /// One entry per input item
    pub items: Vec<PoolItem<T, E>>,
}

impl<T, E> PoolReport<T, E> {
    /// Values of completed items
    pub fn completed(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter_map(|item| match item {
            PoolItem::Completed(value) => Some(value),
            _ => None,
        })
    }

    /// Errors of failed items
    pub fn failures(&self) -> impl Iterator<Item = &E> {
        self.items.iter().filter_map(|item| match item {
            PoolItem::Failed(err) => Some(err),
            _ => None,
        })
    }

    /// Items that never started
    pub fn skipped(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, PoolItem::Skipped))
            .count()
    }

    /// First failure in input order, consuming the report.
    pub fn into_first_error(self) -> Option<E> {
        self.items.into_iter().find_map(|item| match item {
            PoolItem::Failed(err) => Some(err),
            _ => None,
        })
    }
}

/// Concurrency-capped executor.
#[derive(Debug, Clone, Copy)]
pub struct TaskPool {
    concurrency: usize,
}

impl TaskPool {
    /// A pool running at most `concurrency` items at once
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Concurrency ceiling
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `f` over `items`.
    ///
    /// Each item receives a child of `cancel`. With `fail_fast`, the first
    /// failure cancels the pool so pending items are skipped.
    pub async fn run<I, T, E, F, Fut>(
        &self,
        items: Vec<I>,
        cancel: &CancellationToken,
        fail_fast: bool,
        f: F,
    ) -> PoolReport<T, E>
    where
        F: Fn(I, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let pool_token = cancel.child_token();
        let semaphore = Semaphore::new(self.concurrency);
        let (f, pool_token_ref, semaphore_ref) = (&f, &pool_token, &semaphore);

        let workers = items.into_iter().enumerate().map(|(index, item)| async move {
            let Ok(_permit) = semaphore_ref.acquire().await else {
                return PoolItem::Skipped;
            };
            if pool_token_ref.is_cancelled() {
                debug!(index, "pool cancelled; skipping item");
                return PoolItem::Skipped;
            }
            match f(item, pool_token_ref.clone()).await {
                Ok(value) => PoolItem::Completed(value),
                Err(err) => {
                    if fail_fast {
                        pool_token_ref.cancel();
                    }
                    PoolItem::Failed(err)
                }
            }
        });

        PoolReport {
            items: join_all(workers).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_capped() {
        let pool = TaskPool::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let report: PoolReport<usize, ()> = pool
            .run((0..8).collect(), &CancellationToken::new(), false, |i, _| {
                let (in_flight, peak) = (in_flight.clone(), peak.clone());
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(i * 2)
                }
            })
            .await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(report.completed().copied().collect::<Vec<_>>(), vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_cancelled_pool_skips_everything() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicUsize::new(0));
        let report: PoolReport<(), ()> = TaskPool::new(3)
            .run(vec![1, 2, 3], &cancel, false, |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert_eq!(report.skipped(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_skips_pending_items_but_drains_in_flight() {
        let started = Arc::new(AtomicUsize::new(0));
        let report: PoolReport<u32, String> = TaskPool::new(2)
            .run(vec![0u32, 1, 2, 3, 4], &CancellationToken::new(), true, |i, token| {
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if i == 0 {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        return Err("boom".to_string());
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    assert!(token.is_cancelled());
                    Ok(i)
                }
            })
            .await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(report.completed().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(report.skipped(), 3);
        assert_eq!(report.into_first_error().as_deref(), Some("boom"));
    }
}
