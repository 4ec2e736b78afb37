//! # Bounded Worker Pool
//!
//! Semaphore-bounded fan-out shared by chunk-internal materialization,
//! optional parallel chunk execution and bulk photo export.
//!
//! - 동시 실행 수는 `Semaphore` 로 제한
//! - 결과는 입력 인덱스 위치에 기록 (append-by-index)

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Runs units of work with at most `width` of them in flight
#[derive(Debug, Clone)]
pub struct BoundedWorkerPool {
    semaphore: Arc<Semaphore>,
    width: usize,
}

impl BoundedWorkerPool {
    /// Create a pool; a width of 0 is treated as 1
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self { semaphore: Arc::new(Semaphore::new(width)), width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `work` over every item and return the results in input order
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, work: F) -> Vec<T>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = T>,
    {
        self.run_with(items, work, |_, _| {}).await
    }

    /// Like [`run`](Self::run), calling `on_complete(index, &result)` as each unit finishes
    ///
    /// `on_complete` runs on the driving task, in completion order.
    pub async fn run_with<I, T, F, Fut, C>(
        &self,
        items: Vec<I>,
        mut work: F,
        mut on_complete: C,
    ) -> Vec<T>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = T>,
        C: FnMut(usize, &T),
    {
        let total = items.len();
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();

        let mut in_flight: FuturesUnordered<_> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let semaphore = Arc::clone(&self.semaphore);
                let unit = work(item);
                async move {
                    // The semaphore is never closed, so acquire only fails if that changes.
                    let _permit = semaphore.acquire_owned().await.ok();
                    (index, unit.await)
                }
            })
            .collect();

        while let Some((index, result)) = in_flight.next().await {
            on_complete(index, &result);
            slots[index] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }
}

impl Default for BoundedWorkerPool {
    fn default() -> Self {
        Self::new(crate::infrastructure::config::defaults::MATERIALIZE_CONCURRENCY)
    }
}
