use std::future::Future;

use tokio::task::{JoinError, JoinSet};

/// Fixed-width fan-out with a join barrier per batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchQueue {
    width: usize,
}

impl BatchQueue {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn partition<'a, T>(&self, jobs: &'a [T]) -> std::slice::Chunks<'a, T> {
        jobs.chunks(self.width)
    }

    /// Spawns every future and returns only after all of them have finished.
    pub async fn run_batch<F, T>(&self, batch: impl IntoIterator<Item = F>) -> Vec<Result<T, JoinError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut set = JoinSet::new();
        for fut in batch {
            set.spawn(fut);
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(result) = set.join_next().await {
            results.push(result);
        }
        results
    }
}
