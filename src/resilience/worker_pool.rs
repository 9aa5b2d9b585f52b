use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::resilience::error::PipelineError;

/// Fixed-size pool of task slots. A submission without a free slot is rejected, not queued.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
    size: usize,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            name: name.into(),
            size,
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawns `task`, holding a slot until it finishes (even if the caller stops waiting).
    pub fn submit<Fut>(&self, task: Fut) -> Result<JoinHandle<Fut::Output>, PipelineError>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let permit = self.permits.clone().try_acquire_owned().map_err(|_| {
            warn!("worker pool '{}' saturated ({} slots busy)", self.name, self.size);
            PipelineError::Rejected { service: self.name.clone() }
        })?;

        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn rejects_when_every_slot_is_busy() {
        let pool = WorkerPool::new("pool_saturated", 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let busy = pool.submit(async move {
            let _ = release_rx.await;
            1
        });
        assert!(busy.is_ok());
        assert_eq!(pool.available(), 0);

        let rejected = pool.submit(async { 2 });
        assert!(matches!(rejected, Err(PipelineError::Rejected { .. })));

        release_tx.send(()).unwrap();
        assert_eq!(busy.unwrap().await.unwrap(), 1);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.submit(async { 3 }).unwrap().await.unwrap(), 3);
    }
}
