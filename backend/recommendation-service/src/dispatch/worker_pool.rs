//! Fixed-size worker pool fed by a bounded backlog.
//!
//! `submit` never waits: when the backlog is full the job is rejected and the
//! caller decides what to do with it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait JobHandler<J>: Send + Sync + 'static {
    async fn handle(&self, job: J);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("dispatch backlog is full")]
    BacklogFull,

    #[error("worker pool is shut down")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Every worker finished before the deadline.
    pub drained: bool,
    /// Workers aborted after the deadline.
    pub aborted: usize,
}

pub struct WorkerPool<J: Send + 'static> {
    tx: Option<mpsc::Sender<J>>,
    workers: JoinSet<()>,
    size: usize,
}

impl<J: Send + 'static> WorkerPool<J> {
    pub fn start<H>(workers: usize, backlog: usize, handler: Arc<H>) -> Self
    where
        H: JobHandler<J>,
    {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<J>(backlog.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let rx = rx.clone();
            let handler = handler.clone();
            set.spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match job {
                        Some(job) => handler.handle(job).await,
                        None => break,
                    }
                }
                debug!(worker_id, "Dispatch worker exiting");
            });
        }

        info!(workers, backlog, "Dispatch worker pool started");
        Self {
            tx: Some(tx),
            workers: set,
            size: workers,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs waiting in the backlog.
    pub fn queued(&self) -> usize {
        self.tx
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    pub fn submit(&self, job: J) -> Result<(), SubmitError> {
        let tx = self.tx.as_ref().ok_or(SubmitError::Closed)?;
        tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::BacklogFull,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    /// Stop accepting jobs, let workers finish the backlog, and abort whatever
    /// is still running once `drain_timeout` elapses.
    pub async fn shutdown(mut self, drain_timeout: Duration) -> DrainReport {
        let queued = self.queued();
        self.tx.take();
        info!(queued, "Draining dispatch worker pool");

        let workers = &mut self.workers;
        let drained = tokio::time::timeout(drain_timeout, async {
            while let Some(result) = workers.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Dispatch worker panicked");
                }
            }
        })
        .await
        .is_ok();

        let aborted = self.workers.len();
        if !drained {
            warn!(
                aborted,
                timeout_secs = drain_timeout.as_secs_f64(),
                "Drain timeout elapsed, aborting dispatch workers"
            );
            self.workers.shutdown().await;
        }

        DrainReport { drained, aborted }
    }
}
