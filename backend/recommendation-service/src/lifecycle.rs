//! Process lifecycle
//!
//! A [`Lifecycle`] is created once by the binary and handed to components at
//! construction. Components observe cancellation through a [`ShutdownSignal`]
//! and register resources that must be released via [`Lifecycle::register`].
//! [`Lifecycle::shutdown`] triggers the signal and runs every registered
//! closer exactly once, newest first.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl-C or another interrupt from the operator.
    Interrupted,
    /// Explicit request from inside the process.
    Requested(String),
    /// The lifecycle was dropped without an explicit trigger.
    Detached,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupted => f.write_str("interrupted"),
            ShutdownReason::Requested(why) => write!(f, "requested: {}", why),
            ShutdownReason::Detached => f.write_str("lifecycle dropped"),
        }
    }
}

/// Cooperative cancellation handle. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownSignal {
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.rx.borrow().clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolves once shutdown has been triggered. Safe to use in `select!`.
    pub async fn cancelled(&mut self) -> ShutdownReason {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                return self.reason().unwrap_or(ShutdownReason::Detached);
            }
        }
    }
}

/// A resource released during shutdown.
#[async_trait]
pub trait Closer: Send + Sync {
    fn name(&self) -> &str;

    async fn close(&self) -> anyhow::Result<()>;
}

pub struct Lifecycle {
    tx: watch::Sender<Option<ShutdownReason>>,
    closers: Mutex<Vec<Arc<dyn Closer>>>,
    closed: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            closers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn register(&self, closer: Arc<dyn Closer>) {
        info!(component = closer.name(), "Registered for shutdown");
        self.closers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(closer);
    }

    /// Fire the shutdown signal. Only the first reason is kept.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let fired = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if fired {
            info!(reason = %reason, "Shutdown triggered");
        }
        fired
    }

    /// Trigger shutdown (if not already) and run all closers in reverse
    /// registration order. Closer failures are logged, not propagated.
    pub async fn shutdown(&self, reason: ShutdownReason) {
        self.trigger(reason);
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let closers: Vec<Arc<dyn Closer>> = {
            let mut guard = self
                .closers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).rev().collect()
        };

        for closer in closers {
            match closer.close().await {
                Ok(()) => info!(component = closer.name(), "Closed"),
                Err(e) => error!(component = closer.name(), error = %e, "Failed to close"),
            }
        }
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct RecordingCloser {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Closer for RecordingCloser {
        fn name(&self) -> &str {
            &self.name
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.name.clone());
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn closer(name: &str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn Closer> {
        Arc::new(RecordingCloser {
            name: name.to_string(),
            log: log.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn test_closers_run_once_in_reverse_order() {
        let lifecycle = Lifecycle::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        lifecycle.register(closer("db", &log, false));
        lifecycle.register(closer("cache", &log, true));
        lifecycle.register(closer("consumer", &log, false));

        lifecycle.shutdown(ShutdownReason::Interrupted).await;
        lifecycle.shutdown(ShutdownReason::Interrupted).await;

        assert_eq!(*log.lock().unwrap(), vec!["consumer", "cache", "db"]);
    }

    #[tokio::test]
    async fn test_first_reason_wins() {
        let lifecycle = Lifecycle::new();
        let signal = lifecycle.signal();
        assert!(!signal.is_triggered());

        assert!(lifecycle.trigger(ShutdownReason::Requested("test".into())));
        assert!(!lifecycle.trigger(ShutdownReason::Interrupted));

        assert_eq!(
            signal.reason(),
            Some(ShutdownReason::Requested("test".into()))
        );
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let lifecycle = Lifecycle::new();
        let mut signal = lifecycle.signal();

        let waiter = tokio::spawn(async move { signal.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        lifecycle.trigger(ShutdownReason::Interrupted);

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, ShutdownReason::Interrupted);
    }

    #[tokio::test]
    async fn test_signal_created_after_trigger_is_already_cancelled() {
        let lifecycle = Lifecycle::new();
        lifecycle.trigger(ShutdownReason::Interrupted);

        let mut late = lifecycle.signal();
        assert_eq!(late.cancelled().await, ShutdownReason::Interrupted);
    }

    #[tokio::test]
    async fn test_dropped_lifecycle_detaches() {
        let lifecycle = Lifecycle::new();
        let mut signal = lifecycle.signal();
        drop(lifecycle);

        assert_eq!(signal.cancelled().await, ShutdownReason::Detached);
    }
}
