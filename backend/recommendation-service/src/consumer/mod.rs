//! Event consumer
//!
//! Owns the broker subscription and the poll loop. Each genuine message is
//! handed to the dispatch worker pool without waiting for it to be processed,
//! so a slow store never stalls polling. Delivery is at-most-once: offsets are
//! committed by the client regardless of handler outcome.
//!
//! State machine: `Created -> Subscribed -> Polling <-> Dispatching -> Stopped`.
//! A stopped consumer cannot be restarted; `run` takes `self` by value.

mod kafka;
mod source;

pub use kafka::KafkaMessageSource;
pub use source::{MessageSource, PollEvent};

use crate::config::{DispatchConfig, KafkaConfig};
use crate::dispatch::{InboundMessage, SubmitError, WorkerPool};
use crate::error::ConsumerError;
use crate::lifecycle::{ShutdownReason, ShutdownSignal};
use crate::metrics::{BROKER_ERRORS, DISPATCH_REJECTED, MESSAGES_RECEIVED};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Created,
    Subscribed,
    Polling,
    Dispatching,
    Stopped,
}

/// Read-only view of a consumer's state that outlives the consumer.
#[derive(Clone)]
pub struct ConsumerStateHandle {
    rx: watch::Receiver<ConsumerState>,
}

impl ConsumerStateHandle {
    pub fn current(&self) -> ConsumerState {
        *self.rx.borrow()
    }

    /// Wait until the consumer reaches `target`. Returns false if the
    /// consumer went away first.
    pub async fn wait_for(&mut self, target: ConsumerState) -> bool {
        self.rx.wait_for(|state| *state == target).await.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub topics: Vec<String>,
    pub poll_timeout: Duration,
    pub drain_timeout: Duration,
}

impl ConsumerOptions {
    pub fn from_config(kafka: &KafkaConfig, dispatch: &DispatchConfig) -> Self {
        Self {
            topics: kafka.topics.names(),
            poll_timeout: kafka.poll_timeout,
            drain_timeout: dispatch.drain_timeout,
        }
    }
}

pub struct EventConsumer<S: MessageSource> {
    source: S,
    pool: WorkerPool<InboundMessage>,
    options: ConsumerOptions,
    shutdown: ShutdownSignal,
    state: watch::Sender<ConsumerState>,
}

impl<S: MessageSource> EventConsumer<S> {
    pub fn new(
        source: S,
        pool: WorkerPool<InboundMessage>,
        options: ConsumerOptions,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (state, _rx) = watch::channel(ConsumerState::Created);
        Self {
            source,
            pool,
            options,
            shutdown,
            state,
        }
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn state_handle(&self) -> ConsumerStateHandle {
        ConsumerStateHandle {
            rx: self.state.subscribe(),
        }
    }

    fn set_state(&self, next: ConsumerState) {
        self.state.send_replace(next);
    }

    /// Subscribe to every configured topic. A failure leaves the consumer
    /// unusable and is meant to abort startup.
    pub async fn subscribe(&mut self) -> Result<(), ConsumerError> {
        if self.state() != ConsumerState::Created {
            return Ok(());
        }

        let subscribed = self.source.subscribe(&self.options.topics).await?;
        for topic in &subscribed {
            info!(topic = %topic, "Subscribed to topic");
        }
        self.set_state(ConsumerState::Subscribed);
        Ok(())
    }

    /// Poll until the shutdown signal fires, then drain in-flight work and
    /// close the broker connection. Returns the shutdown reason.
    pub async fn run(mut self) -> Result<ShutdownReason, ConsumerError> {
        if let Err(e) = self.subscribe().await {
            error!(error = %e, "Subscription failed");
            self.source.close().await;
            self.state.send_replace(ConsumerState::Stopped);
            return Err(e);
        }

        self.set_state(ConsumerState::Polling);
        info!(
            poll_timeout_ms = self.options.poll_timeout.as_millis() as u64,
            "Event consumer polling"
        );

        let mut shutdown = self.shutdown.clone();
        let reason = loop {
            let polled = tokio::select! {
                biased;
                reason = shutdown.cancelled() => Err(reason),
                polled = self.source.poll(self.options.poll_timeout) => Ok(polled),
            };

            match polled {
                Err(reason) => break reason,
                Ok(None) => continue,
                Ok(Some(PollEvent::Message(message))) => self.dispatch(message),
                Ok(Some(PollEvent::BrokerError(e))) => {
                    BROKER_ERRORS.inc();
                    warn!(error = %e, "Kafka error while polling, continuing");
                }
                Ok(Some(PollEvent::Ignored)) => debug!("Ignoring non-message poll event"),
            }
        };

        info!(reason = %reason, "Stopping event consumer");

        let report = self.pool.shutdown(self.options.drain_timeout).await;
        if report.drained {
            info!("All in-flight events processed");
        } else {
            warn!(aborted = report.aborted, "Abandoned in-flight events at shutdown");
        }

        self.source.close().await;
        self.state.send_replace(ConsumerState::Stopped);
        info!("Event consumer stopped");

        Ok(reason)
    }

    fn dispatch(&self, message: InboundMessage) {
        self.set_state(ConsumerState::Dispatching);

        info!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            bytes = message.payload_len(),
            "Received message"
        );
        MESSAGES_RECEIVED
            .with_label_values(&[message.topic.as_str()])
            .inc();

        let topic = message.topic.clone();
        let offset = message.offset;
        match self.pool.submit(message) {
            Ok(()) => {}
            Err(SubmitError::BacklogFull) => {
                DISPATCH_REJECTED.inc();
                warn!(topic = %topic, offset, "Dispatch backlog full, dropping message");
            }
            Err(SubmitError::Closed) => {
                warn!(topic = %topic, offset, "Worker pool closed, dropping message");
            }
        }

        self.set_state(ConsumerState::Polling);
    }
}
