use crate::dispatch::InboundMessage;
use crate::error::ConsumerError;
use async_trait::async_trait;
use std::time::Duration;

/// One non-empty poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Message(InboundMessage),
    /// Broker-level error. Logged; polling continues.
    BrokerError(String),
    /// Anything else the client reports (partition EOF, rebalances).
    Ignored,
}

/// Broker connection seen by the consumer loop.
#[async_trait]
pub trait MessageSource: Send {
    /// Subscribe to `topics` and return the subscription reported by the client.
    async fn subscribe(&mut self, topics: &[String]) -> Result<Vec<String>, ConsumerError>;

    /// Wait at most `timeout` for the next event. `None` means nothing arrived.
    async fn poll(&mut self, timeout: Duration) -> Option<PollEvent>;

    async fn close(&mut self);
}
