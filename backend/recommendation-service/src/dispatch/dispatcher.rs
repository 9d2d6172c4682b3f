use super::{InboundMessage, JobHandler, TopicRouter};
use crate::error::DispatchError;
use crate::metrics::{DISPATCH_IN_FLIGHT, MESSAGES_PROCESSED};
use crate::repository::RecommendationWriter;
use async_trait::async_trait;
use event_schema::{decode, DomainEvent, EventKind};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Routes a message to its store handler. Failures are isolated per message.
pub struct EventDispatcher {
    router: TopicRouter,
    writer: Arc<dyn RecommendationWriter>,
}

impl EventDispatcher {
    pub fn new(router: TopicRouter, writer: Arc<dyn RecommendationWriter>) -> Self {
        Self { router, writer }
    }

    /// Resolve, decode and apply one message. Returns the rows created.
    pub async fn dispatch(&self, message: &InboundMessage) -> Result<u64, DispatchError> {
        let kind = self
            .router
            .resolve(&message.topic)
            .ok_or_else(|| DispatchError::UnknownTopic(message.topic.clone()))?;

        let payload = message.payload.as_deref().unwrap_or_default();
        let event = decode(kind, payload)?;

        let rows = match &event {
            DomainEvent::NewUser(e) => self.writer.apply_new_user(e).await?,
            DomainEvent::NewProduct(e) => self.writer.apply_new_product(e).await?,
            DomainEvent::ProductUpdate(e) => self.writer.apply_product_update(e).await?,
        };
        Ok(rows)
    }

    fn kind_label(&self, topic: &str) -> &'static str {
        self.router
            .resolve(topic)
            .map_or("unknown", |kind: EventKind| kind.as_str())
    }
}

/// Holds the in-flight gauge up for as long as it lives. Dropping the guard
/// also covers handlers aborted at shutdown.
struct InFlightGuard;

impl InFlightGuard {
    fn enter() -> Self {
        DISPATCH_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        DISPATCH_IN_FLIGHT.dec();
    }
}

#[async_trait]
impl JobHandler<InboundMessage> for EventDispatcher {
    async fn handle(&self, message: InboundMessage) {
        let result = {
            let _in_flight = InFlightGuard::enter();
            self.dispatch(&message).await
        };

        let kind = self.kind_label(&message.topic);
        match result {
            Ok(rows) => {
                MESSAGES_PROCESSED.with_label_values(&[kind, "ok"]).inc();
                info!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    rows,
                    "Processed event"
                );
            }
            Err(e) => {
                MESSAGES_PROCESSED
                    .with_label_values(&[kind, e.outcome()])
                    .inc();
                match &e {
                    DispatchError::Store(_) => error!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "Failed to apply event, dropping message"
                    ),
                    _ => warn!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "Rejected event, dropping message"
                    ),
                }
            }
        }
    }
}
