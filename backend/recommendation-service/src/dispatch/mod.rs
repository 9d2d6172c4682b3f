//! Message dispatch: topic routing, decoding, store handlers and the bounded
//! worker pool that keeps slow handlers off the poll loop.

mod dispatcher;
mod router;
mod worker_pool;

pub use dispatcher::EventDispatcher;
pub use router::TopicRouter;
pub use worker_pool::{DrainReport, JobHandler, SubmitError, WorkerPool};

/// A message taken off the broker, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            payload: Some(payload.into()),
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }
}
