//! Event schemas for the marketplace topics consumed by the recommendation pipeline
//!
//! Upstream services publish bare JSON objects (`{"user": {...}}`,
//! `{"product": {...}}`). Newer producers may wrap the same object in an
//! [`EventEnvelope`]; the decoder accepts both shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod decode;
pub mod events;

pub use decode::{decode, DecodeError};
pub use events::{
    DomainEvent, EventKind, NewProductEvent, NewUserEvent, ProductRef, ProductUpdateEvent,
    RatedProduct, UserRef,
};

/// Current schema version for enveloped events
pub const SCHEMA_VERSION: u32 = 1;

/// Optional wrapper around an event payload. Envelopes newer than
/// [`SCHEMA_VERSION`] are rejected by the decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique event ID for idempotency and tracing
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub schema_version: u32,
    /// Source service that generated the event
    pub source: String,
    pub correlation_id: Option<Uuid>,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(source: impl Into<String>, data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
            source: source.into(),
            correlation_id: None,
            data,
        }
    }
}
