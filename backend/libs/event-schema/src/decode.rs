//! Two-stage payload decoding.
//!
//! The payload is first parsed as untyped JSON, which separates syntactically
//! broken input ([`DecodeError::Malformed`]) from well-formed JSON that does not
//! match the expected event shape ([`DecodeError::Schema`]).

use crate::events::{DomainEvent, EventKind, NewProductEvent, NewUserEvent, ProductUpdateEvent};
use crate::{EventEnvelope, SCHEMA_VERSION};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} payload does not match schema: {reason}")]
    Schema { kind: EventKind, reason: String },
}

impl DecodeError {
    pub fn kind(&self) -> EventKind {
        match self {
            DecodeError::Malformed { kind, .. } | DecodeError::Schema { kind, .. } => *kind,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, DecodeError::Malformed { .. })
    }
}

/// Decode a raw payload for the given event kind.
pub fn decode(kind: EventKind, payload: &[u8]) -> Result<DomainEvent, DecodeError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|source| DecodeError::Malformed { kind, source })?;

    let value = unwrap_envelope(kind, value)?;

    match kind {
        EventKind::NewUser => typed::<NewUserEvent>(kind, value).map(DomainEvent::NewUser),
        EventKind::NewProduct => {
            let event = typed::<NewProductEvent>(kind, value)?;
            ensure_finite(kind, event.product.rating)?;
            Ok(DomainEvent::NewProduct(event))
        }
        EventKind::ProductUpdate => {
            let event = typed::<ProductUpdateEvent>(kind, value)?;
            ensure_finite(kind, event.product.rating)?;
            Ok(DomainEvent::ProductUpdate(event))
        }
    }
}

/// Accept [`EventEnvelope`]-wrapped payloads as well as bare ones.
fn unwrap_envelope(kind: EventKind, value: Value) -> Result<Value, DecodeError> {
    if value.get(kind.root_field()).is_some() || value.get("data").is_none() {
        return Ok(value);
    }

    let envelope: EventEnvelope<Value> = typed(kind, value)?;
    if envelope.schema_version > SCHEMA_VERSION {
        return Err(DecodeError::Schema {
            kind,
            reason: format!(
                "unsupported schema version {} (max {})",
                envelope.schema_version, SCHEMA_VERSION
            ),
        });
    }
    Ok(envelope.data)
}

fn typed<T: DeserializeOwned>(kind: EventKind, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::Schema {
        kind,
        reason: e.to_string(),
    })
}

fn ensure_finite(kind: EventKind, rating: f64) -> Result<(), DecodeError> {
    if rating.is_finite() {
        Ok(())
    } else {
        Err(DecodeError::Schema {
            kind,
            reason: format!("rating must be finite, got {}", rating),
        })
    }
}
