use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// USER SERVICE EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
}

/// `{"user": {"id": "<uuid>"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUserEvent {
    pub user: UserRef,
}

// ============================================================================
// PRODUCT SERVICE EVENTS
// ============================================================================

/// Product carried by a new-product event; the id is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedProduct {
    pub id: Uuid,
    pub rating: f64,
}

/// Product carried by an update event. The update acts system-wide, so the
/// id is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub rating: f64,
}

/// `{"product": {"id": "<uuid>", "rating": <float>}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProductEvent {
    pub product: RatedProduct,
}

/// `{"product": {"rating": <float>}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdateEvent {
    pub product: ProductRef,
}

// ============================================================================
// DISPATCH TYPES
// ============================================================================

/// Logical topic selector. Concrete topic names come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewUser,
    NewProduct,
    ProductUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::NewUser,
        EventKind::NewProduct,
        EventKind::ProductUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewUser => "new_user",
            EventKind::NewProduct => "new_product",
            EventKind::ProductUpdate => "product_update",
        }
    }

    /// Top-level field every payload of this kind must carry.
    pub fn root_field(&self) -> &'static str {
        match self {
            EventKind::NewUser => "user",
            EventKind::NewProduct | EventKind::ProductUpdate => "product",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    NewUser(NewUserEvent),
    NewProduct(NewProductEvent),
    ProductUpdate(ProductUpdateEvent),
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::NewUser(_) => EventKind::NewUser,
            DomainEvent::NewProduct(_) => EventKind::NewProduct,
            DomainEvent::ProductUpdate(_) => EventKind::ProductUpdate,
        }
    }
}
