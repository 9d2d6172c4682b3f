use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A suggested product for a user.
///
/// `score` is the product's rating at the time the row was created; repeated
/// events never refresh it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
