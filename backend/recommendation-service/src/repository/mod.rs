//! Recommendation store: fan-out writes driven by events and the read paths
//! used by the query API.

mod postgres;

pub use postgres::PgRecommendationRepository;

use crate::error::RepoError;
use crate::models::Recommendation;
use async_trait::async_trait;
use event_schema::{NewProductEvent, NewUserEvent, ProductUpdateEvent};
use uuid::Uuid;

/// Products must be rated strictly above this to be recommended.
pub const RATING_THRESHOLD: f64 = 4.5;

/// Number of top-rated products used by the update and new-user rules.
pub const TOP_PRODUCTS: i64 = 3;

/// Event-driven writes. Every operation is a single conflict-tolerant insert
/// and returns the number of rows actually created.
#[async_trait]
pub trait RecommendationWriter: Send + Sync {
    /// Recommend the product to every existing user when its rating clears the threshold.
    async fn apply_new_product(&self, event: &NewProductEvent) -> Result<u64, RepoError>;

    /// Recommend the current top products to every user when the updated rating
    /// clears the threshold.
    async fn apply_product_update(&self, event: &ProductUpdateEvent) -> Result<u64, RepoError>;

    /// Recommend the current top products to the new user.
    async fn apply_new_user(&self, event: &NewUserEvent) -> Result<u64, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecommendationReader: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Recommendation>, RepoError>;

    /// Returns [`RepoError::NotFound`] when no row has this id.
    async fn get_by_id(&self, id: Uuid) -> Result<Recommendation, RepoError>;

    /// Highest score first. An unknown user yields an empty list.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Recommendation>, RepoError>;

    async fn ping(&self) -> Result<(), RepoError>;
}

/// Whether a rating is high enough to trigger a fan-out.
pub fn above_threshold(rating: f64) -> bool {
    rating > RATING_THRESHOLD
}
