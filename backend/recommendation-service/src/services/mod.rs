mod recommendation;

pub use recommendation::{HealthStatus, RecommendationService};
