//! Recommendation pipeline
//!
//! Consumes new-user, new-product and product-update events, turns them into
//! recommendation rows with idempotent upserts, and serves recommendation
//! reads through a Redis cache-aside layer.

pub mod cache;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod services;

pub use error::{
    AppError, CacheError, ConfigError, ConsumerError, DispatchError, RepoError, ServiceError,
};
pub use models::Recommendation;
