//! Key format: v{VERSION}:{entity}:{identifier}

use uuid::Uuid;

/// Bump when the cached value layout changes.
pub const CACHE_VERSION: u32 = 1;

pub struct CacheKey;

impl CacheKey {
    /// Format: v1:recommendation:{id}
    pub fn recommendation(id: Uuid) -> String {
        format!("v{}:recommendation:{}", CACHE_VERSION, id)
    }

    /// Format: v1:recommendations:user:{user_id}
    pub fn user_recommendations(user_id: Uuid) -> String {
        format!("v{}:recommendations:user:{}", CACHE_VERSION, user_id)
    }
}
