use super::{above_threshold, RecommendationReader, RecommendationWriter, TOP_PRODUCTS};
use crate::error::RepoError;
use crate::lifecycle::Closer;
use crate::models::Recommendation;
use async_trait::async_trait;
use event_schema::{NewProductEvent, NewUserEvent, ProductUpdateEvent};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, user_id, product_id, score, created_at, updated_at";

#[derive(Clone)]
pub struct PgRecommendationRepository {
    pool: PgPool,
}

impl PgRecommendationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecommendationWriter for PgRecommendationRepository {
    async fn apply_new_product(&self, event: &NewProductEvent) -> Result<u64, RepoError> {
        let product = &event.product;
        if !above_threshold(product.rating) {
            debug!(
                product_id = %product.id,
                rating = product.rating,
                "Product rating below threshold, no recommendations"
            );
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO recommendations (user_id, product_id, score)
            SELECT id, $1::UUID, $2::DOUBLE PRECISION FROM users
            ON CONFLICT (user_id, product_id) DO NOTHING
            "#,
        )
        .bind(product.id)
        .bind(product.rating)
        .execute(&self.pool)
        .await?;

        info!(
            product_id = %product.id,
            rows = result.rows_affected(),
            "Recommended new product to existing users"
        );
        Ok(result.rows_affected())
    }

    async fn apply_product_update(&self, event: &ProductUpdateEvent) -> Result<u64, RepoError> {
        let product = &event.product;
        if !above_threshold(product.rating) {
            debug!(rating = product.rating, "Updated rating below threshold, skipping");
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            WITH top_products AS (
                SELECT id, rating FROM products ORDER BY rating DESC LIMIT $1
            )
            INSERT INTO recommendations (user_id, product_id, score)
            SELECT u.id, tp.id, tp.rating
            FROM users u CROSS JOIN top_products tp
            ON CONFLICT (user_id, product_id) DO NOTHING
            "#,
        )
        .bind(TOP_PRODUCTS)
        .execute(&self.pool)
        .await?;

        info!(
            product_id = ?product.id,
            rows = result.rows_affected(),
            "Recommended top products after rating update"
        );
        Ok(result.rows_affected())
    }

    async fn apply_new_user(&self, event: &NewUserEvent) -> Result<u64, RepoError> {
        let user_id = event.user.id;

        let result = sqlx::query(
            r#"
            WITH top_products AS (
                SELECT id, rating FROM products ORDER BY rating DESC LIMIT $2
            )
            INSERT INTO recommendations (user_id, product_id, score)
            SELECT $1::UUID, tp.id, tp.rating FROM top_products tp
            ON CONFLICT (user_id, product_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(TOP_PRODUCTS)
        .execute(&self.pool)
        .await?;

        info!(
            user_id = %user_id,
            rows = result.rows_affected(),
            "Recommended top products to new user"
        );
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecommendationReader for PgRecommendationRepository {
    async fn list_all(&self) -> Result<Vec<Recommendation>, RepoError> {
        let query = format!(
            "SELECT {} FROM recommendations ORDER BY created_at, id",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, Recommendation>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Recommendation, RepoError> {
        let query = format!("SELECT {} FROM recommendations WHERE id = $1", SELECT_COLUMNS);
        sqlx::query_as::<_, Recommendation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepoError::NotFound(id.to_string()))
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Recommendation>, RepoError> {
        let query = format!(
            "SELECT {} FROM recommendations WHERE user_id = $1 ORDER BY score DESC, id",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, Recommendation>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Closer for PgRecommendationRepository {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
