/*
 * Responsibility
 * - Trivial round-trip used by the readiness probe
 */
use sqlx::PgPool;

use crate::repos::error::RepoError;

pub async fn ping(db: &PgPool) -> Result<(), RepoError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(db)
        .await?;
    Ok(())
}
