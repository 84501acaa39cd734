/*
 * Responsibility
 * - SQLx operations on the users table
 * - UserStore trait so handlers can run against Postgres or an in-memory store
 * - DB errors come back as RepoError
 */
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoError;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn count(&self) -> Result<i64, RepoError>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UserRow>, RepoError>;
    async fn get(&self, user_id: Uuid) -> Result<Option<UserRow>, RepoError>;
    async fn create(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<UserRow, RepoError>;
}

#[derive(Clone, Debug)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn count(&self) -> Result<i64, RepoError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(total)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UserRow>, RepoError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, first_name, last_name, email
            FROM users
            ORDER BY user_id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<UserRow>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, first_name, last_name, email
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    async fn create(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<UserRow, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (first_name, last_name, email)
            VALUES ($1, $2, $3)
            RETURNING user_id, first_name, last_name, email
            "#,
        )
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .fetch_one(&self.db)
        .await?;

        Ok(row)
    }
}
