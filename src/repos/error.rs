/**
 * Responsibility
 * - What a storage failure means to the layers above
 * - Handlers never see sqlx types; AppError maps these to 500
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("db error")]
    Db(#[from] sqlx::Error),
}
