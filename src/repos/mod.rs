pub mod error;
pub mod health_repo;
pub mod user_repo;

#[cfg(test)]
pub mod memory;

pub use user_repo::{PgUserStore, UserRow, UserStore};
