//! In-memory `UserStore` for handler and pipeline tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::repos::user_repo::{UserRow, UserStore};

#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<UserRow>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryUserStore {
    pub fn with_rows(rows: Vec<UserRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Every subsequent call fails like a lost connection.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Db(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

pub fn user(first: &str, last: &str) -> UserRow {
    UserRow {
        user_id: Uuid::new_v4(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: Some(format!("{}@example.com", first.to_lowercase())),
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn count(&self) -> Result<i64, RepoError> {
        self.enter()?;
        Ok(self.rows.lock().unwrap().len() as i64)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UserRow>, RepoError> {
        self.enter()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<UserRow>, RepoError> {
        self.enter()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|r| r.user_id == user_id).cloned())
    }

    async fn create(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<UserRow, RepoError> {
        self.enter()?;
        let row = UserRow {
            user_id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: Some(email.to_string()),
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }
}
