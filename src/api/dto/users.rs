/*
 * Responsibility
 * - Users request/response DTOs (camelCase on the wire)
 * - Pagination defaults and metadata
 */
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repos::UserRow;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    /// Saturates, so a page far past the end reads as empty instead of overflowing.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl PageRequest {
    pub fn resolve(&self) -> Result<Page, &'static str> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);

        if page < 1 || !(1..=MAX_LIMIT).contains(&limit) {
            return Err(
                "Invalid pagination parameters: page must be >= 1, limit must be between 1 and 100",
            );
        }
        Ok(Page { page, limit })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMetadata {
    pub current_page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_records: i64,
    pub next_page: Option<i64>,
    pub prev_page: Option<i64>,
}

impl PaginationMetadata {
    pub fn new(page: Page, total_records: i64) -> Self {
        // An empty collection still has one (empty) page.
        let total_pages = ((total_records + page.limit - 1) / page.limit).max(1);

        Self {
            current_page: page.page,
            limit: page.limit,
            total_pages,
            total_records,
            next_page: (page.page < total_pages).then(|| page.page + 1),
            prev_page: (page.page > 1).then_some(page.page - 1),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub data: Vec<UserResponse>,
    pub pagination: PaginationMetadata,
}
