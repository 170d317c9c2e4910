//! Request handlers module

pub mod attendance;
pub mod audit;
pub mod auth;
pub mod branch;
pub mod company;
pub mod department;
pub mod document;
pub mod employee;
pub mod item;
pub mod leave;
pub mod partner;
pub mod payroll;
pub mod project;
pub mod reference;
pub mod role;
pub mod stock;
pub mod user;
pub mod warehouse;

use sea_orm::{ConnectionTrait, DbErr, SqlErr};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::CurrentUser;
use crate::scope::{find_scoped, soft_delete, Tenanted};

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 100;

/// `(offset, limit)` for a 1-based page, page size clamped to 1..=100
pub fn paging(page: Option<u64>, page_size: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    ((page - 1) * limit, limit)
}

/// Pagination query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u64>,
}

impl PageQuery {
    pub fn offset_limit(&self) -> (u64, u64) {
        paging(self.page, self.page_size)
    }
}

/// One page of results
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: i64,
}

/// Body of delete/approve style requests
#[derive(Debug, Deserialize)]
pub struct IdRequest {
    pub id: i64,
}

/// Body of update requests: the target id plus the full record
#[derive(Debug, Deserialize)]
pub struct UpdateRequest<T> {
    pub id: i64,
    #[serde(flatten)]
    pub body: T,
}

/// Map a unique index violation to Conflict
pub fn unique_violation(what: &str) -> impl FnOnce(DbErr) -> AppError + '_ {
    move |err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Conflict(format!("{} already exists", what)),
        _ => AppError::Database(err),
    }
}

/// Live row of the caller's company, NotFound otherwise
pub async fn find_owned<E, C>(db: &C, user: &CurrentUser, id: i64, what: &str) -> AppResult<E::Model>
where
    E: Tenanted,
    C: ConnectionTrait,
{
    find_scoped::<E, C>(db, user.company_id, id)
        .await?
        .ok_or_not_found(format!("{} {} not found", what, id))
}

/// Soft-delete a row of the caller's company, NotFound when nothing matched
pub async fn delete_owned<E, C>(db: &C, user: &CurrentUser, id: i64, what: &str) -> AppResult<()>
where
    E: Tenanted,
    C: ConnectionTrait,
{
    match soft_delete::<E, C>(db, user.company_id, id, user.id).await? {
        0 => Err(AppError::NotFound(format!("{} {} not found", what, id))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging() {
        assert_eq!(paging(None, None), (0, 10));
        assert_eq!(paging(Some(3), Some(20)), (40, 20));
        assert_eq!(paging(Some(0), Some(0)), (0, 1));
        assert_eq!(paging(Some(2), Some(1_000)), (100, 100));
    }

    #[test]
    fn test_unique_violation_passthrough() {
        let err = unique_violation("item")(DbErr::RecordNotFound("x".to_string()));
        assert!(matches!(err, AppError::Database(_)));
    }
}
