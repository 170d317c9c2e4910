//! Query scopes shared by tenant-owned entities
//!
//! Every tenant table has `company_id` plus the audit stamp columns. Reads
//! go through [`scoped`] so soft-deleted rows and other tenants' rows never
//! leak into a response.

use chrono::Utc;
use sea_orm::prelude::DateTimeUtc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect, Select};

/// Entity with `company_id`, `deleted_at`/`deleted_by` and update stamp columns.
pub trait Tenanted: EntityTrait {
    fn id_column() -> Self::Column;
    fn company_column() -> Self::Column;
    fn deleted_at_column() -> Self::Column;
    fn deleted_by_column() -> Self::Column;
    fn updated_at_column() -> Self::Column;
    fn updated_by_column() -> Self::Column;
}

/// Live rows of one company.
pub fn scoped<E: Tenanted>(company_id: i64) -> Select<E> {
    E::find()
        .filter(E::company_column().eq(company_id))
        .filter(E::deleted_at_column().is_null())
}

/// Fetch one live row of the company by primary key.
pub async fn find_scoped<E, C>(db: &C, company_id: i64, id: i64) -> Result<Option<E::Model>, DbErr>
where
    E: Tenanted,
    C: ConnectionTrait,
{
    scoped::<E>(company_id)
        .filter(E::id_column().eq(id))
        .one(db)
        .await
}

/// Like [`find_scoped`], holding a row lock until the transaction ends.
pub async fn find_scoped_for_update<E, C>(db: &C, company_id: i64, id: i64) -> Result<Option<E::Model>, DbErr>
where
    E: Tenanted,
    C: ConnectionTrait,
{
    scoped::<E>(company_id)
        .filter(E::id_column().eq(id))
        .lock_exclusive()
        .one(db)
        .await
}

/// Mark a live row deleted. Returns the number of rows affected (0 or 1).
pub async fn soft_delete<E, C>(db: &C, company_id: i64, id: i64, by: i64) -> Result<u64, DbErr>
where
    E: Tenanted,
    C: ConnectionTrait,
{
    let now = Utc::now();
    let res = E::update_many()
        .col_expr(E::deleted_at_column(), Expr::value(now))
        .col_expr(E::deleted_by_column(), Expr::value(by))
        .col_expr(E::updated_at_column(), Expr::value(now))
        .col_expr(E::updated_by_column(), Expr::value(by))
        .filter(E::id_column().eq(id))
        .filter(E::company_column().eq(company_id))
        .filter(E::deleted_at_column().is_null())
        .exec(db)
        .await?;

    Ok(res.rows_affected)
}

/// Audit stamp values for one write
#[derive(Clone, Copy, Debug)]
pub struct Stamp {
    pub at: DateTimeUtc,
    pub by: Option<i64>,
}

impl Stamp {
    /// Stamp for a write made by a user
    pub fn now(user_id: i64) -> Self {
        Self {
            at: Utc::now(),
            by: Some(user_id),
        }
    }

    /// Stamp for writes made by the server itself (bootstrap)
    pub fn system() -> Self {
        Self {
            at: Utc::now(),
            by: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::item;
    use sea_orm::{DbBackend, MockDatabase, MockExecResult, QueryTrait};

    #[test]
    fn test_scoped_filters_company_and_deleted() {
        let sql = scoped::<item::Entity>(7).build(DbBackend::Postgres).to_string();
        assert!(sql.contains(r#""erp_item"."company_id" = 7"#));
        assert!(sql.contains(r#""erp_item"."deleted_at" IS NULL"#));
    }

    #[tokio::test]
    async fn test_find_for_update_locks_row() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<item::Model>::new()])
            .into_connection();

        let found = find_scoped_for_update::<item::Entity, _>(&db, 1, 10).await.unwrap();
        assert!(found.is_none());

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
    }

    #[tokio::test]
    async fn test_soft_delete_reports_rows_affected() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results([
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 0 },
            ])
            .into_connection();

        assert_eq!(soft_delete::<item::Entity, _>(&db, 1, 10, 3).await.unwrap(), 1);
        assert_eq!(soft_delete::<item::Entity, _>(&db, 1, 10, 3).await.unwrap(), 0);
    }

    #[test]
    fn test_stamp_user() {
        let stamp = Stamp::now(42);
        assert_eq!(stamp.by, Some(42));
        assert_eq!(Stamp::system().by, None);
    }
}
