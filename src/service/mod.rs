//! Business rules shared by the HTTP handlers
//!
//! Services take a connection (or transaction) and return [`AppResult`];
//! permission checks stay in the handlers.

pub mod attendance;
pub mod calendar;
pub mod document;
pub mod inventory;
pub mod leave;
pub mod payroll;
pub mod purchase;
pub mod sale;

use sea_orm::{ColumnTrait, ConnectionTrait, QueryFilter};

use crate::entity::employee;
use crate::error::{AppError, AppResult, OptionExt};
use crate::scope::{find_scoped, scoped};

/// Employee a self-service request acts on.
///
/// HR may name any employee; everyone else acts on the employee linked to
/// their own user.
pub async fn acting_employee<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    user_id: i64,
    is_hr: bool,
    requested: Option<i64>,
) -> AppResult<employee::Model> {
    let own = scoped::<employee::Entity>(company_id)
        .filter(employee::Column::UserId.eq(user_id));

    match requested {
        Some(id) if is_hr => find_scoped::<employee::Entity, _>(db, company_id, id)
            .await?
            .ok_or_not_found(format!("employee {} not found", id)),
        Some(id) => match own.one(db).await? {
            Some(e) if e.id == id => Ok(e),
            _ => Err(AppError::Forbidden),
        },
        None => own
            .one(db)
            .await?
            .ok_or_else(|| AppError::BadRequest("no employee is linked to this user".to_string())),
    }
}
