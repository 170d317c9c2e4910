//! Leave request handlers

use axum::{extract::Query, Extension, Json};
use chrono::NaiveDate;
use sea_orm::{ColumnTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Deserialize;

use crate::entity::leave_request::{self, LeaveStatus, LeaveType};
use crate::entity::op_log::OpType;
use crate::error::AppResult;
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{paging, IdRequest, Page};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{scoped, Stamp};
use crate::service::{self, leave::LeaveInput};
use crate::validate::Validate;

/// `employeeId` may be left out to file for the caller's own employee
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLeaveRequest {
    pub employee_id: Option<i64>,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveQuery {
    pub employee_id: Option<i64>,
    pub status: Option<LeaveStatus>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// POST /api/leave/add
pub async fn add_leave(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<AddLeaveRequest>,
) -> AppResult<Json<ApiResponse<leave_request::Model>>> {
    let is_hr = current_user.has_permission(perm::HR);
    let employee = service::acting_employee(
        &*db,
        current_user.company_id,
        current_user.id,
        is_hr,
        req.employee_id,
    )
    .await?;

    let input = LeaveInput {
        employee_id: employee.id,
        leave_type: req.leave_type,
        start_date: req.start_date,
        end_date: req.end_date,
        reason: req.reason,
    };
    input.validate()?;

    let result = service::leave::request(&*db, current_user.company_id, &input, Stamp::now(current_user.id)).await;
    let desc = format!(
        "{} {:?} {} to {}",
        employee.code, input.leave_type, input.start_date, input.end_date
    );
    log_outcome(&current_user, OpType::RequestLeave, &desc, &result);
    Ok(Json(ApiResponse::success(result?)))
}

async fn decide(
    db: &DbConn,
    current_user: &CurrentUser,
    id: i64,
    approve: bool,
) -> AppResult<leave_request::Model> {
    current_user.require(perm::HR)?;
    let result = service::leave::decide(
        &**db,
        current_user.company_id,
        id,
        approve,
        Stamp::now(current_user.id),
    )
    .await;
    let op = if approve { OpType::ApproveLeave } else { OpType::RejectLeave };
    log_outcome(current_user, op, &format!("leave request {}", id), &result);
    result
}

/// POST /api/leave/approve
pub async fn approve_leave(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<leave_request::Model>>> {
    Ok(Json(ApiResponse::success(decide(&db, &current_user, req.id, true).await?)))
}

/// POST /api/leave/reject
pub async fn reject_leave(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<leave_request::Model>>> {
    Ok(Json(ApiResponse::success(decide(&db, &current_user, req.id, false).await?)))
}

/// POST /api/leave/cancel - by hr, or by the employee's own user
pub async fn cancel_leave(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<leave_request::Model>>> {
    let own_user = if current_user.has_permission(perm::HR) {
        None
    } else {
        Some(current_user.id)
    };

    let result = service::leave::cancel(
        &*db,
        current_user.company_id,
        req.id,
        own_user,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(&current_user, OpType::CancelLeave, &format!("leave request {}", req.id), &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// GET /api/leave/query?employeeId&status
pub async fn get_leaves(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<LeaveQuery>,
) -> AppResult<Json<ApiResponse<Page<leave_request::Model>>>> {
    let is_hr = current_user.has_permission(perm::HR);
    let employee_id = if is_hr {
        query.employee_id
    } else {
        let own = service::acting_employee(
            &*db,
            current_user.company_id,
            current_user.id,
            false,
            query.employee_id,
        )
        .await?;
        Some(own.id)
    };

    let mut select = scoped::<leave_request::Entity>(current_user.company_id);
    if let Some(id) = employee_id {
        select = select.filter(leave_request::Column::EmployeeId.eq(id));
    }
    if let Some(status) = query.status {
        select = select.filter(leave_request::Column::Status.eq(status));
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let items = select
        .order_by_desc(leave_request::Column::StartDate)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(Page { items, total })))
}
