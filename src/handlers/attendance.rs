//! Attendance handlers
//!
//! Check-in and check-out act on the employee linked to the caller; HR may
//! act on anyone and record attendance by hand.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use sea_orm::{ColumnTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Deserialize;

use crate::entity::op_log::OpType;
use crate::entity::{attendance, employee};
use crate::error::AppResult;
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{find_owned, paging, Page};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{scoped, Stamp};
use crate::service::{self, attendance::ManualAttendance};
use crate::state::AppState;
use crate::validate::{self, Validate};

/// Optional target of a self-service request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRef {
    pub employee_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    pub employee_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

async fn acting(db: &DbConn, user: &CurrentUser, requested: Option<i64>) -> AppResult<employee::Model> {
    service::acting_employee(&**db, user.company_id, user.id, user.has_permission(perm::HR), requested).await
}

/// POST /api/attendance/check-in
pub async fn check_in(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<EmployeeRef>,
) -> AppResult<Json<ApiResponse<attendance::Model>>> {
    let employee = acting(&db, &current_user, req.employee_id).await?;

    let result = service::attendance::check_in(
        &*db,
        current_user.company_id,
        employee.id,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(&current_user, OpType::CheckIn, &employee.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/attendance/check-out
pub async fn check_out(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<EmployeeRef>,
) -> AppResult<Json<ApiResponse<attendance::Model>>> {
    let employee = acting(&db, &current_user, req.employee_id).await?;

    let result = service::attendance::check_out(
        &*db,
        current_user.company_id,
        employee.id,
        state.config.payroll.standard_hours_per_day,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(&current_user, OpType::CheckOut, &employee.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/attendance/add
pub async fn add_attendance(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<ManualAttendance>,
) -> AppResult<Json<ApiResponse<attendance::Model>>> {
    current_user.require(perm::HR)?;
    req.validate()?;
    let employee = find_owned::<employee::Entity, _>(&*db, &current_user, req.employee_id, "employee").await?;

    let result = service::attendance::record(
        &*db,
        current_user.company_id,
        &req,
        state.config.payroll.standard_hours_per_day,
        Stamp::now(current_user.id),
    )
    .await;
    let desc = format!("{} on {}", employee.code, req.check_in.date_naive());
    log_outcome(&current_user, OpType::RecordAttendance, &desc, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// GET /api/attendance/query?employeeId&from&to
///
/// Without `hr` only the caller's own records are visible.
pub async fn get_attendance(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<AttendanceQuery>,
) -> AppResult<Json<ApiResponse<Page<attendance::Model>>>> {
    validate::date_range(query.from, query.to)?;

    let employee_id = match (current_user.has_permission(perm::HR), query.employee_id) {
        (true, requested) => requested,
        (false, requested) => Some(acting(&db, &current_user, requested).await?.id),
    };

    let mut select = scoped::<attendance::Entity>(current_user.company_id);
    if let Some(id) = employee_id {
        select = select.filter(attendance::Column::EmployeeId.eq(id));
    }
    if let Some(from) = query.from {
        select = select.filter(attendance::Column::WorkDate.gte(from));
    }
    if let Some(to) = query.to {
        select = select.filter(attendance::Column::WorkDate.lte(to));
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let items = select
        .order_by_desc(attendance::Column::WorkDate)
        .order_by_asc(attendance::Column::EmployeeId)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(Page { items, total })))
}
