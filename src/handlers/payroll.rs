//! Payroll handlers
//!
//! Every payroll operation requires `hr`. Calculation lives in
//! [`crate::service::payroll`].

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use sea_orm::{ColumnTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::entity::op_log::OpType;
use crate::entity::payroll_record::{self, PayrollStatus};
use crate::entity::{branch, payroll_data};
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{find_owned, IdQuery, IdRequest};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{find_scoped, scoped, Stamp};
use crate::service::payroll::{self, RunPayroll};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PayrollQuery {
    pub year: Option<i32>,
    pub status: Option<PayrollStatus>,
}

/// Header with its lines
#[derive(Debug, Serialize)]
pub struct PayrollDetail {
    #[serde(flatten)]
    pub record: payroll_record::Model,
    pub lines: Vec<payroll_data::Model>,
}

fn period(record: &payroll_record::Model) -> String {
    format!("{}-{:02}", record.period_year, record.period_month)
}

/// POST /api/payroll/run
pub async fn run_payroll(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<RunPayroll>,
) -> AppResult<Json<ApiResponse<payroll_record::Model>>> {
    current_user.require(perm::HR)?;
    let cid = current_user.company_id;
    if let Some(id) = req.branch_id {
        if find_scoped::<branch::Entity, _>(&*state.db, cid, id).await?.is_none() {
            return Err(AppError::Validation(format!("branch {} does not exist", id)));
        }
    }

    let result = payroll::run(
        &*state.db,
        &state.config.payroll,
        cid,
        &req,
        Stamp::now(current_user.id),
    )
    .await;
    let desc = match req.branch_id {
        Some(b) => format!("{}-{:02} branch {}", req.year, req.month, b),
        None => format!("{}-{:02}", req.year, req.month),
    };
    log_outcome(&current_user, OpType::RunPayroll, &desc, &result);
    let record = result?;

    tracing::info!(
        "Payroll {} for company {}: {} employees, net {}",
        period(&record), cid, record.employee_count, record.total_net
    );
    Ok(Json(ApiResponse::success(record)))
}

/// POST /api/payroll/recalculate - rebuild the lines of a draft
pub async fn recalculate_payroll(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<payroll_record::Model>>> {
    current_user.require(perm::HR)?;

    let result = payroll::recalculate(
        &*state.db,
        &state.config.payroll,
        current_user.company_id,
        req.id,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(&current_user, OpType::RecalculatePayroll, &format!("payroll {}", req.id), &result);
    Ok(Json(ApiResponse::success(result?)))
}

async fn transition(
    state: &AppState,
    current_user: &CurrentUser,
    id: i64,
    to: PayrollStatus,
    op: OpType,
) -> AppResult<payroll_record::Model> {
    current_user.require(perm::HR)?;
    let result = payroll::set_status(
        &*state.db,
        current_user.company_id,
        id,
        to,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(current_user, op, &format!("payroll {}", id), &result);
    result
}

/// POST /api/payroll/approve
pub async fn approve_payroll(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<payroll_record::Model>>> {
    let record = transition(&state, &current_user, req.id, PayrollStatus::Approved, OpType::ApprovePayroll).await?;
    Ok(Json(ApiResponse::success(record)))
}

/// POST /api/payroll/pay
pub async fn pay_payroll(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<payroll_record::Model>>> {
    let record = transition(&state, &current_user, req.id, PayrollStatus::Paid, OpType::PayPayroll).await?;
    Ok(Json(ApiResponse::success(record)))
}

/// POST /api/payroll/delete - drafts only
pub async fn delete_payroll(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::HR)?;

    let result = payroll::delete(&*state.db, current_user.company_id, req.id, Stamp::now(current_user.id)).await;
    log_outcome(&current_user, OpType::DeletePayroll, &format!("payroll {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/payroll/query?year&status
pub async fn get_payrolls(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<PayrollQuery>,
) -> AppResult<Json<ApiResponse<Vec<payroll_record::Model>>>> {
    current_user.require(perm::HR)?;

    let mut select = scoped::<payroll_record::Entity>(current_user.company_id);
    if let Some(year) = query.year {
        select = select.filter(payroll_record::Column::PeriodYear.eq(year));
    }
    if let Some(status) = query.status {
        select = select.filter(payroll_record::Column::Status.eq(status));
    }

    let records = select
        .order_by_desc(payroll_record::Column::PeriodYear)
        .order_by_desc(payroll_record::Column::PeriodMonth)
        .order_by_asc(payroll_record::Column::BranchId)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(records)))
}

/// GET /api/payroll/info?id=
pub async fn get_payroll(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<PayrollDetail>>> {
    current_user.require(perm::HR)?;

    let record = find_owned::<payroll_record::Entity, _>(&*db, &current_user, query.id, "payroll record").await?;
    let lines = payroll::lines(&*db, &record).await?;
    Ok(Json(ApiResponse::success(PayrollDetail { record, lines })))
}
