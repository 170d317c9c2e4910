//! Employee handlers

use axum::{extract::Query, Extension, Json};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Deserialize;

use crate::entity::employee::{self, EmployeeStatus};
use crate::entity::op_log::OpType;
use crate::entity::{branch, department, user};
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{
    delete_owned, find_owned, paging, unique_violation, IdQuery, IdRequest, Page, UpdateRequest,
};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{find_scoped, scoped, Stamp};
use crate::validate::{self, Validate};

fn default_status() -> EmployeeStatus {
    EmployeeStatus::Active
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRequest {
    pub code: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub branch_id: Option<i64>,
    pub department_id: Option<i64>,
    pub user_id: Option<i64>,
    pub hire_date: NaiveDate,
    #[serde(default = "default_status")]
    pub status: EmployeeStatus,
    pub basic_salary: Decimal,
    #[serde(default)]
    pub allowance: Decimal,
    #[serde(default)]
    pub annual_leave_days: i32,
}

impl Validate for EmployeeRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("code", &self.code, 32)?;
        validate::text("fullName", &self.full_name, 128)?;
        validate::optional_text("email", self.email.as_deref(), 64)?;
        validate::optional_text("phone", self.phone.as_deref(), 32)?;
        validate::optional_text("position", self.position.as_deref(), 64)?;
        validate::non_negative("basicSalary", self.basic_salary)?;
        validate::non_negative("allowance", self.allowance)?;
        if self.annual_leave_days < 0 {
            return Err(AppError::Validation("annualLeaveDays must not be negative".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub branch_id: Option<i64>,
    pub department_id: Option<i64>,
    pub status: Option<EmployeeStatus>,
    /// Matches code or name
    pub keyword: Option<String>,
}

/// Branch, department and login account must belong to the company; a login
/// account serves at most one employee.
async fn check_references<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    req: &EmployeeRequest,
    except: Option<i64>,
) -> AppResult<()> {
    if let Some(id) = req.branch_id {
        if find_scoped::<branch::Entity, _>(db, company_id, id).await?.is_none() {
            return Err(AppError::Validation(format!("branch {} does not exist", id)));
        }
    }
    if let Some(id) = req.department_id {
        if find_scoped::<department::Entity, _>(db, company_id, id).await?.is_none() {
            return Err(AppError::Validation(format!("department {} does not exist", id)));
        }
    }
    if let Some(id) = req.user_id {
        if find_scoped::<user::Entity, _>(db, company_id, id).await?.is_none() {
            return Err(AppError::Validation(format!("user {} does not exist", id)));
        }
        let mut linked = scoped::<employee::Entity>(company_id).filter(employee::Column::UserId.eq(id));
        if let Some(except) = except {
            linked = linked.filter(employee::Column::Id.ne(except));
        }
        if linked.count(db).await? > 0 {
            return Err(AppError::Conflict(format!("user {} is linked to another employee", id)));
        }
    }
    Ok(())
}

/// GET /api/employee/query
pub async fn get_employees(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<EmployeeQuery>,
) -> AppResult<Json<ApiResponse<Page<employee::Model>>>> {
    current_user.require(perm::HR)?;

    let mut select = scoped::<employee::Entity>(current_user.company_id);
    if let Some(id) = query.branch_id {
        select = select.filter(employee::Column::BranchId.eq(id));
    }
    if let Some(id) = query.department_id {
        select = select.filter(employee::Column::DepartmentId.eq(id));
    }
    if let Some(status) = query.status {
        select = select.filter(employee::Column::Status.eq(status));
    }
    if let Some(keyword) = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(employee::Column::Code.contains(keyword))
                .add(employee::Column::FullName.contains(keyword)),
        );
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let items = select
        .order_by_asc(employee::Column::Code)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(Page { items, total })))
}

/// GET /api/employee/info?id=
pub async fn get_employee(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<employee::Model>>> {
    current_user.require(perm::HR)?;
    let found = find_owned::<employee::Entity, _>(&*db, &current_user, query.id, "employee").await?;
    Ok(Json(ApiResponse::success(found)))
}

/// POST /api/employee/add
pub async fn add_employee(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<EmployeeRequest>,
) -> AppResult<Json<ApiResponse<employee::Model>>> {
    current_user.require(perm::HR)?;
    req.validate()?;
    let cid = current_user.company_id;
    check_references(&*db, cid, &req, None).await?;

    let stamp = Stamp::now(current_user.id);
    let result = employee::ActiveModel {
        company_id: Set(cid),
        code: Set(req.code.clone()),
        full_name: Set(req.full_name.clone()),
        email: Set(req.email),
        phone: Set(req.phone),
        position: Set(req.position),
        branch_id: Set(req.branch_id),
        department_id: Set(req.department_id),
        user_id: Set(req.user_id),
        hire_date: Set(req.hire_date),
        status: Set(req.status),
        basic_salary: Set(req.basic_salary),
        allowance: Set(req.allowance),
        annual_leave_days: Set(req.annual_leave_days),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation("employee code"));

    log_outcome(&current_user, OpType::CreateEmployee, &format!("{} {}", req.code, req.full_name), &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/employee/update
pub async fn update_employee(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<EmployeeRequest>>,
) -> AppResult<Json<ApiResponse<employee::Model>>> {
    current_user.require(perm::HR)?;
    req.body.validate()?;
    let cid = current_user.company_id;
    let existing = find_owned::<employee::Entity, _>(&*db, &current_user, req.id, "employee").await?;
    check_references(&*db, cid, &req.body, Some(existing.id)).await?;

    let stamp = Stamp::now(current_user.id);
    let body = req.body;
    let desc = format!("{} {}", body.code, body.full_name);

    let mut active: employee::ActiveModel = existing.into();
    active.code = Set(body.code);
    active.full_name = Set(body.full_name);
    active.email = Set(body.email);
    active.phone = Set(body.phone);
    active.position = Set(body.position);
    active.branch_id = Set(body.branch_id);
    active.department_id = Set(body.department_id);
    active.user_id = Set(body.user_id);
    active.hire_date = Set(body.hire_date);
    active.status = Set(body.status);
    active.basic_salary = Set(body.basic_salary);
    active.allowance = Set(body.allowance);
    active.annual_leave_days = Set(body.annual_leave_days);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);

    let result = active.update(&*db).await.map_err(unique_violation("employee code"));
    log_outcome(&current_user, OpType::UpdateEmployee, &desc, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/employee/delete
pub async fn delete_employee(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::HR)?;
    let result = delete_owned::<employee::Entity, _>(&*db, &current_user, req.id, "employee").await;
    log_outcome(&current_user, OpType::DeleteEmployee, &format!("employee {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, MockDatabase};

    fn request(json: &str) -> EmployeeRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_request_defaults() {
        let req = request(r#"{"code": "E001", "fullName": "Ann Lee", "hireDate": "2024-01-15", "basicSalary": "8800"}"#);
        assert_eq!(req.status, EmployeeStatus::Active);
        assert_eq!(req.allowance, Decimal::ZERO);
        assert_eq!(req.annual_leave_days, 0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_negative_salary_rejected() {
        let req = request(r#"{"code": "E001", "fullName": "Ann", "hireDate": "2024-01-15", "basicSalary": "-1"}"#);
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));

        let req = request(
            r#"{"code": "E001", "fullName": "Ann", "hireDate": "2024-01-15", "basicSalary": "10", "allowance": "-0.01"}"#,
        );
        assert!(req.validate().is_err());
    }

    #[tokio::test]
    async fn test_unknown_branch_rejected_before_write() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<branch::Model>::new()])
            .into_connection();
        let req = request(r#"{"code": "E1", "fullName": "Ann", "hireDate": "2024-01-15", "basicSalary": "1", "branchId": 9}"#);

        let err = check_references(&db, 1, &req, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert_eq!(db.into_transaction_log().len(), 1);
    }
}
