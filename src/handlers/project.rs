//! Project handlers

use axum::{extract::Query, Extension, Json};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde::Deserialize;

use crate::entity::op_log::OpType;
use crate::entity::branch;
use crate::entity::project::{self, ProjectStatus};
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

fn default_status() -> ProjectStatus {
    ProjectStatus::Planned
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub branch_id: Option<i64>,
    #[serde(default = "default_status")]
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub budget: Decimal,
}

impl Validate for ProjectRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("code", &self.code, 32)?;
        validate::text("name", &self.name, 128)?;
        validate::date_range(self.start_date, self.end_date)?;
        validate::non_negative("budget", self.budget)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
    pub branch_id: Option<i64>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

async fn check_branch(db: &DbConn, company_id: i64, branch_id: Option<i64>) -> AppResult<()> {
    match branch_id {
        Some(id) if find_scoped::<branch::Entity, _>(&**db, company_id, id).await?.is_none() => {
            Err(AppError::Validation(format!("branch {} does not exist", id)))
        }
        _ => Ok(()),
    }
}

/// GET /api/project/query
pub async fn get_projects(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<ProjectQuery>,
) -> AppResult<Json<ApiResponse<Page<project::Model>>>> {
    current_user.require(perm::PROJECT)?;

    let mut select = scoped::<project::Entity>(current_user.company_id);
    if let Some(status) = query.status {
        select = select.filter(project::Column::Status.eq(status));
    }
    if let Some(id) = query.branch_id {
        select = select.filter(project::Column::BranchId.eq(id));
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let items = select
        .order_by_desc(project::Column::Id)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(Page { items, total })))
}

/// GET /api/project/info?id=
pub async fn get_project(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<project::Model>>> {
    current_user.require(perm::PROJECT)?;
    let found = find_owned::<project::Entity, _>(&*db, &current_user, query.id, "project").await?;
    Ok(Json(ApiResponse::success(found)))
}

/// POST /api/project/add
pub async fn add_project(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<ProjectRequest>,
) -> AppResult<Json<ApiResponse<project::Model>>> {
    current_user.require(perm::PROJECT)?;
    req.validate()?;
    check_branch(&db, current_user.company_id, req.branch_id).await?;

    let stamp = Stamp::now(current_user.id);
    let result = project::ActiveModel {
        company_id: Set(current_user.company_id),
        branch_id: Set(req.branch_id),
        code: Set(req.code.clone()),
        name: Set(req.name),
        description: Set(req.description),
        status: Set(req.status),
        start_date: Set(req.start_date),
        end_date: Set(req.end_date),
        budget: Set(req.budget),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation("project code"));

    log_outcome(&current_user, OpType::CreateProject, &req.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/project/update
pub async fn update_project(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<ProjectRequest>>,
) -> AppResult<Json<ApiResponse<project::Model>>> {
    current_user.require(perm::PROJECT)?;
    req.body.validate()?;
    check_branch(&db, current_user.company_id, req.body.branch_id).await?;

    let existing = find_owned::<project::Entity, _>(&*db, &current_user, req.id, "project").await?;
    let stamp = Stamp::now(current_user.id);
    let body = req.body;

    let mut active: project::ActiveModel = existing.into();
    active.branch_id = Set(body.branch_id);
    active.code = Set(body.code.clone());
    active.name = Set(body.name);
    active.description = Set(body.description);
    active.status = Set(body.status);
    active.start_date = Set(body.start_date);
    active.end_date = Set(body.end_date);
    active.budget = Set(body.budget);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);

    let result = active.update(&*db).await.map_err(unique_violation("project code"));
    log_outcome(&current_user, OpType::UpdateProject, &body.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/project/delete
pub async fn delete_project(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::PROJECT)?;
    let result = delete_owned::<project::Entity, _>(&*db, &current_user, req.id, "project").await;
    log_outcome(&current_user, OpType::DeleteProject, &format!("project {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> ProjectRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults() {
        let req = request(r#"{"code": "P-1", "name": "Warehouse fit-out"}"#);
        assert_eq!(req.status, ProjectStatus::Planned);
        assert_eq!(req.budget, Decimal::ZERO);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let req = request(r#"{"code": "P-1", "name": "X", "startDate": "2024-05-01", "endDate": "2024-04-30"}"#);
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_negative_budget_rejected() {
        let req = request(r#"{"code": "P-1", "name": "X", "budget": "-5", "status": "active"}"#);
        assert_eq!(req.status, ProjectStatus::Active);
        assert!(req.validate().is_err());
    }
}
