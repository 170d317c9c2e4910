//! Branch handlers

use axum::{Extension, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::entity::op_log::OpType;
use crate::entity::{branch, city, employee, warehouse};
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{delete_owned, find_owned, unique_violation, IdRequest, UpdateRequest};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{scoped, Stamp};
use crate::validate::{self, Validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRequest {
    pub code: String,
    pub name: String,
    pub city_id: Option<i64>,
    pub address: Option<String>,
    #[serde(default)]
    pub is_head_office: bool,
}

impl Validate for BranchRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("code", &self.code, 32)?;
        validate::text("name", &self.name, 128)?;
        validate::optional_text("address", self.address.as_deref(), 255)
    }
}

async fn check_city(db: &DbConn, city_id: Option<i64>) -> AppResult<()> {
    let Some(id) = city_id else {
        return Ok(());
    };
    city::Entity::find_by_id(id)
        .filter(city::Column::DeletedAt.is_null())
        .one(&**db)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::Validation(format!("city {} does not exist", id)))
}

/// POST /api/branch/add
pub async fn add_branch(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<BranchRequest>,
) -> AppResult<Json<ApiResponse<branch::Model>>> {
    current_user.require(perm::ADMIN)?;
    req.validate()?;
    check_city(&db, req.city_id).await?;

    let stamp = Stamp::now(current_user.id);
    let result = branch::ActiveModel {
        company_id: Set(current_user.company_id),
        code: Set(req.code.clone()),
        name: Set(req.name),
        city_id: Set(req.city_id),
        address: Set(req.address),
        is_head_office: Set(req.is_head_office),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation("branch code"));

    log_outcome(&current_user, OpType::CreateBranch, &req.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/branch/update
pub async fn update_branch(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<BranchRequest>>,
) -> AppResult<Json<ApiResponse<branch::Model>>> {
    current_user.require(perm::ADMIN)?;
    req.body.validate()?;
    check_city(&db, req.body.city_id).await?;

    let existing = find_owned::<branch::Entity, _>(&*db, &current_user, req.id, "branch").await?;
    let stamp = Stamp::now(current_user.id);
    let body = req.body;

    let mut active: branch::ActiveModel = existing.into();
    active.code = Set(body.code.clone());
    active.name = Set(body.name);
    active.city_id = Set(body.city_id);
    active.address = Set(body.address);
    active.is_head_office = Set(body.is_head_office);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);

    let result = active.update(&*db).await.map_err(unique_violation("branch code"));
    log_outcome(&current_user, OpType::UpdateBranch, &body.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/branch/delete
pub async fn delete_branch(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::ADMIN)?;
    let cid = current_user.company_id;

    let warehouses = scoped::<warehouse::Entity>(cid)
        .filter(warehouse::Column::BranchId.eq(req.id))
        .count(&*db)
        .await?;
    let employees = scoped::<employee::Entity>(cid)
        .filter(employee::Column::BranchId.eq(req.id))
        .count(&*db)
        .await?;
    if warehouses > 0 || employees > 0 {
        return Err(AppError::Conflict(format!(
            "branch has {} warehouses and {} employees",
            warehouses, employees
        )));
    }

    let result = delete_owned::<branch::Entity, _>(&*db, &current_user, req.id, "branch").await;
    log_outcome(&current_user, OpType::DeleteBranch, &format!("branch {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/branch/query
pub async fn get_branches(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<branch::Model>>>> {
    let branches = scoped::<branch::Entity>(current_user.company_id)
        .order_by_asc(branch::Column::Code)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(branches)))
}
