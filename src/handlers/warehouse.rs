//! Warehouse handlers

use axum::{extract::Query, Extension, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::entity::op_log::OpType;
use crate::entity::{branch, warehouse};
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{delete_owned, find_owned, unique_violation, IdRequest, UpdateRequest};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{find_scoped, scoped, Stamp};
use crate::service::inventory;
use crate::validate::{self, Validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseRequest {
    pub code: String,
    pub name: String,
    pub branch_id: Option<i64>,
    pub address: Option<String>,
}

impl Validate for WarehouseRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("code", &self.code, 32)?;
        validate::text("name", &self.name, 128)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseQuery {
    pub branch_id: Option<i64>,
}

async fn check_branch(db: &DbConn, company_id: i64, branch_id: Option<i64>) -> AppResult<()> {
    match branch_id {
        Some(id) if find_scoped::<branch::Entity, _>(&**db, company_id, id).await?.is_none() => {
            Err(AppError::Validation(format!("branch {} does not exist", id)))
        }
        _ => Ok(()),
    }
}

/// GET /api/warehouse/query?branchId
pub async fn get_warehouses(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<WarehouseQuery>,
) -> AppResult<Json<ApiResponse<Vec<warehouse::Model>>>> {
    current_user.require(perm::INVENTORY)?;

    let mut select = scoped::<warehouse::Entity>(current_user.company_id);
    if let Some(id) = query.branch_id {
        select = select.filter(warehouse::Column::BranchId.eq(id));
    }
    let warehouses = select.order_by_asc(warehouse::Column::Code).all(&*db).await?;
    Ok(Json(ApiResponse::success(warehouses)))
}

/// POST /api/warehouse/add
pub async fn add_warehouse(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<WarehouseRequest>,
) -> AppResult<Json<ApiResponse<warehouse::Model>>> {
    current_user.require(perm::INVENTORY)?;
    req.validate()?;
    check_branch(&db, current_user.company_id, req.branch_id).await?;

    let stamp = Stamp::now(current_user.id);
    let result = warehouse::ActiveModel {
        company_id: Set(current_user.company_id),
        branch_id: Set(req.branch_id),
        code: Set(req.code.clone()),
        name: Set(req.name),
        address: Set(req.address),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation("warehouse code"));

    log_outcome(&current_user, OpType::CreateWarehouse, &req.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/warehouse/update
pub async fn update_warehouse(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<WarehouseRequest>>,
) -> AppResult<Json<ApiResponse<warehouse::Model>>> {
    current_user.require(perm::INVENTORY)?;
    req.body.validate()?;
    check_branch(&db, current_user.company_id, req.body.branch_id).await?;

    let existing = find_owned::<warehouse::Entity, _>(&*db, &current_user, req.id, "warehouse").await?;
    let stamp = Stamp::now(current_user.id);
    let body = req.body;

    let mut active: warehouse::ActiveModel = existing.into();
    active.branch_id = Set(body.branch_id);
    active.code = Set(body.code.clone());
    active.name = Set(body.name);
    active.address = Set(body.address);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);

    let result = active.update(&*db).await.map_err(unique_violation("warehouse code"));
    log_outcome(&current_user, OpType::UpdateWarehouse, &body.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

async fn remove_warehouse(db: &DbConn, current_user: &CurrentUser, id: i64) -> AppResult<()> {
    let found = find_owned::<warehouse::Entity, _>(&**db, current_user, id, "warehouse").await?;
    if inventory::has_stock(&**db, current_user.company_id, None, Some(found.id)).await? {
        return Err(AppError::Conflict(format!("warehouse {} still holds stock", found.code)));
    }
    delete_owned::<warehouse::Entity, _>(&**db, current_user, found.id, "warehouse").await
}

/// POST /api/warehouse/delete - empty warehouses only
pub async fn delete_warehouse(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::INVENTORY)?;
    let result = remove_warehouse(&db, &current_user, req.id).await;
    log_outcome(&current_user, OpType::DeleteWarehouse, &format!("warehouse {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}
