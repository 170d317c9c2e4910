//! Region and city reference data
//!
//! Shared by all companies, so rows are filtered on `deleted_at` by hand
//! instead of going through the tenant scope.

use axum::{extract::Query, Extension, Json};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;

use crate::entity::op_log::OpType;
use crate::entity::{city, region};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{unique_violation, IdRequest, UpdateRequest};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::Stamp;
use crate::validate::{self, Validate};

#[derive(Debug, Deserialize)]
pub struct RegionRequest {
    pub name: String,
    pub code: String,
}

impl Validate for RegionRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("name", &self.name, 64)?;
        validate::text("code", &self.code, 16)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityRequest {
    pub region_id: i64,
    pub name: String,
}

impl Validate for CityRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("name", &self.name, 64)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityQuery {
    pub region_id: Option<i64>,
}

async fn live_region(db: &DbConn, id: i64) -> AppResult<region::Model> {
    region::Entity::find_by_id(id)
        .filter(region::Column::DeletedAt.is_null())
        .one(&**db)
        .await?
        .ok_or_not_found(format!("region {} not found", id))
}

async fn live_city(db: &DbConn, id: i64) -> AppResult<city::Model> {
    city::Entity::find_by_id(id)
        .filter(city::Column::DeletedAt.is_null())
        .one(&**db)
        .await?
        .ok_or_not_found(format!("city {} not found", id))
}

/// GET /api/region/query
pub async fn get_regions(Extension(db): Extension<DbConn>) -> AppResult<Json<ApiResponse<Vec<region::Model>>>> {
    let regions = region::Entity::find()
        .filter(region::Column::DeletedAt.is_null())
        .order_by_asc(region::Column::Name)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(regions)))
}

/// POST /api/region/add
pub async fn add_region(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<RegionRequest>,
) -> AppResult<Json<ApiResponse<region::Model>>> {
    current_user.require(perm::ADMIN)?;
    req.validate()?;
    let stamp = Stamp::now(current_user.id);

    let result = region::ActiveModel {
        name: Set(req.name.clone()),
        code: Set(req.code),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation("region code"));

    log_outcome(&current_user, OpType::CreateReference, &format!("region {}", req.name), &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/region/update
pub async fn update_region(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<RegionRequest>>,
) -> AppResult<Json<ApiResponse<region::Model>>> {
    current_user.require(perm::ADMIN)?;
    req.body.validate()?;
    let stamp = Stamp::now(current_user.id);
    let body = req.body;

    let mut active: region::ActiveModel = live_region(&db, req.id).await?.into();
    active.name = Set(body.name.clone());
    active.code = Set(body.code);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    let result = active.update(&*db).await.map_err(unique_violation("region code"));

    log_outcome(&current_user, OpType::UpdateReference, &format!("region {}", body.name), &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/region/delete
pub async fn delete_region(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::ADMIN)?;

    let region = live_region(&db, req.id).await?;
    let cities = city::Entity::find()
        .filter(city::Column::RegionId.eq(region.id))
        .filter(city::Column::DeletedAt.is_null())
        .count(&*db)
        .await?;
    if cities > 0 {
        return Err(AppError::Conflict(format!("region {} still has {} cities", region.name, cities)));
    }

    let now = Utc::now();
    let mut active: region::ActiveModel = region.into();
    active.deleted_at = Set(Some(now));
    active.deleted_by = Set(Some(current_user.id));
    active.updated_at = Set(now);
    active.updated_by = Set(Some(current_user.id));
    let result = active.update(&*db).await.map_err(AppError::from);

    log_outcome(&current_user, OpType::DeleteReference, &format!("region {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/city/query?regionId=
pub async fn get_cities(
    Extension(db): Extension<DbConn>,
    Query(query): Query<CityQuery>,
) -> AppResult<Json<ApiResponse<Vec<city::Model>>>> {
    let mut select = city::Entity::find().filter(city::Column::DeletedAt.is_null());
    if let Some(region_id) = query.region_id {
        select = select.filter(city::Column::RegionId.eq(region_id));
    }
    let cities = select.order_by_asc(city::Column::Name).all(&*db).await?;
    Ok(Json(ApiResponse::success(cities)))
}

async fn check_region(db: &DbConn, region_id: i64) -> AppResult<()> {
    live_region(db, region_id)
        .await
        .map(|_| ())
        .map_err(|_| AppError::Validation(format!("region {} does not exist", region_id)))
}

/// POST /api/city/add
pub async fn add_city(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<CityRequest>,
) -> AppResult<Json<ApiResponse<city::Model>>> {
    current_user.require(perm::ADMIN)?;
    req.validate()?;
    check_region(&db, req.region_id).await?;
    let stamp = Stamp::now(current_user.id);

    let result = city::ActiveModel {
        region_id: Set(req.region_id),
        name: Set(req.name.clone()),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(AppError::from);

    log_outcome(&current_user, OpType::CreateReference, &format!("city {}", req.name), &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/city/update
pub async fn update_city(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<CityRequest>>,
) -> AppResult<Json<ApiResponse<city::Model>>> {
    current_user.require(perm::ADMIN)?;
    req.body.validate()?;
    check_region(&db, req.body.region_id).await?;
    let stamp = Stamp::now(current_user.id);
    let body = req.body;

    let mut active: city::ActiveModel = live_city(&db, req.id).await?.into();
    active.region_id = Set(body.region_id);
    active.name = Set(body.name.clone());
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    let result = active.update(&*db).await.map_err(AppError::from);

    log_outcome(&current_user, OpType::UpdateReference, &format!("city {}", body.name), &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/city/delete
pub async fn delete_city(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::ADMIN)?;

    let now = Utc::now();
    let mut active: city::ActiveModel = live_city(&db, req.id).await?.into();
    active.deleted_at = Set(Some(now));
    active.deleted_by = Set(Some(current_user.id));
    active.updated_at = Set(now);
    active.updated_by = Set(Some(current_user.id));
    let result = active.update(&*db).await.map_err(AppError::from);

    log_outcome(&current_user, OpType::DeleteReference, &format!("city {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}
