//! Item handlers
//!
//! `quantityOnHand` is maintained by stock movements only; the update body
//! cannot touch it.

use axum::{extract::Query, Extension, Json};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;

use crate::entity::item;
use crate::entity::op_log::OpType;
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{
    delete_owned, find_owned, paging, unique_violation, IdQuery, IdRequest, Page, UpdateRequest,
};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{scoped, Stamp};
use crate::service::inventory;
use crate::validate::{self, Validate};

fn default_unit() -> String {
    "pcs".to_string()
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub sku: String,
    pub name: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub cost_price: Decimal,
    #[serde(default)]
    pub sale_price: Decimal,
    #[serde(default)]
    pub reorder_level: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl Validate for ItemRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("sku", &self.sku, 64)?;
        validate::text("name", &self.name, 128)?;
        validate::text("unit", &self.unit, 16)?;
        validate::non_negative("costPrice", self.cost_price)?;
        validate::non_negative("salePrice", self.sale_price)?;
        validate::non_negative("reorderLevel", self.reorder_level)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    /// Matches sku or name
    pub keyword: Option<String>,
    pub is_active: Option<bool>,
    /// Only items at or below their reorder level
    #[serde(default)]
    pub low_stock: bool,
}

/// GET /api/item/query
pub async fn get_items(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<ItemQuery>,
) -> AppResult<Json<ApiResponse<Page<item::Model>>>> {
    current_user.require(perm::INVENTORY)?;

    let mut select = scoped::<item::Entity>(current_user.company_id);
    if let Some(keyword) = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(item::Column::Sku.contains(keyword))
                .add(item::Column::Name.contains(keyword)),
        );
    }
    if let Some(active) = query.is_active {
        select = select.filter(item::Column::IsActive.eq(active));
    }
    if query.low_stock {
        select = select.filter(
            Expr::col(item::Column::QuantityOnHand).lte(Expr::col(item::Column::ReorderLevel)),
        );
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let items = select
        .order_by_asc(item::Column::Sku)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(Page { items, total })))
}

/// GET /api/item/info?id=
pub async fn get_item(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<item::Model>>> {
    current_user.require(perm::INVENTORY)?;
    let found = find_owned::<item::Entity, _>(&*db, &current_user, query.id, "item").await?;
    Ok(Json(ApiResponse::success(found)))
}

/// POST /api/item/add
pub async fn add_item(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<ItemRequest>,
) -> AppResult<Json<ApiResponse<item::Model>>> {
    current_user.require(perm::INVENTORY)?;
    req.validate()?;

    let stamp = Stamp::now(current_user.id);
    let result = item::ActiveModel {
        company_id: Set(current_user.company_id),
        sku: Set(req.sku.clone()),
        name: Set(req.name),
        unit: Set(req.unit),
        cost_price: Set(req.cost_price),
        sale_price: Set(req.sale_price),
        reorder_level: Set(req.reorder_level),
        quantity_on_hand: Set(Decimal::ZERO),
        is_active: Set(req.is_active),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation("item sku"));

    log_outcome(&current_user, OpType::CreateItem, &req.sku, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/item/update
pub async fn update_item(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<ItemRequest>>,
) -> AppResult<Json<ApiResponse<item::Model>>> {
    current_user.require(perm::INVENTORY)?;
    req.body.validate()?;

    let existing = find_owned::<item::Entity, _>(&*db, &current_user, req.id, "item").await?;
    let stamp = Stamp::now(current_user.id);
    let body = req.body;

    let mut active: item::ActiveModel = existing.into();
    active.sku = Set(body.sku.clone());
    active.name = Set(body.name);
    active.unit = Set(body.unit);
    active.cost_price = Set(body.cost_price);
    active.sale_price = Set(body.sale_price);
    active.reorder_level = Set(body.reorder_level);
    active.is_active = Set(body.is_active);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);

    let result = active.update(&*db).await.map_err(unique_violation("item sku"));
    log_outcome(&current_user, OpType::UpdateItem, &body.sku, &result);
    Ok(Json(ApiResponse::success(result?)))
}

async fn remove_item(db: &DbConn, current_user: &CurrentUser, id: i64) -> AppResult<()> {
    let found = find_owned::<item::Entity, _>(&**db, current_user, id, "item").await?;
    if inventory::has_stock(&**db, current_user.company_id, Some(found.id), None).await? {
        return Err(AppError::Conflict(format!("item {} still has stock", found.sku)));
    }
    delete_owned::<item::Entity, _>(&**db, current_user, found.id, "item").await
}

/// POST /api/item/delete - only once no warehouse holds any of it
pub async fn delete_item(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::INVENTORY)?;
    let result = remove_item(&db, &current_user, req.id).await;

    log_outcome(&current_user, OpType::DeleteItem, &format!("item {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> ItemRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults() {
        let req = request(r#"{"sku": "BOLT-M8", "name": "Bolt M8"}"#);
        assert_eq!(req.unit, "pcs");
        assert!(req.is_active);
        assert_eq!(req.reorder_level, Decimal::ZERO);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_negative_price_rejected() {
        let req = request(r#"{"sku": "BOLT-M8", "name": "Bolt", "salePrice": "-1"}"#);
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_query_low_stock_flag() {
        let query: ItemQuery = serde_json::from_str(r#"{"lowStock": true}"#).unwrap();
        assert!(query.low_stock);
        assert!(query.keyword.is_none());
    }
}
