//! Stock handlers
//!
//! Manual movements, balance lookups, the movement ledger and reconciliation.
//! Document-driven movements are posted by the purchase and sale services.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Deserialize;

use crate::entity::op_log::OpType;
use crate::entity::stock_balance;
use crate::entity::stock_movement::{self, MovementType, ReferenceType};
use crate::error::AppResult;
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{paging, Page};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::Stamp;
use crate::service::inventory::{self, Movement, ReconcileReport};
use crate::state::AppState;
use crate::validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub item_id: i64,
    pub warehouse_id: i64,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub to_warehouse_id: Option<i64>,
    pub note: Option<String>,
}

impl MoveRequest {
    fn movement(&self) -> Movement {
        Movement {
            to_warehouse_id: self.to_warehouse_id,
            note: self.note.clone(),
            ..Movement::manual(self.item_id, self.warehouse_id, self.movement_type, self.quantity)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub item_id: Option<i64>,
    pub warehouse_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementQuery {
    pub item_id: Option<i64>,
    pub warehouse_id: Option<i64>,
    pub movement_type: Option<MovementType>,
    pub reference_type: Option<ReferenceType>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileQuery {
    #[serde(default)]
    pub fix: bool,
}

/// POST /api/stock/move
pub async fn move_stock(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<MoveRequest>,
) -> AppResult<Json<ApiResponse<stock_movement::Model>>> {
    current_user.require(perm::INVENTORY)?;
    validate::optional_text("note", req.note.as_deref(), 255)?;
    let movement = req.movement();
    movement.check()?;

    let result = inventory::move_stock(
        &*state.db,
        current_user.company_id,
        &movement,
        state.config.inventory.allow_negative_stock,
        Stamp::now(current_user.id),
    )
    .await;
    let desc = match movement.to_warehouse_id {
        Some(to) => format!(
            "{:?} {} x item {} from warehouse {} to {}",
            movement.movement_type, movement.quantity, movement.item_id, movement.warehouse_id, to
        ),
        None => format!(
            "{:?} {} x item {} in warehouse {}",
            movement.movement_type, movement.quantity, movement.item_id, movement.warehouse_id
        ),
    };
    log_outcome(&current_user, OpType::StockMove, &desc, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// GET /api/stock/balance?itemId&warehouseId
pub async fn get_balances(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<BalanceQuery>,
) -> AppResult<Json<ApiResponse<Vec<stock_balance::Model>>>> {
    current_user.require(perm::INVENTORY)?;
    let rows = inventory::balances(&*db, current_user.company_id, query.item_id, query.warehouse_id).await?;
    Ok(Json(ApiResponse::success(rows)))
}

/// GET /api/stock/movements - newest first
pub async fn get_movements(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<MovementQuery>,
) -> AppResult<Json<ApiResponse<Page<stock_movement::Model>>>> {
    current_user.require(perm::INVENTORY)?;

    let mut select = stock_movement::Entity::find()
        .filter(stock_movement::Column::CompanyId.eq(current_user.company_id));
    if let Some(id) = query.item_id {
        select = select.filter(stock_movement::Column::ItemId.eq(id));
    }
    if let Some(id) = query.warehouse_id {
        // A transfer shows up on both of its warehouses
        select = select.filter(
            stock_movement::Column::WarehouseId
                .eq(id)
                .or(stock_movement::Column::ToWarehouseId.eq(id)),
        );
    }
    if let Some(kind) = query.movement_type {
        select = select.filter(stock_movement::Column::MovementType.eq(kind));
    }
    if let Some(kind) = query.reference_type {
        select = select.filter(stock_movement::Column::ReferenceType.eq(kind));
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let items = select
        .order_by_desc(stock_movement::Column::Id)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(Page { items, total })))
}

/// GET /api/stock/reconcile?fix=true
pub async fn reconcile(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<ReconcileQuery>,
) -> AppResult<Json<ApiResponse<ReconcileReport>>> {
    current_user.require(perm::INVENTORY)?;

    let result = inventory::reconcile(
        &*state.db,
        current_user.company_id,
        query.fix,
        Stamp::now(current_user.id),
    )
    .await;
    let desc = if query.fix { "check and fix" } else { "check" };
    log_outcome(&current_user, OpType::StockReconcile, desc, &result);
    let report = result?;

    if !report.discrepancies.is_empty() {
        tracing::warn!(
            "Stock reconcile for company {} found {} discrepancies",
            current_user.company_id,
            report.discrepancies.len()
        );
    }
    Ok(Json(ApiResponse::success(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn request(json: &str) -> MoveRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_transfer_request_builds_movement() {
        let req = request(
            r#"{"itemId": 3, "warehouseId": 1, "toWarehouseId": 2, "movementType": "transfer", "quantity": "5", "note": "rebalance"}"#,
        );
        let movement = req.movement();
        assert_eq!(movement.movement_type, MovementType::Transfer);
        assert_eq!(movement.to_warehouse_id, Some(2));
        assert_eq!(movement.reference_type, ReferenceType::Manual);
        assert_eq!(movement.note.as_deref(), Some("rebalance"));
        assert!(movement.check().is_ok());
    }

    #[test]
    fn test_transfer_without_destination_rejected() {
        let req = request(r#"{"itemId": 3, "warehouseId": 1, "movementType": "transfer", "quantity": "5"}"#);
        assert!(matches!(req.movement().check(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_negative_adjustment_allowed() {
        let req = request(r#"{"itemId": 3, "warehouseId": 1, "movementType": "adjustment", "quantity": "-2"}"#);
        assert!(req.movement().check().is_ok());
    }

    #[test]
    fn test_reconcile_query_defaults_to_check_only() {
        let query: ReconcileQuery = serde_json::from_str("{}").unwrap();
        assert!(!query.fix);
    }
}
