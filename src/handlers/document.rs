//! Purchase and sale document handlers
//!
//! One set of handlers serves both kinds; the router picks the kind with
//! [`DocumentTable`]. Workflow and stock posting live in
//! [`crate::service::document`].

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use sea_orm::{ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};

use crate::entity::op_log::OpType;
use crate::entity::purchase::DocumentStatus;
use crate::error::AppResult;
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{paging, IdQuery, IdRequest, Page, UpdateRequest};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{scoped, Stamp};
use crate::service::document::{self as service, Detail, DocumentInput, DocumentTable, LineOf};
use crate::state::AppState;
use crate::validate::{self, Validate};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    pub status: Option<DocumentStatus>,
    pub partner_id: Option<i64>,
    pub warehouse_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

fn describe<D: DocumentTable>(id: i64) -> String {
    format!("{} {}", D::KIND.label(), id)
}

/// GET /api/{purchase,sale}/query
pub async fn get_documents<D>(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<DocumentQuery>,
) -> AppResult<Json<ApiResponse<Page<D::Model>>>>
where
    D: DocumentTable,
    D::Model: Serialize + Sync,
{
    current_user.require(perm::TRADE)?;
    validate::date_range(query.from, query.to)?;

    let cols = D::columns();
    let mut select = scoped::<D>(current_user.company_id);
    if let Some(status) = query.status {
        select = select.filter(cols.status.eq(status));
    }
    if let Some(id) = query.partner_id {
        select = select.filter(cols.partner.eq(id));
    }
    if let Some(id) = query.warehouse_id {
        select = select.filter(cols.warehouse.eq(id));
    }
    if let Some(from) = query.from {
        select = select.filter(cols.doc_date.gte(from));
    }
    if let Some(to) = query.to {
        select = select.filter(cols.doc_date.lte(to));
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let items = select
        .order_by_desc(cols.doc_date)
        .order_by_desc(cols.number)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(Page { items, total })))
}

/// GET /api/{purchase,sale}/info?id=
pub async fn get_document<D>(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<Detail<D>>>>
where
    D: DocumentTable,
    D::Model: Serialize,
    LineOf<D>: Serialize,
{
    current_user.require(perm::TRADE)?;
    let detail = service::detail::<D, _>(&*db, current_user.company_id, query.id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// POST /api/{purchase,sale}/add - creates a numbered draft
pub async fn add_document<D>(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<DocumentInput>,
) -> AppResult<Json<ApiResponse<Detail<D>>>>
where
    D: DocumentTable,
    D::Model: IntoActiveModel<D::Active> + Serialize,
    LineOf<D>: IntoActiveModel<D::ActiveLine> + Serialize,
{
    current_user.require(perm::TRADE)?;
    req.validate()?;

    let result = service::create::<D>(&*state.db, current_user.company_id, &req, Stamp::now(current_user.id)).await;
    let desc = match &result {
        Ok(detail) => format!("{} partner {}", D::head(&detail.header).number, req.partner_id),
        Err(_) => format!("{} with partner {}", D::KIND.label(), req.partner_id),
    };
    log_outcome(&current_user, OpType::CreateDocument, &desc, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/{purchase,sale}/update - drafts only, lines are replaced
pub async fn update_document<D>(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<DocumentInput>>,
) -> AppResult<Json<ApiResponse<Detail<D>>>>
where
    D: DocumentTable,
    D::Model: IntoActiveModel<D::Active> + Serialize,
    LineOf<D>: IntoActiveModel<D::ActiveLine> + Serialize,
{
    current_user.require(perm::TRADE)?;
    req.body.validate()?;

    let result = service::update::<D>(
        &*state.db,
        current_user.company_id,
        req.id,
        &req.body,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(&current_user, OpType::UpdateDocument, &describe::<D>(req.id), &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/{purchase,sale}/delete - drafts only
pub async fn delete_document<D: DocumentTable>(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::TRADE)?;

    let result = service::delete::<D>(&*state.db, current_user.company_id, req.id, Stamp::now(current_user.id)).await;
    log_outcome(&current_user, OpType::DeleteDocument, &describe::<D>(req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/{purchase,sale}/confirm - posts every line to stock
pub async fn confirm_document<D>(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<<D as EntityTrait>::Model>>>
where
    D: DocumentTable,
    D::Model: IntoActiveModel<D::Active> + Serialize,
{
    current_user.require(perm::TRADE)?;

    let result = service::confirm::<D>(
        &*state.db,
        current_user.company_id,
        req.id,
        state.config.inventory.allow_negative_stock,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(&current_user, OpType::ConfirmDocument, &describe::<D>(req.id), &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/{purchase,sale}/cancel - a confirmed document reverses its stock
pub async fn cancel_document<D>(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<<D as EntityTrait>::Model>>>
where
    D: DocumentTable,
    D::Model: IntoActiveModel<D::Active> + Serialize,
{
    current_user.require(perm::TRADE)?;

    let result = service::cancel::<D>(
        &*state.db,
        current_user.company_id,
        req.id,
        state.config.inventory.allow_negative_stock,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(&current_user, OpType::CancelDocument, &describe::<D>(req.id), &result);
    Ok(Json(ApiResponse::success(result?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{purchase, sale};
    use rust_decimal::Decimal;

    #[test]
    fn test_update_body_flattens_document() {
        let req: UpdateRequest<DocumentInput> = serde_json::from_str(
            r#"{"id": 7, "partnerId": 2, "warehouseId": 1, "docDate": "2024-03-01",
                "lines": [{"itemId": 5, "quantity": "10", "unitPrice": "2.50", "taxRate": "10"}]}"#,
        )
        .unwrap();
        assert_eq!(req.id, 7);
        assert_eq!(req.body.lines.len(), 1);
        assert_eq!(req.body.lines[0].unit_price, Decimal::new(250, 2));
        assert!(req.body.validate().is_ok());
    }

    #[test]
    fn test_document_without_lines_rejected() {
        let req: DocumentInput =
            serde_json::from_str(r#"{"partnerId": 2, "warehouseId": 1, "docDate": "2024-03-01", "lines": []}"#)
                .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_query_filters() {
        let query: DocumentQuery =
            serde_json::from_str(r#"{"status": "confirmed", "partnerId": 4, "from": "2024-01-01"}"#).unwrap();
        assert_eq!(query.status, Some(DocumentStatus::Confirmed));
        assert_eq!(query.partner_id, Some(4));
        assert!(validate::date_range(query.from, query.to).is_ok());
    }

    #[test]
    fn test_tax_rate_above_hundred_rejected() {
        let req: DocumentInput = serde_json::from_str(
            r#"{"partnerId": 2, "warehouseId": 1, "docDate": "2024-03-01",
                "lines": [{"itemId": 5, "quantity": "1", "unitPrice": "9", "taxRate": "101"}]}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_oversized_amounts_rejected() {
        let req: DocumentInput = serde_json::from_str(
            r#"{"partnerId": 2, "warehouseId": 1, "docDate": "2024-03-01",
                "lines": [{"itemId": 5, "quantity": "100000000000000000000", "unitPrice": "100000000000000000000"}]}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_audit_descriptions_name_the_kind() {
        assert_eq!(describe::<purchase::Entity>(4), "purchase 4");
        assert_eq!(describe::<sale::Entity>(9), "sale 9");
    }
}
