//! Partner handlers - suppliers and customers

use axum::{extract::Query, Extension, Json};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Deserialize;

use crate::entity::op_log::OpType;
use crate::entity::partner::{self, PartnerKind};
use crate::entity::purchase::DocumentStatus;
use crate::entity::{purchase, sale};
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{
    delete_owned, find_owned, paging, unique_violation, IdQuery, IdRequest, Page, UpdateRequest,
};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{scoped, Stamp};
use crate::validate::{self, Validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerRequest {
    pub kind: PartnerKind,
    pub code: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
}

impl Validate for PartnerRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("code", &self.code, 32)?;
        validate::text("name", &self.name, 128)?;
        validate::optional_text("email", self.email.as_deref(), 64)?;
        validate::optional_text("phone", self.phone.as_deref(), 32)?;
        validate::optional_text("taxNumber", self.tax_number.as_deref(), 64)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerQuery {
    pub kind: Option<PartnerKind>,
    /// Matches code or name
    pub keyword: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// Kinds a partner must have to show up under the requested one
fn kind_filter(kind: PartnerKind) -> Vec<PartnerKind> {
    match kind {
        PartnerKind::Both => vec![PartnerKind::Both],
        other => vec![other, PartnerKind::Both],
    }
}

/// Open documents still pointing at the partner
async fn open_documents<C: ConnectionTrait>(db: &C, company_id: i64, partner_id: i64) -> AppResult<u64> {
    let purchases = scoped::<purchase::Entity>(company_id)
        .filter(purchase::Column::PartnerId.eq(partner_id))
        .filter(purchase::Column::Status.ne(DocumentStatus::Cancelled))
        .count(db)
        .await?;
    let sales = scoped::<sale::Entity>(company_id)
        .filter(sale::Column::PartnerId.eq(partner_id))
        .filter(sale::Column::Status.ne(DocumentStatus::Cancelled))
        .count(db)
        .await?;
    Ok(purchases + sales)
}

/// GET /api/partner/query?kind&keyword
pub async fn get_partners(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<PartnerQuery>,
) -> AppResult<Json<ApiResponse<Page<partner::Model>>>> {
    current_user.require(perm::TRADE)?;

    let mut select = scoped::<partner::Entity>(current_user.company_id);
    if let Some(kind) = query.kind {
        select = select.filter(partner::Column::Kind.is_in(kind_filter(kind)));
    }
    if let Some(keyword) = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        select = select.filter(
            Condition::any()
                .add(partner::Column::Code.contains(keyword))
                .add(partner::Column::Name.contains(keyword)),
        );
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let items = select
        .order_by_asc(partner::Column::Code)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(Page { items, total })))
}

/// GET /api/partner/info?id=
pub async fn get_partner(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<IdQuery>,
) -> AppResult<Json<ApiResponse<partner::Model>>> {
    current_user.require(perm::TRADE)?;
    let found = find_owned::<partner::Entity, _>(&*db, &current_user, query.id, "partner").await?;
    Ok(Json(ApiResponse::success(found)))
}

/// POST /api/partner/add
pub async fn add_partner(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<PartnerRequest>,
) -> AppResult<Json<ApiResponse<partner::Model>>> {
    current_user.require(perm::TRADE)?;
    req.validate()?;

    let stamp = Stamp::now(current_user.id);
    let result = partner::ActiveModel {
        company_id: Set(current_user.company_id),
        kind: Set(req.kind),
        code: Set(req.code.clone()),
        name: Set(req.name),
        email: Set(req.email),
        phone: Set(req.phone),
        address: Set(req.address),
        tax_number: Set(req.tax_number),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation("partner code"));

    log_outcome(&current_user, OpType::CreatePartner, &req.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/partner/update
pub async fn update_partner(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<PartnerRequest>>,
) -> AppResult<Json<ApiResponse<partner::Model>>> {
    current_user.require(perm::TRADE)?;
    req.body.validate()?;

    let existing = find_owned::<partner::Entity, _>(&*db, &current_user, req.id, "partner").await?;
    let stamp = Stamp::now(current_user.id);
    let body = req.body;

    let mut active: partner::ActiveModel = existing.into();
    active.kind = Set(body.kind);
    active.code = Set(body.code.clone());
    active.name = Set(body.name);
    active.email = Set(body.email);
    active.phone = Set(body.phone);
    active.address = Set(body.address);
    active.tax_number = Set(body.tax_number);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);

    let result = active.update(&*db).await.map_err(unique_violation("partner code"));
    log_outcome(&current_user, OpType::UpdatePartner, &body.code, &result);
    Ok(Json(ApiResponse::success(result?)))
}

async fn remove_partner(db: &DbConn, current_user: &CurrentUser, id: i64) -> AppResult<()> {
    let found = find_owned::<partner::Entity, _>(&**db, current_user, id, "partner").await?;
    let open = open_documents(&**db, current_user.company_id, found.id).await?;
    if open > 0 {
        return Err(AppError::Conflict(format!(
            "partner {} is used by {} open documents",
            found.code, open
        )));
    }
    delete_owned::<partner::Entity, _>(&**db, current_user, found.id, "partner").await
}

/// POST /api/partner/delete
pub async fn delete_partner(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::TRADE)?;
    let result = remove_partner(&db, &current_user, req.id).await;
    log_outcome(&current_user, OpType::DeletePartner, &format!("partner {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_filter_includes_both() {
        assert_eq!(kind_filter(PartnerKind::Supplier), vec![PartnerKind::Supplier, PartnerKind::Both]);
        assert_eq!(kind_filter(PartnerKind::Customer), vec![PartnerKind::Customer, PartnerKind::Both]);
        assert_eq!(kind_filter(PartnerKind::Both), vec![PartnerKind::Both]);
    }

    #[test]
    fn test_request_kind_lowercase() {
        let req: PartnerRequest =
            serde_json::from_str(r#"{"kind": "customer", "code": "C-01", "name": "Acme"}"#).unwrap();
        assert_eq!(req.kind, PartnerKind::Customer);
        assert!(req.validate().is_ok());

        let bad = serde_json::from_str::<PartnerRequest>(r#"{"kind": "vendor", "code": "C", "name": "A"}"#);
        assert!(bad.is_err());
    }
}
