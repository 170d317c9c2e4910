//! Company handlers

use axum::{extract::State, Extension, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Deserialize;

use crate::bootstrap::{self, NewAdmin, NewCompany};
use crate::entity::company;
use crate::entity::op_log::OpType;
use crate::error::{AppResult, OptionExt};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::unique_violation;
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::Stamp;
use crate::state::AppState;
use crate::validate::{self, Validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRequest {
    pub name: String,
    pub code: String,
    pub currency: String,
    pub tax_number: Option<String>,
    pub address: Option<String>,
}

impl Validate for CompanyRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("name", &self.name, 128)?;
        validate::text("code", &self.code, 32)?;
        validate::text("currency", &self.currency, 3)?;
        validate::optional_text("taxNumber", self.tax_number.as_deref(), 64)?;
        validate::optional_text("address", self.address.as_deref(), 255)
    }
}

/// New tenant with its first administrator
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCompanyRequest {
    #[serde(flatten)]
    pub company: CompanyRequest,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_full_name: Option<String>,
}

impl Validate for AddCompanyRequest {
    fn validate(&self) -> AppResult<()> {
        self.company.validate()?;
        validate::text("adminUsername", &self.admin_username, 64)?;
        validate::text("adminPassword", &self.admin_password, 128)
    }
}

async fn current(db: &DbConn, company_id: i64) -> AppResult<company::Model> {
    company::Entity::find_by_id(company_id)
        .filter(company::Column::DeletedAt.is_null())
        .one(&**db)
        .await?
        .ok_or_not_found("company not found")
}

/// GET /api/company/current
pub async fn current_company(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<company::Model>>> {
    let company = current(&db, current_user.company_id).await?;
    Ok(Json(ApiResponse::success(company)))
}

/// POST /api/company/update
pub async fn update_company(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<CompanyRequest>,
) -> AppResult<Json<ApiResponse<company::Model>>> {
    current_user.require(perm::ADMIN)?;
    req.validate()?;

    let stamp = Stamp::now(current_user.id);
    let mut active: company::ActiveModel = current(&db, current_user.company_id).await?.into();
    active.name = Set(req.name.clone());
    active.code = Set(req.code);
    active.currency = Set(req.currency);
    active.tax_number = Set(req.tax_number);
    active.address = Set(req.address);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);

    let result = active.update(&*db).await.map_err(unique_violation("company name"));
    log_outcome(&current_user, OpType::UpdateCompany, &req.name, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/company/add
pub async fn add_company(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<AddCompanyRequest>,
) -> AppResult<Json<ApiResponse<company::Model>>> {
    current_user.require(perm::TENANTS)?;
    req.validate()?;

    let desc = format!("{} (admin {})", req.company.name, req.admin_username);
    let new_company = NewCompany {
        name: req.company.name,
        code: req.company.code,
        currency: req.company.currency,
        tax_number: req.company.tax_number,
        address: req.company.address,
    };
    let admin = NewAdmin {
        full_name: req.admin_full_name.unwrap_or_else(|| req.admin_username.clone()),
        username: req.admin_username,
        password: req.admin_password,
    };

    let result = bootstrap::provision_company(
        &*state.db,
        &state.perm,
        new_company,
        admin,
        Stamp::now(current_user.id),
    )
    .await;
    log_outcome(&current_user, OpType::CreateCompany, &desc, &result);
    let (company, _) = result?;
    Ok(Json(ApiResponse::success(company)))
}
