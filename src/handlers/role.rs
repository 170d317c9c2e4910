//! Role handlers
//!
//! Roles are Casbin subjects scoped to the caller's company.

use axum::{extract::State, response::Json, Extension};
use serde::{Deserialize, Serialize};

use crate::bootstrap::ADMIN_ROLE;
use crate::entity::op_log::OpType;
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::log_outcome;
use crate::middleware::auth::CurrentUser;
use crate::permission::{normalize_permissions, perm, RoleInfo};
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::validate::{self, Validate};

/// Add role request
#[derive(Debug, Deserialize)]
pub struct AddRoleRequest {
    pub name: String,
    pub permissions: Vec<String>,
}

/// Update role request
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub name: String,
    #[serde(rename = "oldName")]
    pub old_name: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRoleRequest {
    pub name: String,
}

fn check_role_name(name: &str) -> AppResult<()> {
    validate::text("name", name, 32)?;
    if name.contains(':') {
        return Err(AppError::Validation("role name must not contain ':'".to_string()));
    }
    Ok(())
}

impl Validate for AddRoleRequest {
    fn validate(&self) -> AppResult<()> {
        check_role_name(&self.name)
    }
}

impl Validate for UpdateRoleRequest {
    fn validate(&self) -> AppResult<()> {
        check_role_name(&self.name)
    }
}

/// Known permissions of a request; a role without any is rejected
fn role_permissions(raw: &[String]) -> AppResult<Vec<String>> {
    let list = normalize_permissions(raw);
    if list.is_empty() {
        return Err(AppError::Validation("at least one permission is required".to_string()));
    }
    Ok(list)
}

/// POST /api/role/add
pub async fn add_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<AddRoleRequest>,
) -> AppResult<Json<ApiResponse<RoleInfo>>> {
    user.require(perm::ADMIN)?;
    req.validate()?;
    let permissions = role_permissions(&req.permissions)?;

    if state.perm.role_exists(user.company_id, &req.name).await? {
        return Err(AppError::Conflict(format!("role {} already exists", req.name)));
    }

    let refs: Vec<&str> = permissions.iter().map(String::as_str).collect();
    let result = state
        .perm
        .create_role(user.company_id, &req.name, &refs)
        .await
        .map_err(AppError::from);
    log_outcome(&user, OpType::CreateRole, &req.name, &result);
    result?;

    Ok(Json(ApiResponse::success(RoleInfo {
        name: req.name,
        permissions,
    })))
}

/// POST /api/role/update
pub async fn update_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<Json<ApiResponse<RoleInfo>>> {
    user.require(perm::ADMIN)?;
    req.validate()?;
    let permissions = role_permissions(&req.permissions)?;
    let old_name = req.old_name.as_deref().unwrap_or(&req.name);

    if !state.perm.role_exists(user.company_id, old_name).await? {
        return Err(AppError::NotFound(format!("role {} not found", old_name)));
    }
    if old_name != req.name {
        if old_name == ADMIN_ROLE {
            return Err(AppError::BadRequest("the admin role cannot be renamed".to_string()));
        }
        if state.perm.role_exists(user.company_id, &req.name).await? {
            return Err(AppError::Conflict(format!("role {} already exists", req.name)));
        }
    }

    let refs: Vec<&str> = permissions.iter().map(String::as_str).collect();
    let result = state
        .perm
        .update_role(user.company_id, old_name, &req.name, &refs)
        .await
        .map_err(AppError::from);
    log_outcome(&user, OpType::UpdateRole, &req.name, &result);
    result?;

    Ok(Json(ApiResponse::success(RoleInfo {
        name: req.name,
        permissions,
    })))
}

/// POST /api/role/delete
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<DeleteRoleRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    user.require(perm::ADMIN)?;

    if req.name == ADMIN_ROLE {
        return Err(AppError::BadRequest("the admin role cannot be deleted".to_string()));
    }
    if !state.perm.role_exists(user.company_id, &req.name).await? {
        return Err(AppError::NotFound(format!("role {} not found", req.name)));
    }

    let result = state
        .perm
        .delete_role(user.company_id, &req.name)
        .await
        .map_err(AppError::from);
    log_outcome(&user, OpType::DeleteRole, &req.name, &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/role/list
pub async fn get_roles(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<RoleInfo>>>> {
    let roles = state.perm.get_all_roles(user.company_id).await?;
    Ok(Json(ApiResponse::success(roles)))
}

#[derive(Debug, Serialize)]
pub struct PermissionInfo {
    pub key: &'static str,
    pub description: &'static str,
}

fn describe(key: &str) -> &'static str {
    match key {
        perm::ADMIN => "Company settings, branches, reference data, users and roles",
        perm::HR => "Departments, employees, attendance, leave and payroll",
        perm::INVENTORY => "Items, warehouses and stock",
        perm::TRADE => "Partners, purchases and sales",
        perm::PROJECT => "Projects",
        perm::AUDIT => "Operation log",
        _ => "",
    }
}

/// GET /api/role/permissions - permissions a role may carry
pub async fn get_available_permissions() -> Json<ApiResponse<Vec<PermissionInfo>>> {
    let permissions = perm::ROLE_ASSIGNABLE
        .iter()
        .map(|&key| PermissionInfo {
            key,
            description: describe(key),
        })
        .collect();
    Json(ApiResponse::success(permissions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_name_rules() {
        assert!(check_role_name("cashier").is_ok());
        assert!(check_role_name("").is_err());
        assert!(check_role_name("role:2:x").is_err());
    }

    #[test]
    fn test_role_permissions_required() {
        assert!(role_permissions(&["bogus".to_string()]).is_err());
        assert_eq!(
            role_permissions(&["trade".to_string(), "hr".to_string()]).unwrap(),
            vec!["hr", "trade"]
        );
    }

    #[tokio::test]
    async fn test_available_permissions_exclude_tenants() {
        let Json(resp) = get_available_permissions().await;
        let data = resp.data.unwrap();
        let keys: Vec<&str> = data.iter().map(|p| p.key).collect();
        assert_eq!(keys.len(), 6);
        assert!(!keys.contains(&perm::TENANTS));
        assert!(data.iter().all(|p| !p.description.is_empty()));
    }
}
