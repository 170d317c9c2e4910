//! User handlers
//!
//! Implements user CRUD operations. Users belong to the company of the
//! administrator who created them; usernames are unique across companies.

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

use crate::entity::op_log::OpType;
use crate::entity::branch;
use crate::entity::user::{self, UserStatus};
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::auth::{hash_password, verify_password};
use crate::handlers::{delete_owned, find_owned, paging, unique_violation, IdRequest, Page};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::permission::{normalize_permissions, PermissionEnforcer};
use crate::routes::ApiResponse;
use crate::scope::{find_scoped, scoped, Stamp};
use crate::state::AppState;
use crate::validate::{self, Validate};

const MIN_PASSWORD_LEN: usize = 6;

fn check_password(field: &str, password: &str) -> AppResult<()> {
    validate::text(field, password, 128)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "{} must be at least {} characters",
            field, MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Direct permissions to store. `tenants` is kept when the user already has it,
/// since it can only be granted at bootstrap.
fn merge_permissions(requested: &[String], current: &[String]) -> Vec<String> {
    let mut list = normalize_permissions(requested);
    if current.iter().any(|p| p == perm::TENANTS) {
        list.push(perm::TENANTS.to_string());
    }
    list
}

/// Add user request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: Option<String>,
    pub branch_id: Option<i64>,
    /// Role name without the company prefix
    pub role: Option<String>,
    pub permissions: Option<Vec<String>>,
}

impl Validate for AddUserRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("username", &self.username, 32)?;
        check_password("password", &self.password)?;
        validate::text("fullName", &self.full_name, 64)?;
        validate::optional_text("email", self.email.as_deref(), 64)
    }
}

/// Update user request. The username is fixed once created.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub id: i64,
    pub full_name: String,
    pub email: Option<String>,
    pub branch_id: Option<i64>,
    pub role: Option<String>,
    pub permissions: Option<Vec<String>>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("fullName", &self.full_name, 64)?;
        validate::optional_text("email", self.email.as_deref(), 64)
    }
}

/// Change password request (user changes their own password)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Reset password request (admin resets user password)
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub id: i64,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub branch_id: Option<i64>,
}

/// User response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub branch_id: Option<i64>,
    pub status: i32,
    pub last_login: i64,
    /// Role name from Casbin
    pub role: Option<String>,
    /// Effective permissions (role and direct)
    pub permissions: Vec<String>,
}

impl UserResponse {
    async fn load(perm_enforcer: &PermissionEnforcer, m: user::Model) -> AppResult<Self> {
        let role = perm_enforcer.get_user_role(m.company_id, &m.username).await?;
        let permissions = perm_enforcer.get_user_permissions(&m.username).await;
        Ok(Self {
            id: m.id,
            username: m.username,
            full_name: m.full_name,
            email: m.email,
            branch_id: m.branch_id,
            status: m.status,
            last_login: m.last_login,
            role,
            permissions,
        })
    }
}

async fn check_branch(db: &DbConn, company_id: i64, branch_id: Option<i64>) -> AppResult<()> {
    let Some(id) = branch_id else {
        return Ok(());
    };
    match find_scoped::<branch::Entity, _>(&**db, company_id, id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::Validation(format!("branch {} does not exist", id))),
    }
}

async fn check_role(perm_enforcer: &PermissionEnforcer, company_id: i64, role: Option<&str>) -> AppResult<()> {
    let Some(role) = role else {
        return Ok(());
    };
    if !perm_enforcer.role_exists(company_id, role).await? {
        return Err(AppError::Validation(format!("role {} does not exist", role)));
    }
    Ok(())
}

/// GET /api/user/query
pub async fn get_users(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ApiResponse<Page<UserResponse>>>> {
    current_user.require(perm::ADMIN)?;

    let mut select = scoped::<user::Entity>(current_user.company_id);
    if let Some(branch_id) = query.branch_id {
        select = select.filter(user::Column::BranchId.eq(branch_id));
    }

    let total = select.clone().count(&*db).await?;
    let (offset, limit) = paging(query.page, query.page_size);
    let users = select
        .order_by_asc(user::Column::Username)
        .offset(offset)
        .limit(limit)
        .all(&*db)
        .await?;

    let mut items = Vec::with_capacity(users.len());
    for u in users {
        items.push(UserResponse::load(&state.perm, u).await?);
    }

    Ok(Json(ApiResponse::success(Page { items, total })))
}

/// POST /api/user/add
pub async fn add_user(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<AddUserRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    current_user.require(perm::ADMIN)?;
    req.validate()?;
    let cid = current_user.company_id;
    check_branch(&db, cid, req.branch_id).await?;
    check_role(&state.perm, cid, req.role.as_deref()).await?;

    let taken = user::Entity::find()
        .filter(user::Column::Username.eq(&req.username))
        .one(&*db)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict(format!("username {} already exists", req.username)));
    }

    let stamp = Stamp::now(current_user.id);
    let result = user::ActiveModel {
        company_id: Set(cid),
        username: Set(req.username.clone()),
        password: Set(hash_password(&req.password)?),
        full_name: Set(req.full_name),
        email: Set(req.email),
        branch_id: Set(req.branch_id),
        status: Set(UserStatus::Inactive.into()),
        last_login: Set(0),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(unique_violation("username"));

    log_outcome(&current_user, OpType::CreateUser, &req.username, &result);
    let new_user = result?;

    state.perm.set_user_role(cid, &new_user.username, req.role.as_deref()).await?;
    if let Some(perms) = &req.permissions {
        let list = normalize_permissions(perms);
        let refs: Vec<&str> = list.iter().map(String::as_str).collect();
        state.perm.set_permissions(&new_user.username, &refs).await?;
    }

    Ok(Json(ApiResponse::success(UserResponse::load(&state.perm, new_user).await?)))
}

/// POST /api/user/update
pub async fn update_user(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    current_user.require(perm::ADMIN)?;
    req.validate()?;
    let cid = current_user.company_id;
    check_branch(&db, cid, req.branch_id).await?;
    check_role(&state.perm, cid, req.role.as_deref()).await?;

    let existing = find_owned::<user::Entity, _>(&*db, &current_user, req.id, "user").await?;
    let username = existing.username.clone();
    let stamp = Stamp::now(current_user.id);

    let mut active: user::ActiveModel = existing.into();
    active.full_name = Set(req.full_name);
    active.email = Set(req.email);
    active.branch_id = Set(req.branch_id);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);

    let result = active.update(&*db).await.map_err(AppError::from);
    log_outcome(&current_user, OpType::UpdateUser, &username, &result);
    let updated = result?;

    state.perm.set_user_role(cid, &username, req.role.as_deref()).await?;
    if let Some(perms) = &req.permissions {
        let current = state.perm.get_user_permissions(&username).await;
        let list = merge_permissions(perms, &current);
        let refs: Vec<&str> = list.iter().map(String::as_str).collect();
        state.perm.set_permissions(&username, &refs).await?;
    }

    Ok(Json(ApiResponse::success(UserResponse::load(&state.perm, updated).await?)))
}

/// POST /api/user/delete
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::ADMIN)?;
    if req.id == current_user.id {
        return Err(AppError::BadRequest("cannot delete yourself".to_string()));
    }

    let target = find_owned::<user::Entity, _>(&*db, &current_user, req.id, "user").await?;
    let result = delete_owned::<user::Entity, _>(&*db, &current_user, target.id, "user").await;
    log_outcome(&current_user, OpType::DeleteUser, &target.username, &result);
    result?;

    state.perm.remove_user(&target.username).await?;
    Ok(Json(ApiResponse::success_msg("success")))
}

async fn set_status(
    db: &DbConn,
    current_user: &CurrentUser,
    id: i64,
    enable: bool,
) -> AppResult<()> {
    current_user.require(perm::ADMIN)?;
    if !enable && id == current_user.id {
        return Err(AppError::BadRequest("cannot disable yourself".to_string()));
    }

    let target = find_owned::<user::Entity, _>(&**db, current_user, id, "user").await?;
    let username = target.username.clone();
    let status = match (enable, target.last_login) {
        (false, _) => UserStatus::Disabled,
        (true, 0) => UserStatus::Inactive,
        (true, _) => UserStatus::Active,
    };
    let stamp = Stamp::now(current_user.id);

    let mut active: user::ActiveModel = target.into();
    active.status = Set(status.into());
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    let result = active.update(&**db).await.map_err(AppError::from);

    let op = if enable { OpType::EnableUser } else { OpType::DisableUser };
    log_outcome(current_user, op, &username, &result);
    result.map(|_| ())
}

/// POST /api/user/enable
pub async fn enable_user(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    set_status(&db, &current_user, req.id, true).await?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/user/disable
pub async fn disable_user(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    set_status(&db, &current_user, req.id, false).await?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/user/change-password
pub async fn change_password(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    check_password("newPassword", &req.new_password)?;

    let me = find_owned::<user::Entity, _>(&*db, &current_user, current_user.id, "user").await?;
    if !verify_password(&req.old_password, &me.password) {
        return Err(AppError::BadRequest("old password is incorrect".to_string()));
    }

    let stamp = Stamp::now(current_user.id);
    let mut active: user::ActiveModel = me.into();
    active.password = Set(hash_password(&req.new_password)?);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    let result = active.update(&*db).await.map_err(AppError::from);

    log_outcome(&current_user, OpType::UpdatePassword, &current_user.username, &result);
    result?;
    Ok(Json(ApiResponse::success_msg("password changed")))
}

/// POST /api/user/reset-password
pub async fn reset_password(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::ADMIN)?;
    check_password("password", &req.password)?;

    let target = find_owned::<user::Entity, _>(&*db, &current_user, req.id, "user").await?;
    let username = target.username.clone();
    let stamp = Stamp::now(current_user.id);

    let mut active: user::ActiveModel = target.into();
    active.password = Set(hash_password(&req.password)?);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    let result = active.update(&*db).await.map_err(AppError::from);

    log_outcome(&current_user, OpType::UpdatePassword, &format!("reset {}", username), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("password reset")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_password() {
        assert!(check_password("password", "secret1").is_ok());
        assert!(matches!(check_password("password", "abc"), Err(AppError::Validation(_))));
        assert!(check_password("password", "").is_err());
    }

    #[test]
    fn test_merge_permissions_keeps_tenants() {
        let requested = vec!["audit".to_string(), "tenants".to_string()];
        assert_eq!(merge_permissions(&requested, &[]), vec!["audit"]);

        let current = vec!["admin".to_string(), "tenants".to_string()];
        assert_eq!(merge_permissions(&requested, &current), vec!["audit", "tenants"]);
    }

    #[test]
    fn test_update_request_ignores_username() {
        let req: UpdateUserRequest = serde_json::from_str(
            r#"{"id": 4, "username": "mallory", "fullName": "Bob", "branchId": 2, "role": "hr"}"#,
        )
        .unwrap();
        assert_eq!(req.id, 4);
        assert_eq!(req.branch_id, Some(2));
        assert!(req.permissions.is_none());
        assert!(req.validate().is_ok());
    }
}
