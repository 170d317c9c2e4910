//! Authentication handlers
//!
//! Implements login, logout, bearer token and current user endpoints

use axum::{extract::State, Extension, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::entity::op_log::{OpResult, OpType};
use crate::entity::user::{self, UserStatus};
use crate::error::{AppError, AppResult};
use crate::handlers::audit::service::{log_anonymous, log_operation};
use crate::middleware::auth::{issue_token, CurrentUser, SESSION_TIMESTAMP_KEY, SESSION_USER_KEY};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::state::AppState;

/// bcrypt cost for stored passwords
const PASSWORD_COST: u32 = 12;

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, PASSWORD_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Bearer token response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: i64,
}

/// Current user response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    pub id: i64,
    pub company_id: i64,
    pub username: String,
    pub full_name: String,
    pub branch_id: Option<i64>,
    pub permissions: Vec<String>,
}

/// Check credentials and return the live, enabled user
async fn authenticate(db: &DbConn, req: &LoginRequest, op_type: OpType) -> AppResult<user::Model> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("username and password are required".to_string()));
    }

    let found = user::Entity::find()
        .filter(user::Column::Username.eq(&req.username))
        .filter(user::Column::DeletedAt.is_null())
        .one(&**db)
        .await?;

    let Some(db_user) = found else {
        tracing::warn!("Login failed: user not found - {}", req.username);
        return Err(AppError::Unauthorized);
    };

    if !verify_password(&req.password, &db_user.password) {
        tracing::warn!("Login failed: wrong password - {}", req.username);
        log_anonymous(db_user.company_id, &req.username, op_type, "wrong password", OpResult::Failed);
        return Err(AppError::Unauthorized);
    }

    if db_user.is_disabled() {
        tracing::warn!("Login failed: user disabled - {}", req.username);
        log_anonymous(db_user.company_id, &req.username, op_type, "user is disabled", OpResult::Failed);
        return Err(AppError::Forbidden);
    }

    Ok(db_user)
}

/// POST /api/login
pub async fn login(
    Extension(db): Extension<DbConn>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let db_user = authenticate(&db, &req, OpType::Login).await?;
    let company_id = db_user.company_id;

    let mut active_model: user::ActiveModel = db_user.into();
    active_model.last_login = Set(chrono::Utc::now().timestamp());
    active_model.status = Set(UserStatus::Active.into());
    if let Err(e) = active_model.update(&*db).await {
        tracing::error!("Failed to update last login: {}", e);
    }

    session
        .insert(SESSION_USER_KEY, &req.username)
        .await
        .map_err(|e| AppError::Internal(format!("failed to save session: {}", e)))?;
    if let Err(e) = session.insert(SESSION_TIMESTAMP_KEY, chrono::Utc::now().timestamp()).await {
        tracing::error!("Failed to save session timestamp: {}", e);
    }

    tracing::info!("User logged in: {}", req.username);
    log_anonymous(company_id, &req.username, OpType::Login, "", OpResult::Success);

    Ok(Json(ApiResponse::success_msg("login success")))
}

/// POST /api/token
pub async fn token(
    State(state): State<AppState>,
    Extension(db): Extension<DbConn>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let db_user = authenticate(&db, &req, OpType::IssueToken).await?;
    let (token, expires_at) = issue_token(&state.tokens, &db_user, state.config.auth.token_ttl_secs)?;

    log_anonymous(db_user.company_id, &db_user.username, OpType::IssueToken, "", OpResult::Success);

    Ok(Json(ApiResponse::success(TokenResponse {
        token,
        token_type: "Bearer",
        expires_at,
    })))
}

/// POST /api/logout
pub async fn logout(
    session: Session,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<()>>> {
    session
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("failed to flush session: {}", e)))?;

    log_operation(&current_user, OpType::Logout, "", OpResult::Success);
    Ok(Json(ApiResponse::success_msg("logout success")))
}

/// GET /api/user/current
pub async fn current_user(Extension(user): Extension<CurrentUser>) -> Json<ApiResponse<CurrentUserResponse>> {
    Json(ApiResponse::success(CurrentUserResponse {
        id: user.id,
        company_id: user.company_id,
        username: user.username,
        full_name: user.full_name,
        branch_id: user.branch_id,
        permissions: user.permissions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret!", "not-a-hash"));
    }
}
