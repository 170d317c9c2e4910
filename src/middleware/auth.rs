//! Authentication middleware
//!
//! Resolves the caller from the session cookie or an `Authorization: Bearer`
//! token and attaches a [`CurrentUser`] to the request.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{Algorithm, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::ops::Deref;
use std::sync::Arc;
use tower_sessions::Session;

use crate::entity::user;
use crate::error::{AppError, AppResult};
use crate::state::{AppState, TokenKeys};

/// Session key for storing username
pub const SESSION_USER_KEY: &str = "user";
pub const SESSION_TIMESTAMP_KEY: &str = "timestamp";

/// Database connection wrapper for use in handlers via Extension
#[derive(Clone)]
pub struct DbConn(pub Arc<DatabaseConnection>);

impl Deref for DbConn {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub use crate::permission::perm;

/// Extension to store current user in request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub company_id: i64,
    pub username: String,
    pub full_name: String,
    pub branch_id: Option<i64>,
    /// Permissions loaded from Casbin
    pub permissions: Vec<String>,
}

impl CurrentUser {
    /// Check if the user has a specific permission
    pub fn has_permission(&self, perm: &str) -> bool {
        self.permissions.iter().any(|p| p == perm)
    }

    /// Forbidden unless the user has `perm`
    pub fn require(&self, perm: &str) -> AppResult<()> {
        if self.has_permission(perm) {
            Ok(())
        } else {
            tracing::warn!("{} denied: missing permission {}", self.username, perm);
            Err(AppError::Forbidden)
        }
    }
}

/// Bearer token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Username
    pub sub: String,
    /// User id
    pub uid: i64,
    /// Company id
    pub cid: i64,
    /// Expiry (Unix timestamp)
    pub exp: i64,
}

/// Sign a bearer token for `user`, valid for `ttl_secs`
pub fn issue_token(keys: &TokenKeys, user: &user::Model, ttl_secs: i64) -> AppResult<(String, i64)> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims {
        sub: user.username.clone(),
        uid: user.id,
        cid: user.company_id,
        exp,
    };
    let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
        .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))?;
    Ok((token, exp))
}

/// Verify signature and expiry of a bearer token
pub fn decode_token(keys: &TokenKeys, token: &str) -> Option<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    match jsonwebtoken::decode::<Claims>(token, &keys.decoding, &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!("Rejected bearer token: {}", e);
            None
        }
    }
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    if !path.starts_with("/api") {
        return true;
    }

    matches!(path, "/api/health" | "/api/login" | "/api/token")
}

fn reject(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    session: Session,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    // All handlers access the database via Extension<DbConn>
    request.extensions_mut().insert(DbConn(state.db.clone()));

    if is_public_path(&path) {
        return next.run(request).await;
    }

    // A bearer token wins over the session
    let username = match bearer {
        Some(TypedHeader(Authorization(bearer))) => match decode_token(&state.tokens, bearer.token()) {
            Some(claims) => Some(claims.sub),
            None => return reject(StatusCode::UNAUTHORIZED, "invalid_token"),
        },
        None => session.get::<String>(SESSION_USER_KEY).await.unwrap_or(None),
    };

    let Some(username) = username else {
        return reject(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    let user_result = user::Entity::find()
        .filter(user::Column::Username.eq(&username))
        .filter(user::Column::DeletedAt.is_null())
        .one(&*state.db)
        .await;

    match user_result {
        Ok(Some(user_model)) if user_model.is_disabled() => {
            tracing::warn!("Disabled user attempted access: {}", username);
            reject(StatusCode::UNAUTHORIZED, "user_disabled")
        }
        Ok(Some(user_model)) => {
            let permissions = state.perm.get_user_permissions(&user_model.username).await;

            let current_user = CurrentUser {
                id: user_model.id,
                company_id: user_model.company_id,
                username: user_model.username,
                full_name: user_model.full_name,
                branch_id: user_model.branch_id,
                permissions,
            };

            request.extensions_mut().insert(current_user);

            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!("User not found in database: {}", username);
            reject(StatusCode::UNAUTHORIZED, "invalid_session")
        }
        Err(e) => {
            tracing::error!("Database error during auth: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> user::Model {
        user::Model {
            id: 5,
            company_id: 2,
            username: "alice".to_string(),
            password: String::new(),
            full_name: "Alice".to_string(),
            email: None,
            branch_id: None,
            status: 1,
            last_login: 0,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/api/health"));
        assert!(is_public_path("/api/login"));
        assert!(is_public_path("/index.html"));
        assert!(!is_public_path("/api/item/query"));
        assert!(!is_public_path("/api/logout"));
    }

    #[test]
    fn test_token_round_trip() {
        let keys = TokenKeys::from_secret("secret");
        let (token, exp) = issue_token(&keys, &sample_user(), 60).unwrap();
        let claims = decode_token(&keys, &token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.uid, 5);
        assert_eq!(claims.cid, 2);
        assert_eq!(claims.exp, exp);

        let other = TokenKeys::from_secret("other");
        assert!(decode_token(&other, &token).is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = TokenKeys::from_secret("secret");
        let (token, _) = issue_token(&keys, &sample_user(), -3600).unwrap();
        assert!(decode_token(&keys, &token).is_none());
    }

    #[test]
    fn test_require_permission() {
        let user = CurrentUser {
            id: 1,
            company_id: 1,
            username: "bob".to_string(),
            full_name: "Bob".to_string(),
            branch_id: None,
            permissions: vec![perm::HR.to_string()],
        };
        assert!(user.require(perm::HR).is_ok());
        assert!(matches!(user.require(perm::INVENTORY), Err(AppError::Forbidden)));
    }
}
