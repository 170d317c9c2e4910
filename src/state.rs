use jsonwebtoken::{DecodingKey, EncodingKey};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::permission::PermissionEnforcer;

/// HMAC keys for bearer tokens
pub struct TokenKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
}

impl TokenKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Permission enforcer
    pub perm: PermissionEnforcer,
    /// Application configuration
    pub config: Arc<Config>,
    /// Bearer token keys derived from `auth.jwt_secret`
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: Arc<DatabaseConnection>, perm: PermissionEnforcer, config: Config) -> Self {
        let tokens = TokenKeys::from_secret(&config.auth.jwt_secret);

        Self {
            db,
            perm,
            config: Arc::new(config),
            tokens: Arc::new(tokens),
        }
    }
}
