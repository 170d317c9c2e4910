//! Audit log handlers
//!
//! Implements operation log query and management

use axum::{
    extract::Query,
    response::Json,
    Extension,
};
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;

use crate::entity::op_log::{self, OpResult, OpType};
use crate::error::{AppError, AppResult};
use crate::handlers::PageQuery;
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

use service::log_operation;

/// Log response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    pub id: i64,
    pub op_time: i64,
    pub username: String,
    pub op_type: String,
    pub op_desc: String,
    pub result: String,
    pub ip: String,
}

impl From<op_log::Model> for LogResponse {
    fn from(m: op_log::Model) -> Self {
        Self {
            id: m.id,
            op_time: m.op_time,
            username: m.username,
            op_type: m.op_type,
            op_desc: m.op_desc,
            result: m.result,
            ip: m.ip.unwrap_or_default(),
        }
    }
}

/// Query response with pagination
#[derive(Debug, Serialize)]
pub struct LogQueryResponse {
    pub logs: Vec<LogResponse>,
    pub total: u64,
}

/// GET /api/oplog/query
pub async fn query_oplog(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<LogQueryResponse>> {
    current_user.require(perm::AUDIT)?;

    let db = &*db;
    let (offset, limit) = query.offset_limit();
    let company_logs = op_log::Entity::find()
        .filter(op_log::Column::CompanyId.eq(current_user.company_id));

    let logs = company_logs
        .clone()
        .order_by_desc(op_log::Column::Id)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?
        .into_iter()
        .map(LogResponse::from)
        .collect();

    let total = company_logs.count(db).await?;

    Ok(Json(LogQueryResponse { logs, total }))
}

/// POST /api/oplog/delete
pub async fn delete_oplog(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(ids): Json<Vec<i64>>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::AUDIT)?;

    if ids.is_empty() {
        return Err(AppError::BadRequest("No IDs provided".to_string()));
    }

    let res = op_log::Entity::delete_many()
        .filter(op_log::Column::CompanyId.eq(current_user.company_id))
        .filter(op_log::Column::Id.is_in(ids))
        .exec(&*db)
        .await?;

    let message = format!("Deleted {} log entries", res.rows_affected);
    log_operation(&current_user, OpType::DeleteOpLog, &message, OpResult::Success);
    Ok(Json(ApiResponse::success_msg(message)))
}

/// Service for adding operation logs
pub mod service {
    use sea_orm::{ActiveModelTrait, Set};
    use tokio::sync::mpsc;

    use crate::entity::op_log::{self, OpResult, OpType};
    use crate::middleware::auth::CurrentUser;

    /// Log entry to be added
    #[derive(Debug, Clone)]
    pub struct LogEntry {
        pub company_id: i64,
        pub username: String,
        pub op_type: OpType,
        pub op_desc: String,
        pub result: OpResult,
        pub ip: Option<String>,
    }

    impl LogEntry {
        fn into_active_model(self, op_time: i64) -> op_log::ActiveModel {
            op_log::ActiveModel {
                company_id: Set(self.company_id),
                op_time: Set(op_time),
                username: Set(self.username),
                op_type: Set(self.op_type.as_str().to_string()),
                op_desc: Set(self.op_desc),
                result: Set(self.result.as_str().to_string()),
                ip: Set(self.ip),
                ..Default::default()
            }
        }
    }

    /// Global log channel
    static LOG_TX: std::sync::OnceLock<mpsc::Sender<LogEntry>> = std::sync::OnceLock::new();

    /// Initialize the audit log service
    /// This function is idempotent - calling it multiple times is safe
    pub fn init(db: std::sync::Arc<sea_orm::DatabaseConnection>) {
        if LOG_TX.get().is_some() {
            tracing::debug!("Audit log service already initialized, skipping");
            return;
        }

        let (tx, mut rx) = mpsc::channel::<LogEntry>(200);
        if LOG_TX.set(tx).is_err() {
            tracing::debug!("Audit log service initialized by another thread");
            return;
        }

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let now = chrono::Utc::now().timestamp();
                if let Err(e) = entry.into_active_model(now).insert(&*db).await {
                    tracing::error!("Failed to log operation: {}", e);
                }
            }
        });
    }

    /// Add an operation log entry without waiting for the write
    pub fn add_log(entry: LogEntry) {
        if let Some(tx) = LOG_TX.get() {
            if tx.try_send(entry).is_err() {
                tracing::warn!("Log channel is full, operation log dropped");
            }
        } else {
            tracing::debug!(
                "Audit log service not initialized, log dropped: {} - {}",
                entry.op_type.as_str(),
                entry.op_desc
            );
        }
    }

    /// Log an operation performed by an authenticated user
    pub fn log_operation(user: &CurrentUser, op_type: OpType, op_desc: &str, result: OpResult) {
        add_log(LogEntry {
            company_id: user.company_id,
            username: user.username.clone(),
            op_type,
            op_desc: op_desc.to_string(),
            result,
            ip: None,
        });
    }

    /// Log success or failure of an operation depending on its result
    pub fn log_outcome<T>(
        user: &CurrentUser,
        op_type: OpType,
        op_desc: &str,
        result: &crate::error::AppResult<T>,
    ) {
        let outcome = match result {
            Ok(_) => OpResult::Success,
            Err(_) => OpResult::Failed,
        };
        log_operation(user, op_type, op_desc, outcome);
    }

    /// Log an operation attributed only by username (e.g. a failed login)
    pub fn log_anonymous(company_id: i64, username: &str, op_type: OpType, op_desc: &str, result: OpResult) {
        add_log(LogEntry {
            company_id,
            username: username.to_string(),
            op_type,
            op_desc: op_desc.to_string(),
            result,
            ip: None,
        });
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use sea_orm::ActiveValue;

        #[test]
        fn test_entry_into_active_model() {
            let entry = LogEntry {
                company_id: 3,
                username: "alice".to_string(),
                op_type: OpType::StockMove,
                op_desc: "item 1".to_string(),
                result: OpResult::Failed,
                ip: None,
            };
            let model = entry.into_active_model(1_700_000_000);
            assert_eq!(model.company_id, ActiveValue::Set(3));
            assert_eq!(model.op_type, ActiveValue::Set("stock movement".to_string()));
            assert_eq!(model.result, ActiveValue::Set("failed".to_string()));
            assert_eq!(model.op_time, ActiveValue::Set(1_700_000_000));
        }
    }
}
