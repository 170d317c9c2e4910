use axum::{
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::entity::{purchase, sale};
use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: false,
            message: message.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            code: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(state.config.auth.secure_cookies)
        .with_http_only(true);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        // Auth
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/token", post(handlers::auth::token))
        .route("/user/current", get(handlers::auth::current_user))
        // Company and branches
        .route("/company/current", get(handlers::company::current_company))
        .route("/company/update", post(handlers::company::update_company))
        .route("/company/add", post(handlers::company::add_company))
        .route("/branch/add", post(handlers::branch::add_branch))
        .route("/branch/update", post(handlers::branch::update_branch))
        .route("/branch/delete", post(handlers::branch::delete_branch))
        .route("/branch/query", get(handlers::branch::get_branches))
        // Reference data
        .route("/region/add", post(handlers::reference::add_region))
        .route("/region/update", post(handlers::reference::update_region))
        .route("/region/delete", post(handlers::reference::delete_region))
        .route("/region/query", get(handlers::reference::get_regions))
        .route("/city/add", post(handlers::reference::add_city))
        .route("/city/update", post(handlers::reference::update_city))
        .route("/city/delete", post(handlers::reference::delete_city))
        .route("/city/query", get(handlers::reference::get_cities))
        // Users
        .route("/user/add", post(handlers::user::add_user))
        .route("/user/update", post(handlers::user::update_user))
        .route("/user/delete", post(handlers::user::delete_user))
        .route("/user/query", get(handlers::user::get_users))
        .route("/user/enable", post(handlers::user::enable_user))
        .route("/user/disable", post(handlers::user::disable_user))
        .route("/user/change-password", post(handlers::user::change_password))
        .route("/user/reset-password", post(handlers::user::reset_password))
        // Roles
        .route("/role/add", post(handlers::role::add_role))
        .route("/role/update", post(handlers::role::update_role))
        .route("/role/delete", post(handlers::role::delete_role))
        .route("/role/list", get(handlers::role::get_roles))
        .route("/role/permissions", get(handlers::role::get_available_permissions))
        // Departments and employees
        .route("/department/add", post(handlers::department::add_department))
        .route("/department/update", post(handlers::department::update_department))
        .route("/department/delete", post(handlers::department::delete_department))
        .route("/department/query", get(handlers::department::get_departments))
        .route("/department/tree", get(handlers::department::get_department_tree))
        .route("/employee/add", post(handlers::employee::add_employee))
        .route("/employee/update", post(handlers::employee::update_employee))
        .route("/employee/delete", post(handlers::employee::delete_employee))
        .route("/employee/query", get(handlers::employee::get_employees))
        .route("/employee/info", get(handlers::employee::get_employee))
        // Attendance and leave
        .route("/attendance/check-in", post(handlers::attendance::check_in))
        .route("/attendance/check-out", post(handlers::attendance::check_out))
        .route("/attendance/add", post(handlers::attendance::add_attendance))
        .route("/attendance/query", get(handlers::attendance::get_attendance))
        .route("/leave/add", post(handlers::leave::add_leave))
        .route("/leave/approve", post(handlers::leave::approve_leave))
        .route("/leave/reject", post(handlers::leave::reject_leave))
        .route("/leave/cancel", post(handlers::leave::cancel_leave))
        .route("/leave/query", get(handlers::leave::get_leaves))
        // Payroll
        .route("/payroll/run", post(handlers::payroll::run_payroll))
        .route("/payroll/recalculate", post(handlers::payroll::recalculate_payroll))
        .route("/payroll/approve", post(handlers::payroll::approve_payroll))
        .route("/payroll/pay", post(handlers::payroll::pay_payroll))
        .route("/payroll/delete", post(handlers::payroll::delete_payroll))
        .route("/payroll/query", get(handlers::payroll::get_payrolls))
        .route("/payroll/info", get(handlers::payroll::get_payroll))
        // Projects
        .route("/project/add", post(handlers::project::add_project))
        .route("/project/update", post(handlers::project::update_project))
        .route("/project/delete", post(handlers::project::delete_project))
        .route("/project/query", get(handlers::project::get_projects))
        .route("/project/info", get(handlers::project::get_project))
        // Inventory
        .route("/item/add", post(handlers::item::add_item))
        .route("/item/update", post(handlers::item::update_item))
        .route("/item/delete", post(handlers::item::delete_item))
        .route("/item/query", get(handlers::item::get_items))
        .route("/item/info", get(handlers::item::get_item))
        .route("/warehouse/add", post(handlers::warehouse::add_warehouse))
        .route("/warehouse/update", post(handlers::warehouse::update_warehouse))
        .route("/warehouse/delete", post(handlers::warehouse::delete_warehouse))
        .route("/warehouse/query", get(handlers::warehouse::get_warehouses))
        .route("/stock/move", post(handlers::stock::move_stock))
        .route("/stock/balance", get(handlers::stock::get_balances))
        .route("/stock/movements", get(handlers::stock::get_movements))
        .route("/stock/reconcile", get(handlers::stock::reconcile))
        // Trade
        .route("/partner/add", post(handlers::partner::add_partner))
        .route("/partner/update", post(handlers::partner::update_partner))
        .route("/partner/delete", post(handlers::partner::delete_partner))
        .route("/partner/query", get(handlers::partner::get_partners))
        .route("/partner/info", get(handlers::partner::get_partner))
        .route("/purchase/add", post(handlers::document::add_document::<purchase::Entity>))
        .route("/purchase/update", post(handlers::document::update_document::<purchase::Entity>))
        .route("/purchase/delete", post(handlers::document::delete_document::<purchase::Entity>))
        .route("/purchase/confirm", post(handlers::document::confirm_document::<purchase::Entity>))
        .route("/purchase/cancel", post(handlers::document::cancel_document::<purchase::Entity>))
        .route("/purchase/query", get(handlers::document::get_documents::<purchase::Entity>))
        .route("/purchase/info", get(handlers::document::get_document::<purchase::Entity>))
        .route("/sale/add", post(handlers::document::add_document::<sale::Entity>))
        .route("/sale/update", post(handlers::document::update_document::<sale::Entity>))
        .route("/sale/delete", post(handlers::document::delete_document::<sale::Entity>))
        .route("/sale/confirm", post(handlers::document::confirm_document::<sale::Entity>))
        .route("/sale/cancel", post(handlers::document::cancel_document::<sale::Entity>))
        .route("/sale/query", get(handlers::document::get_documents::<sale::Entity>))
        .route("/sale/info", get(handlers::document::get_document::<sale::Entity>))
        // Audit log
        .route("/oplog/query", get(handlers::audit::query_oplog))
        .route("/oplog/delete", post(handlers::audit::delete_oplog));

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error("Not Found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sea_orm::{DbBackend, MockDatabase};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::entity::casbin_rule;
    use crate::permission::PermissionEnforcer;

    async fn test_app() -> Router {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<casbin_rule::Model>::new()])
            .into_connection();
        let db = Arc::new(db);
        let perm = PermissionEnforcer::new(Arc::clone(&db)).await.unwrap();
        create_router(AppState::new(db, perm, Config::default()))
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = test_app()
            .await
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_requires_auth() {
        let response = test_app()
            .await
            .oneshot(Request::builder().uri("/api/item/query").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_garbage_bearer_token_rejected() {
        let response = test_app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/api/employee/query")
                    .header("authorization", "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_fallback_is_404() {
        let (status, Json(body)) = fallback().await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.code);
    }
}
