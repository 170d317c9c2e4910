//! ERP - a multi-tenant business backend
//!
//! Company administration, HR with attendance, leave and payroll, projects,
//! inventory with a stock ledger, and purchase/sale documents, served as a
//! JSON API over axum with PostgreSQL through SeaORM.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod permission;
pub mod routes;
pub mod scope;
pub mod service;
pub mod state;
pub mod validate;

pub use config::Config;
pub use state::AppState;
