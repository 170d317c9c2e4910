//! OpLog entity - operation (audit) log
//!
//! Table: erp_op_log

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Operation types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Login,
    Logout,
    IssueToken,
    CreateCompany,
    UpdateCompany,
    CreateBranch,
    UpdateBranch,
    DeleteBranch,
    CreateReference,
    UpdateReference,
    DeleteReference,
    CreateUser,
    UpdateUser,
    DeleteUser,
    EnableUser,
    DisableUser,
    UpdatePassword,
    CreateRole,
    UpdateRole,
    DeleteRole,
    CreateDept,
    UpdateDept,
    DeleteDept,
    CreateEmployee,
    UpdateEmployee,
    DeleteEmployee,
    CheckIn,
    CheckOut,
    RecordAttendance,
    RequestLeave,
    ApproveLeave,
    RejectLeave,
    CancelLeave,
    RunPayroll,
    RecalculatePayroll,
    ApprovePayroll,
    PayPayroll,
    DeletePayroll,
    CreateProject,
    UpdateProject,
    DeleteProject,
    CreateItem,
    UpdateItem,
    DeleteItem,
    CreateWarehouse,
    UpdateWarehouse,
    DeleteWarehouse,
    StockMove,
    StockReconcile,
    CreatePartner,
    UpdatePartner,
    DeletePartner,
    CreateDocument,
    UpdateDocument,
    DeleteDocument,
    ConfirmDocument,
    CancelDocument,
    DeleteOpLog,
}

impl OpType {
    /// Stored label
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Login => "login",
            OpType::Logout => "logout",
            OpType::IssueToken => "issue token",
            OpType::CreateCompany => "create company",
            OpType::UpdateCompany => "update company",
            OpType::CreateBranch => "create branch",
            OpType::UpdateBranch => "update branch",
            OpType::DeleteBranch => "delete branch",
            OpType::CreateReference => "create reference data",
            OpType::UpdateReference => "update reference data",
            OpType::DeleteReference => "delete reference data",
            OpType::CreateUser => "create user",
            OpType::UpdateUser => "update user",
            OpType::DeleteUser => "delete user",
            OpType::EnableUser => "enable user",
            OpType::DisableUser => "disable user",
            OpType::UpdatePassword => "update password",
            OpType::CreateRole => "create role",
            OpType::UpdateRole => "update role",
            OpType::DeleteRole => "delete role",
            OpType::CreateDept => "create department",
            OpType::UpdateDept => "update department",
            OpType::DeleteDept => "delete department",
            OpType::CreateEmployee => "create employee",
            OpType::UpdateEmployee => "update employee",
            OpType::DeleteEmployee => "delete employee",
            OpType::CheckIn => "check in",
            OpType::CheckOut => "check out",
            OpType::RecordAttendance => "record attendance",
            OpType::RequestLeave => "request leave",
            OpType::ApproveLeave => "approve leave",
            OpType::RejectLeave => "reject leave",
            OpType::CancelLeave => "cancel leave",
            OpType::RunPayroll => "run payroll",
            OpType::RecalculatePayroll => "recalculate payroll",
            OpType::ApprovePayroll => "approve payroll",
            OpType::PayPayroll => "pay payroll",
            OpType::DeletePayroll => "delete payroll",
            OpType::CreateProject => "create project",
            OpType::UpdateProject => "update project",
            OpType::DeleteProject => "delete project",
            OpType::CreateItem => "create item",
            OpType::UpdateItem => "update item",
            OpType::DeleteItem => "delete item",
            OpType::CreateWarehouse => "create warehouse",
            OpType::UpdateWarehouse => "update warehouse",
            OpType::DeleteWarehouse => "delete warehouse",
            OpType::StockMove => "stock movement",
            OpType::StockReconcile => "stock reconcile",
            OpType::CreatePartner => "create partner",
            OpType::UpdatePartner => "update partner",
            OpType::DeletePartner => "delete partner",
            OpType::CreateDocument => "create document",
            OpType::UpdateDocument => "update document",
            OpType::DeleteDocument => "delete document",
            OpType::ConfirmDocument => "confirm document",
            OpType::CancelDocument => "cancel document",
            OpType::DeleteOpLog => "delete oplog",
        }
    }
}

/// Operation result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpResult {
    Success,
    Failed,
}

impl OpResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpResult::Success => "success",
            OpResult::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_op_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 0 for operations outside any tenant (failed logins)
    pub company_id: i64,

    /// Unix timestamp
    pub op_time: i64,

    #[sea_orm(column_type = "String(Some(32))")]
    pub username: String,

    #[sea_orm(column_type = "String(Some(32))")]
    pub op_type: String,

    #[sea_orm(column_type = "Text")]
    pub op_desc: String,

    #[sea_orm(column_type = "String(Some(16))")]
    pub result: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub ip: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
