//! Employee entity
//!
//! Table: erp_employee

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum EmployeeStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
    #[sea_orm(string_value = "terminated")]
    Terminated,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_employee")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,

    /// Personnel number, unique per company
    #[sea_orm(column_type = "String(Some(32))")]
    pub code: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub full_name: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub email: Option<String>,

    #[sea_orm(column_type = "String(Some(32))", nullable)]
    pub phone: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub position: Option<String>,

    pub branch_id: Option<i64>,
    pub department_id: Option<i64>,

    /// Login account used for self-service (check-in, leave requests)
    pub user_id: Option<i64>,

    pub hire_date: Date,

    pub status: EmployeeStatus,

    /// Monthly basic salary
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub basic_salary: Decimal,

    /// Fixed monthly allowance
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub allowance: Decimal,

    /// Annual leave entitlement in working days
    pub annual_leave_days: i32,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTimeUtc>,
    #[serde(skip_serializing)]
    pub deleted_by: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attendance::Entity")]
    Attendance,
    #[sea_orm(has_many = "super::leave_request::Entity")]
    LeaveRequest,
}

impl Related<super::attendance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attendance.def()
    }
}

impl Related<super::leave_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LeaveRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

tenanted!();
