//! PayrollData entity - one employee's line in a payroll run
//!
//! Table: erp_payroll_data

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_payroll_data")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,
    pub payroll_record_id: i64,
    pub employee_id: i64,

    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub basic_salary: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub allowance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((8, 2)))")]
    pub overtime_hours: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub overtime_pay: Decimal,
    pub unpaid_leave_days: i32,
    /// Unpaid leave deduction
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub deduction: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub gross: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub income_tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub net_salary: Decimal,

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
    #[sea_orm(
        belongs_to = "super::payroll_record::Entity",
        from = "Column::PayrollRecordId",
        to = "super::payroll_record::Column::Id"
    )]
    PayrollRecord,
}

impl Related<super::payroll_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PayrollRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

tenanted!();
