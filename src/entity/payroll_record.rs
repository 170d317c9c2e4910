//! PayrollRecord entity - header of one payroll run
//!
//! Table: erp_payroll_record

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum PayrollStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "paid")]
    Paid,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_payroll_record")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,

    /// None for a company-wide run
    pub branch_id: Option<i64>,

    pub period_year: i32,
    /// 1..=12
    pub period_month: i32,

    pub status: PayrollStatus,
    pub employee_count: i32,

    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_basic: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_allowance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_overtime: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_deduction: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_income_tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_net: Decimal,
    /// Sum of basic salaries minus sum of income tax
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total_amount: Decimal,

    pub paid_at: Option<DateTimeUtc>,

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
    #[sea_orm(has_many = "super::payroll_data::Entity")]
    PayrollData,
}

impl Related<super::payroll_data::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PayrollData.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

tenanted!();
