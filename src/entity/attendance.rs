//! Attendance entity - one row per employee per working day
//!
//! Table: erp_attendance

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_attendance")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,
    pub employee_id: i64,
    pub work_date: Date,
    pub check_in: DateTimeUtc,
    pub check_out: Option<DateTimeUtc>,

    #[sea_orm(column_type = "Decimal(Some((8, 2)))")]
    pub worked_hours: Decimal,

    /// Hours beyond the standard working day
    #[sea_orm(column_type = "Decimal(Some((8, 2)))")]
    pub overtime_hours: Decimal,

    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,

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
        belongs_to = "super::employee::Entity",
        from = "Column::EmployeeId",
        to = "super::employee::Column::Id"
    )]
    Employee,
}

impl Related<super::employee::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Employee.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

tenanted!();
