//! Company entity - the tenant
//!
//! Table: erp_company

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_company")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(128))", unique)]
    pub name: String,

    #[sea_orm(column_type = "String(Some(32))")]
    pub code: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub tax_number: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,

    /// ISO 4217 code
    #[sea_orm(column_type = "String(Some(3))")]
    pub currency: String,

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
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
