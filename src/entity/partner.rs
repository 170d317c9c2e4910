//! Partner entity - suppliers and customers
//!
//! Table: erp_partner

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum PartnerKind {
    #[sea_orm(string_value = "supplier")]
    Supplier,
    #[sea_orm(string_value = "customer")]
    Customer,
    #[sea_orm(string_value = "both")]
    Both,
}

impl PartnerKind {
    pub fn can_supply(self) -> bool {
        matches!(self, PartnerKind::Supplier | PartnerKind::Both)
    }

    pub fn can_buy(self) -> bool {
        matches!(self, PartnerKind::Customer | PartnerKind::Both)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_partner")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,
    pub kind: PartnerKind,

    #[sea_orm(column_type = "String(Some(32))")]
    pub code: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub email: Option<String>,

    #[sea_orm(column_type = "String(Some(32))", nullable)]
    pub phone: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub tax_number: Option<String>,

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

tenanted!();
