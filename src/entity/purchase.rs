//! Purchase entity - goods received from a supplier
//!
//! Table: erp_purchase

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle shared by purchase and sale documents
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Editable, no stock effect
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Stock posted
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_purchase")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,
    pub branch_id: Option<i64>,

    /// PO-YYYY-NNNNN
    #[sea_orm(column_type = "String(Some(32))")]
    pub number: String,

    pub partner_id: i64,

    /// Receiving warehouse
    pub warehouse_id: i64,

    pub doc_date: Date,
    pub status: DocumentStatus,

    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub tax_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub total: Decimal,

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
    #[sea_orm(has_many = "super::purchase_line::Entity")]
    Lines,
}

impl Related<super::purchase_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

tenanted!();
