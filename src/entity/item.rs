//! Item entity - stock keeping unit
//!
//! Table: erp_item

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_item")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,

    /// Unique per company
    #[sea_orm(column_type = "String(Some(64))")]
    pub sku: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    /// Unit of measure, e.g. "pcs", "kg"
    #[sea_orm(column_type = "String(Some(16))")]
    pub unit: String,

    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub cost_price: Decimal,

    #[sea_orm(column_type = "Decimal(Some((18, 2)))")]
    pub sale_price: Decimal,

    #[sea_orm(column_type = "Decimal(Some((18, 4)))")]
    pub reorder_level: Decimal,

    /// Sum of the item's stock balances over all warehouses
    #[sea_orm(column_type = "Decimal(Some((18, 4)))")]
    pub quantity_on_hand: Decimal,

    pub is_active: bool,

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
    #[sea_orm(has_many = "super::stock_balance::Entity")]
    StockBalance,
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovement,
}

impl Related<super::stock_balance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockBalance.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

tenanted!();

impl Model {
    pub fn needs_reorder(&self) -> bool {
        self.quantity_on_hand <= self.reorder_level
    }
}
