//! StockMovement entity - append-only inventory ledger
//!
//! Table: erp_stock_movement

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    #[sea_orm(string_value = "in")]
    In,
    #[sea_orm(string_value = "out")]
    Out,
    /// Signed correction of a balance
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    /// From `warehouse_id` to `to_warehouse_id`
    #[sea_orm(string_value = "transfer")]
    Transfer,
}

/// Origin of a movement
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "sale")]
    Sale,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_stock_movement")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,
    pub item_id: i64,

    /// Source warehouse for transfers
    pub warehouse_id: i64,
    pub to_warehouse_id: Option<i64>,

    pub movement_type: MovementType,

    /// Positive for in/out/transfer, signed for adjustments
    #[sea_orm(column_type = "Decimal(Some((18, 4)))")]
    pub quantity: Decimal,

    /// Balance of (item, warehouse_id) after this movement
    #[sea_orm(column_type = "Decimal(Some((18, 4)))")]
    pub balance_after: Decimal,

    pub reference_type: ReferenceType,
    pub reference_id: Option<i64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,

    pub created_at: DateTimeUtc,
    pub created_by: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
