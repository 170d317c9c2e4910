//! Branch entity - a company's office or site
//!
//! Table: erp_branch

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_branch")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,

    /// Unique per company
    #[sea_orm(column_type = "String(Some(32))")]
    pub code: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    pub city_id: Option<i64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,

    pub is_head_office: bool,

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
        belongs_to = "super::company::Entity",
        from = "Column::CompanyId",
        to = "super::company::Column::Id"
    )]
    Company,
}

impl Related<super::company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Company.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

tenanted!();
