//! User entity - login accounts
//!
//! Table: erp_user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    /// Never logged in
    Inactive = 0,
    Active = 1,
    Disabled = 2,
}

impl From<i32> for UserStatus {
    fn from(value: i32) -> Self {
        match value {
            0 => UserStatus::Inactive,
            1 => UserStatus::Active,
            2 => UserStatus::Disabled,
            _ => UserStatus::Inactive,
        }
    }
}

impl From<UserStatus> for i32 {
    fn from(status: UserStatus) -> Self {
        status as i32
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,

    /// Unique across all companies
    #[sea_orm(column_type = "String(Some(32))", unique)]
    pub username: String,

    /// bcrypt hash
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    #[sea_orm(column_type = "String(Some(64))")]
    pub full_name: String,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub email: Option<String>,

    pub branch_id: Option<i64>,

    /// 0=inactive, 1=active, 2=disabled
    pub status: i32,

    /// Unix timestamp of the last login, 0 if never
    pub last_login: i64,

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

impl Model {
    pub fn is_disabled(&self) -> bool {
        UserStatus::from(self.status) == UserStatus::Disabled
    }
}
