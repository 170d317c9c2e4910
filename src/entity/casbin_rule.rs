//! CasbinRule entity - persisted Casbin RBAC policies
//!
//! Table: erp_casbin_rule

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_casbin_rule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 'p' (policy) or 'g' (role grouping)
    #[sea_orm(column_type = "String(Some(10))")]
    pub ptype: String,

    /// Subject for 'p', user for 'g'
    #[sea_orm(column_type = "String(Some(64))")]
    pub v0: String,

    /// Object for 'p', role for 'g'
    #[sea_orm(column_type = "String(Some(64))")]
    pub v1: String,

    /// Action for 'p', unused for 'g'
    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub v2: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub v3: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub v4: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", nullable)]
    pub v5: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Policy vector as Casbin expects it, trailing empty fields dropped
    pub fn to_policy_vec(&self) -> Vec<String> {
        let mut policy = vec![self.v0.clone(), self.v1.clone()];
        policy.extend(
            [&self.v2, &self.v3, &self.v4, &self.v5]
                .into_iter()
                .flatten()
                .filter(|v| !v.is_empty())
                .cloned(),
        );
        policy
    }
}

/// Policy row: `sub` may `act` on `obj`
pub fn new_policy(sub: &str, obj: &str, act: &str) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        ptype: Set("p".to_string()),
        v0: Set(sub.to_string()),
        v1: Set(obj.to_string()),
        v2: Set(Some(act.to_string())),
        ..Default::default()
    }
}

/// Grouping row: `user` has `role`
pub fn new_grouping(user: &str, role: &str) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        ptype: Set("g".to_string()),
        v0: Set(user.to_string()),
        v1: Set(role.to_string()),
        v2: Set(None),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_policy_vec() {
        let rule = Model {
            id: 1,
            ptype: "p".to_string(),
            v0: "role:hr".to_string(),
            v1: "hr".to_string(),
            v2: Some("access".to_string()),
            v3: Some(String::new()),
            v4: None,
            v5: None,
        };
        assert_eq!(rule.to_policy_vec(), vec!["role:hr", "hr", "access"]);
    }
}
