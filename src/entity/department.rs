//! Department entity
//!
//! Table: erp_department

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "erp_department")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,

    #[sea_orm(column_type = "String(Some(64))")]
    pub name: String,

    /// Depth in the tree, 1 for top-level departments
    pub level: i32,

    /// 0 for top-level departments
    pub parent_id: i64,

    /// Slash-separated names of the ancestors
    #[sea_orm(column_type = "String(Some(255))")]
    pub parent_name: String,

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

// Self-reference resolved by manual queries

impl ActiveModelBehavior for ActiveModel {}

tenanted!();

/// Department tree node (API response)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentTree {
    pub id: i64,
    pub name: String,
    pub level: i32,
    pub parent_id: i64,
    pub parent_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DepartmentTree>,
}

impl From<Model> for DepartmentTree {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            level: model.level,
            parent_id: model.parent_id,
            parent_name: model.parent_name,
            children: Vec::new(),
        }
    }
}

/// Assemble a flat department list into a forest rooted at `parent_id = 0`.
/// Nodes whose parent is missing (e.g. soft-deleted) become roots.
pub fn build_tree(departments: Vec<Model>) -> Vec<DepartmentTree> {
    use std::collections::{HashMap, HashSet};

    let ids: HashSet<i64> = departments.iter().map(|d| d.id).collect();
    let mut by_parent: HashMap<i64, Vec<DepartmentTree>> = HashMap::new();
    for dept in departments {
        let parent = if ids.contains(&dept.parent_id) { dept.parent_id } else { 0 };
        by_parent.entry(parent).or_default().push(dept.into());
    }

    fn attach(node: &mut DepartmentTree, by_parent: &mut HashMap<i64, Vec<DepartmentTree>>) {
        if let Some(mut children) = by_parent.remove(&node.id) {
            for child in children.iter_mut() {
                attach(child, by_parent);
            }
            node.children = children;
        }
    }

    let mut roots = by_parent.remove(&0).unwrap_or_default();
    for root in roots.iter_mut() {
        attach(root, &mut by_parent);
    }
    roots.sort_by_key(|d| d.id);
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dept(id: i64, parent_id: i64, name: &str) -> Model {
        Model {
            id,
            company_id: 1,
            name: name.to_string(),
            level: if parent_id == 0 { 1 } else { 2 },
            parent_id,
            parent_name: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn test_build_tree() {
        let tree = build_tree(vec![
            dept(1, 0, "Operations"),
            dept(2, 1, "Warehouse"),
            dept(3, 1, "Logistics"),
            dept(4, 0, "Finance"),
            dept(5, 99, "Orphan"),
        ]);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree[0].name, "Operations");
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[1].name, "Finance");
        assert!(tree[1].children.is_empty());
        assert_eq!(tree[2].name, "Orphan");
    }
}
