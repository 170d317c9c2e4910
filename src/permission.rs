//! Permission module using Casbin
//!
//! RBAC with company-scoped roles. Subjects are usernames (globally unique)
//! or roles named `role:<company_id>:<name>`; objects are the module
//! permissions in [`perm`].

use casbin::{CoreApi, DefaultModel, Enforcer, MgmtApi};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::entity::casbin_rule;

/// Permission constants
pub mod perm {
    /// Company settings, branches, reference data, users and roles
    pub const ADMIN: &str = "admin";
    /// Departments, employees, attendance, leave and payroll
    pub const HR: &str = "hr";
    /// Items, warehouses and stock
    pub const INVENTORY: &str = "inventory";
    /// Partners, purchases and sales
    pub const TRADE: &str = "trade";
    pub const PROJECT: &str = "project";
    pub const AUDIT: &str = "audit";
    /// Creating new companies; granted directly, never through a role
    pub const TENANTS: &str = "tenants";

    /// Permissions a role may carry
    pub const ROLE_ASSIGNABLE: [&str; 6] = [ADMIN, HR, INVENTORY, TRADE, PROJECT, AUDIT];

    /// All permissions
    pub const ALL: [&str; 7] = [ADMIN, HR, INVENTORY, TRADE, PROJECT, AUDIT, TENANTS];
}

/// Action constants
pub mod action {
    pub const ACCESS: &str = "access";
}

const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

/// Roles created for every company
pub const DEFAULT_ROLES: [(&str, &[&str]); 4] = [
    ("admin", &perm::ROLE_ASSIGNABLE),
    ("hr", &[perm::HR]),
    ("storekeeper", &[perm::INVENTORY]),
    ("sales", &[perm::TRADE, perm::INVENTORY]),
];

/// Keep only known permissions, in canonical order, without duplicates
pub fn normalize_permissions(raw: &[String]) -> Vec<String> {
    perm::ROLE_ASSIGNABLE
        .iter()
        .filter(|p| raw.iter().any(|r| r.trim() == **p))
        .map(|p| p.to_string())
        .collect()
}

/// Permission enforcer wrapper
#[derive(Clone)]
pub struct PermissionEnforcer {
    enforcer: Arc<RwLock<Enforcer>>,
    db: Arc<DatabaseConnection>,
}

impl PermissionEnforcer {
    /// Role name prefix to distinguish from usernames
    pub const ROLE_PREFIX: &'static str = "role:";

    /// Create a new permission enforcer and load persisted policies
    pub async fn new(db: Arc<DatabaseConnection>) -> anyhow::Result<Self> {
        let model = DefaultModel::from_str(MODEL).await?;
        let enforcer = Enforcer::new(model, ()).await?;

        let perm_enforcer = Self {
            enforcer: Arc::new(RwLock::new(enforcer)),
            db,
        };

        perm_enforcer.load_policies().await?;

        Ok(perm_enforcer)
    }

    /// Load all policies from database
    pub async fn load_policies(&self) -> anyhow::Result<()> {
        let rules = casbin_rule::Entity::find().all(&*self.db).await?;

        let mut enforcer = self.enforcer.write().await;
        enforcer.clear_policy().await?;

        for rule in rules {
            let policy = rule.to_policy_vec();
            if rule.ptype == "p" {
                let _ = enforcer.add_policy(policy).await;
            } else if rule.ptype == "g" {
                let _ = enforcer.add_grouping_policy(policy).await;
            }
        }

        Ok(())
    }

    /// Get all permissions for a user (direct and through roles)
    pub async fn get_user_permissions(&self, user: &str) -> Vec<String> {
        let enforcer = self.enforcer.read().await;
        perm::ALL
            .iter()
            .filter(|p| enforcer.enforce((user, **p, action::ACCESS)).unwrap_or(false))
            .map(|p| p.to_string())
            .collect()
    }

    /// Replace the permissions granted directly to a user
    pub async fn set_permissions(&self, user: &str, permissions: &[&str]) -> anyhow::Result<()> {
        casbin_rule::Entity::delete_many()
            .filter(casbin_rule::Column::Ptype.eq("p"))
            .filter(casbin_rule::Column::V0.eq(user))
            .exec(&*self.db)
            .await?;

        for p in permissions {
            casbin_rule::new_policy(user, p, action::ACCESS).insert(&*self.db).await?;
        }

        self.load_policies().await?;

        Ok(())
    }

    /// Remove every policy and role assignment of a user
    pub async fn remove_user(&self, user: &str) -> anyhow::Result<()> {
        casbin_rule::Entity::delete_many()
            .filter(casbin_rule::Column::V0.eq(user))
            .exec(&*self.db)
            .await?;

        self.load_policies().await?;

        Ok(())
    }

    // ==================== Role Management ====================

    fn role_prefix(company_id: i64) -> String {
        format!("{}{}:", Self::ROLE_PREFIX, company_id)
    }

    /// Subject name of a company role
    pub fn role_name(company_id: i64, role: &str) -> String {
        format!("{}{}", Self::role_prefix(company_id), role)
    }

    /// Role name without the company prefix, None if `subject` is not a role of the company
    fn extract_role_name(company_id: i64, subject: &str) -> Option<&str> {
        subject.strip_prefix(Self::role_prefix(company_id).as_str())
    }

    /// Create a new role with permissions
    pub async fn create_role(&self, company_id: i64, role: &str, permissions: &[&str]) -> anyhow::Result<()> {
        let role_name = Self::role_name(company_id, role);

        for p in permissions {
            casbin_rule::new_policy(&role_name, p, action::ACCESS).insert(&*self.db).await?;
        }

        self.load_policies().await?;

        Ok(())
    }

    /// Get all roles of a company with their permissions, ordered by name
    pub async fn get_all_roles(&self, company_id: i64) -> anyhow::Result<Vec<RoleInfo>> {
        let prefix = Self::role_prefix(company_id);
        let rules = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("p"))
            .filter(casbin_rule::Column::V0.starts_with(&prefix))
            .all(&*self.db)
            .await?;

        let mut role_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for rule in rules {
            if let Some(name) = Self::extract_role_name(company_id, &rule.v0) {
                role_map.entry(name.to_string()).or_default().push(rule.v1.clone());
            }
        }

        Ok(role_map
            .into_iter()
            .map(|(name, permissions)| RoleInfo { name, permissions })
            .collect())
    }

    /// Update role (supports renaming and changing permissions)
    pub async fn update_role(
        &self,
        company_id: i64,
        old_name: &str,
        new_name: &str,
        permissions: &[&str],
    ) -> anyhow::Result<()> {
        let old_role_name = Self::role_name(company_id, old_name);
        let new_role_name = Self::role_name(company_id, new_name);
        let users = self.get_role_users(company_id, old_name).await?;

        casbin_rule::Entity::delete_many()
            .filter(casbin_rule::Column::V0.eq(&old_role_name).or(casbin_rule::Column::V1.eq(&old_role_name)))
            .exec(&*self.db)
            .await?;

        for p in permissions {
            casbin_rule::new_policy(&new_role_name, p, action::ACCESS).insert(&*self.db).await?;
        }
        for user in users {
            casbin_rule::new_grouping(&user, &new_role_name).insert(&*self.db).await?;
        }

        self.load_policies().await?;

        Ok(())
    }

    /// Delete a role and all its associations
    pub async fn delete_role(&self, company_id: i64, role: &str) -> anyhow::Result<()> {
        let role_name = Self::role_name(company_id, role);

        casbin_rule::Entity::delete_many()
            .filter(casbin_rule::Column::V0.eq(&role_name).or(casbin_rule::Column::V1.eq(&role_name)))
            .exec(&*self.db)
            .await?;

        self.load_policies().await?;

        Ok(())
    }

    /// Get user's assigned role (returns first role if multiple)
    pub async fn get_user_role(&self, company_id: i64, user: &str) -> anyhow::Result<Option<String>> {
        let rule = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("g"))
            .filter(casbin_rule::Column::V0.eq(user))
            .one(&*self.db)
            .await?;

        Ok(rule.and_then(|r| Self::extract_role_name(company_id, &r.v1).map(str::to_string)))
    }

    /// Get all users assigned to a role
    pub async fn get_role_users(&self, company_id: i64, role: &str) -> anyhow::Result<Vec<String>> {
        let rules = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("g"))
            .filter(casbin_rule::Column::V1.eq(Self::role_name(company_id, role)))
            .all(&*self.db)
            .await?;

        Ok(rules.into_iter().map(|r| r.v0).collect())
    }

    /// Set user's role (replace existing role)
    pub async fn set_user_role(&self, company_id: i64, user: &str, role: Option<&str>) -> anyhow::Result<()> {
        casbin_rule::Entity::delete_many()
            .filter(casbin_rule::Column::Ptype.eq("g"))
            .filter(casbin_rule::Column::V0.eq(user))
            .exec(&*self.db)
            .await?;

        if let Some(role) = role {
            casbin_rule::new_grouping(user, &Self::role_name(company_id, role))
                .insert(&*self.db)
                .await?;
        }

        self.load_policies().await?;

        Ok(())
    }

    /// Check if role exists
    pub async fn role_exists(&self, company_id: i64, role: &str) -> anyhow::Result<bool> {
        let exists = casbin_rule::Entity::find()
            .filter(casbin_rule::Column::Ptype.eq("p"))
            .filter(casbin_rule::Column::V0.eq(Self::role_name(company_id, role)))
            .one(&*self.db)
            .await?;

        Ok(exists.is_some())
    }

    /// Create the default roles of a company if they do not exist
    pub async fn ensure_default_roles(&self, company_id: i64) -> anyhow::Result<()> {
        for (role, permissions) in DEFAULT_ROLES {
            if !self.role_exists(company_id, role).await? {
                self.create_role(company_id, role, permissions).await?;
                tracing::info!("Created default role {} for company {}", role, company_id);
            }
        }

        Ok(())
    }
}

/// Role information
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoleInfo {
    pub name: String,
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, MockDatabase};

    fn rule(id: i64, ptype: &str, v0: &str, v1: &str, v2: Option<&str>) -> casbin_rule::Model {
        casbin_rule::Model {
            id,
            ptype: ptype.to_string(),
            v0: v0.to_string(),
            v1: v1.to_string(),
            v2: v2.map(str::to_string),
            v3: None,
            v4: None,
            v5: None,
        }
    }

    #[test]
    fn test_role_names() {
        assert_eq!(PermissionEnforcer::role_name(3, "hr"), "role:3:hr");
        assert_eq!(PermissionEnforcer::extract_role_name(3, "role:3:hr"), Some("hr"));
        assert_eq!(PermissionEnforcer::extract_role_name(4, "role:3:hr"), None);
        assert_eq!(PermissionEnforcer::extract_role_name(3, "alice"), None);
    }

    #[test]
    fn test_normalize_permissions() {
        let raw = vec![" trade".to_string(), "hr".to_string(), "bogus".to_string(), "hr".to_string()];
        assert_eq!(normalize_permissions(&raw), vec!["hr", "trade"]);
        // tenants is never assignable through roles
        assert!(normalize_permissions(&["tenants".to_string()]).is_empty());
    }

    #[tokio::test]
    async fn test_permissions_through_role_and_direct_policy() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![
                rule(1, "p", "role:1:hr", "hr", Some("access")),
                rule(2, "g", "alice", "role:1:hr", None),
                rule(3, "p", "bob", "inventory", Some("access")),
                rule(4, "p", "bob", "audit", Some("access")),
            ]])
            .into_connection();

        let enforcer = PermissionEnforcer::new(Arc::new(db)).await.unwrap();

        assert_eq!(enforcer.get_user_permissions("alice").await, vec!["hr"]);
        assert_eq!(enforcer.get_user_permissions("bob").await, vec!["inventory", "audit"]);
        assert!(enforcer.get_user_permissions("carol").await.is_empty());
    }
}
