//! Tenant provisioning
//!
//! On an empty database the first company and its administrator are created
//! from `[bootstrap]`. The same path serves `POST /api/company/add`.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::config::BootstrapConfig;
use crate::entity::user::UserStatus;
use crate::entity::{company, user};
use crate::error::{AppError, AppResult};
use crate::handlers::auth::hash_password;
use crate::permission::{perm, PermissionEnforcer};
use crate::scope::Stamp;

/// Role given to the administrator of a new company
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub code: String,
    pub currency: String,
    pub tax_number: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub password: String,
    pub full_name: String,
}

/// Create a company, its administrator and its default roles
pub async fn provision_company(
    db: &DatabaseConnection,
    perm_enforcer: &PermissionEnforcer,
    new_company: NewCompany,
    admin: NewAdmin,
    stamp: Stamp,
) -> AppResult<(company::Model, user::Model)> {
    let password = hash_password(&admin.password)?;

    let txn = db.begin().await?;

    let taken = company::Entity::find()
        .filter(company::Column::Name.eq(&new_company.name))
        .one(&txn)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict(format!("company {} already exists", new_company.name)));
    }
    let taken = user::Entity::find()
        .filter(user::Column::Username.eq(&admin.username))
        .one(&txn)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict(format!("username {} already exists", admin.username)));
    }

    let company = company::ActiveModel {
        name: Set(new_company.name),
        code: Set(new_company.code),
        tax_number: Set(new_company.tax_number),
        address: Set(new_company.address),
        currency: Set(new_company.currency),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let admin_user = user::ActiveModel {
        company_id: Set(company.id),
        username: Set(admin.username),
        password: Set(password),
        full_name: Set(admin.full_name),
        email: Set(None),
        branch_id: Set(None),
        status: Set(UserStatus::Inactive.into()),
        last_login: Set(0),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    perm_enforcer.ensure_default_roles(company.id).await?;
    perm_enforcer
        .set_user_role(company.id, &admin_user.username, Some(ADMIN_ROLE))
        .await?;

    tracing::info!(
        "Provisioned company {} ({}) with administrator {}",
        company.name, company.id, admin_user.username
    );
    Ok((company, admin_user))
}

/// Provision the first tenant when the database has no company yet
pub async fn run(
    db: &DatabaseConnection,
    perm_enforcer: &PermissionEnforcer,
    config: &BootstrapConfig,
) -> anyhow::Result<()> {
    if let Some(existing) = company::Entity::find().one(db).await? {
        tracing::debug!("Company {} exists, skipping bootstrap", existing.name);
        return Ok(());
    }

    let new_company = NewCompany {
        name: config.company_name.clone(),
        code: config.company_code.clone(),
        currency: config.currency.clone(),
        tax_number: None,
        address: None,
    };
    let admin = NewAdmin {
        username: config.admin_username.clone(),
        password: config.admin_password.clone(),
        full_name: "Administrator".to_string(),
    };

    let (_, admin_user) = provision_company(db, perm_enforcer, new_company, admin, Stamp::system())
        .await
        .map_err(|e| anyhow::anyhow!("bootstrap failed: {}", e))?;

    // The first administrator may provision further companies
    perm_enforcer
        .set_permissions(&admin_user.username, &[perm::TENANTS])
        .await?;

    if config.admin_password == BootstrapConfig::default().admin_password {
        tracing::warn!(
            "Administrator {} uses the default password, change it after first login",
            admin_user.username
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DbBackend, MockDatabase};

    fn company_model() -> company::Model {
        company::Model {
            id: 1,
            name: "Acme".to_string(),
            code: "ACME".to_string(),
            tax_number: None,
            address: None,
            currency: "USD".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    async fn enforcer() -> PermissionEnforcer {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<crate::entity::casbin_rule::Model>::new()])
            .into_connection();
        PermissionEnforcer::new(std::sync::Arc::new(db)).await.unwrap()
    }

    #[tokio::test]
    async fn test_run_skips_existing_company() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![company_model()]])
            .into_connection();

        let perm_enforcer = enforcer().await;
        run(&db, &perm_enforcer, &BootstrapConfig::default()).await.unwrap();

        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn test_provision_rejects_duplicate_company() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![company_model()]])
            .into_connection();

        let new_company = NewCompany {
            name: "Acme".to_string(),
            code: "ACME".to_string(),
            currency: "USD".to_string(),
            tax_number: None,
            address: None,
        };
        let admin = NewAdmin {
            username: "root".to_string(),
            password: "secret123".to_string(),
            full_name: "Root".to_string(),
        };
        let result = provision_company(&db, &enforcer().await, new_company, admin, Stamp::system()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
