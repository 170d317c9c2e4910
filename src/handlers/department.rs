//! Department handlers
//!
//! Departments form a tree per company. Each row caches its depth and the
//! slash-separated path of its ancestors; moves and renames refresh the
//! cached values of the whole subtree.

use std::collections::HashMap;

use axum::{response::Json, Extension};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;

use crate::entity::department::{self, build_tree, DepartmentTree};
use crate::entity::employee;
use crate::entity::op_log::OpType;
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::audit::service::log_outcome;
use crate::handlers::{delete_owned, find_owned, IdRequest, UpdateRequest};
use crate::middleware::auth::{perm, CurrentUser};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;
use crate::scope::{find_scoped, scoped, Stamp};
use crate::validate::{self, Validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRequest {
    pub name: String,
    /// 0 or absent for a top-level department
    pub parent_id: Option<i64>,
}

impl Validate for DepartmentRequest {
    fn validate(&self) -> AppResult<()> {
        validate::text("name", &self.name, 64)?;
        if self.name.contains('/') {
            return Err(AppError::Validation("name must not contain '/'".to_string()));
        }
        Ok(())
    }
}

impl DepartmentRequest {
    fn parent(&self) -> i64 {
        self.parent_id.unwrap_or(0)
    }
}

fn join_path(parent: &department::Model) -> String {
    if parent.parent_name.is_empty() {
        parent.name.clone()
    } else {
        format!("{}/{}", parent.parent_name, parent.name)
    }
}

/// Depth and ancestor path of every department, from the parent links alone.
/// A department whose parent is missing counts as top level.
pub fn derive_paths(departments: &[department::Model]) -> HashMap<i64, (i32, String)> {
    let by_id: HashMap<i64, &department::Model> = departments.iter().map(|d| (d.id, d)).collect();
    let mut out = HashMap::with_capacity(departments.len());

    for dept in departments {
        let mut names = Vec::new();
        let mut parent = dept.parent_id;
        while let Some(p) = by_id.get(&parent) {
            // corrupted links must not loop forever
            if names.len() >= departments.len() {
                break;
            }
            names.push(p.name.as_str());
            parent = p.parent_id;
        }
        names.reverse();
        out.insert(dept.id, (names.len() as i32 + 1, names.join("/")));
    }
    out
}

/// True when `candidate` is `ancestor` itself or lies below it
pub fn is_within(departments: &[department::Model], ancestor: i64, candidate: i64) -> bool {
    let parents: HashMap<i64, i64> = departments.iter().map(|d| (d.id, d.parent_id)).collect();
    let mut current = candidate;
    for _ in 0..=departments.len() {
        if current == ancestor {
            return true;
        }
        match parents.get(&current) {
            Some(&p) if p != 0 => current = p,
            _ => return false,
        }
    }
    false
}

async fn check_name_free<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    parent_id: i64,
    name: &str,
    except: Option<i64>,
) -> AppResult<()> {
    let mut select = scoped::<department::Entity>(company_id)
        .filter(department::Column::ParentId.eq(parent_id))
        .filter(department::Column::Name.eq(name));
    if let Some(id) = except {
        select = select.filter(department::Column::Id.ne(id));
    }
    if select.count(db).await? > 0 {
        return Err(AppError::Conflict(format!("department {} already exists here", name)));
    }
    Ok(())
}

/// Rewrite cached level and path of rows that no longer match the tree
async fn refresh_paths<C: ConnectionTrait>(db: &C, company_id: i64, stamp: Stamp) -> AppResult<usize> {
    let all = scoped::<department::Entity>(company_id).all(db).await?;
    let paths = derive_paths(&all);
    let mut changed = 0;

    for dept in all {
        let Some((level, parent_name)) = paths.get(&dept.id).cloned() else {
            continue;
        };
        if dept.level == level && dept.parent_name == parent_name {
            continue;
        }
        let mut active: department::ActiveModel = dept.into();
        active.level = Set(level);
        active.parent_name = Set(parent_name);
        active.updated_at = Set(stamp.at);
        active.updated_by = Set(stamp.by);
        active.update(db).await?;
        changed += 1;
    }
    Ok(changed)
}

/// Store the new name and parent, then refresh the cached paths in one transaction
async fn save_moved(
    db: &DbConn,
    existing: department::Model,
    name: &str,
    parent_id: i64,
    stamp: Stamp,
) -> AppResult<department::Model> {
    let cid = existing.company_id;
    let txn = db.begin().await?;

    let mut active: department::ActiveModel = existing.into();
    active.name = Set(name.to_string());
    active.parent_id = Set(parent_id);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    let id = active.update(&txn).await?.id;

    let changed = refresh_paths(&txn, cid, stamp).await?;
    tracing::debug!("Department {} updated, {} cached paths refreshed", id, changed);

    let updated = find_scoped::<department::Entity, _>(&txn, cid, id)
        .await?
        .ok_or_not_found(format!("department {} not found", id))?;
    txn.commit().await?;
    Ok(updated)
}

/// POST /api/department/add
pub async fn add_department(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<DepartmentRequest>,
) -> AppResult<Json<ApiResponse<department::Model>>> {
    current_user.require(perm::HR)?;
    req.validate()?;
    let cid = current_user.company_id;
    let parent_id = req.parent();

    let (level, parent_name) = if parent_id > 0 {
        let parent = find_owned::<department::Entity, _>(&*db, &current_user, parent_id, "parent department").await?;
        (parent.level + 1, join_path(&parent))
    } else {
        (1, String::new())
    };
    check_name_free(&*db, cid, parent_id, &req.name, None).await?;

    let stamp = Stamp::now(current_user.id);
    let result = department::ActiveModel {
        company_id: Set(cid),
        name: Set(req.name.clone()),
        level: Set(level),
        parent_id: Set(parent_id),
        parent_name: Set(parent_name),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(AppError::from);

    log_outcome(&current_user, OpType::CreateDept, &req.name, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/department/update - rename and/or move under another parent
pub async fn update_department(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateRequest<DepartmentRequest>>,
) -> AppResult<Json<ApiResponse<department::Model>>> {
    current_user.require(perm::HR)?;
    req.body.validate()?;
    let cid = current_user.company_id;
    let parent_id = req.body.parent();

    let existing = find_owned::<department::Entity, _>(&*db, &current_user, req.id, "department").await?;
    if parent_id > 0 && parent_id != existing.parent_id {
        find_owned::<department::Entity, _>(&*db, &current_user, parent_id, "parent department").await?;
        let all = scoped::<department::Entity>(cid).all(&*db).await?;
        if is_within(&all, existing.id, parent_id) {
            return Err(AppError::Validation(
                "a department cannot be moved below itself".to_string(),
            ));
        }
    }
    check_name_free(&*db, cid, parent_id, &req.body.name, Some(existing.id)).await?;

    let name = req.body.name;
    let result = save_moved(&db, existing, &name, parent_id, Stamp::now(current_user.id)).await;

    log_outcome(&current_user, OpType::UpdateDept, &name, &result);
    Ok(Json(ApiResponse::success(result?)))
}

/// POST /api/department/delete
pub async fn delete_department(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<IdRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::HR)?;
    let cid = current_user.company_id;

    let children = scoped::<department::Entity>(cid)
        .filter(department::Column::ParentId.eq(req.id))
        .count(&*db)
        .await?;
    if children > 0 {
        return Err(AppError::Conflict("department has sub-departments".to_string()));
    }
    let employees = scoped::<employee::Entity>(cid)
        .filter(employee::Column::DepartmentId.eq(req.id))
        .count(&*db)
        .await?;
    if employees > 0 {
        return Err(AppError::Conflict(format!("department has {} employees", employees)));
    }

    let result = delete_owned::<department::Entity, _>(&*db, &current_user, req.id, "department").await;
    log_outcome(&current_user, OpType::DeleteDept, &format!("department {}", req.id), &result);
    result?;
    Ok(Json(ApiResponse::success_msg("success")))
}

/// GET /api/department/query
pub async fn get_departments(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<department::Model>>>> {
    let departments = scoped::<department::Entity>(current_user.company_id)
        .order_by_asc(department::Column::Id)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(departments)))
}

/// GET /api/department/tree
pub async fn get_department_tree(
    Extension(db): Extension<DbConn>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<DepartmentTree>>>> {
    let departments = scoped::<department::Entity>(current_user.company_id)
        .all(&*db)
        .await?;
    Ok(Json(ApiResponse::success(build_tree(departments))))
}
