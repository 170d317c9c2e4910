//! Stock movements and balances
//!
//! Every quantity change goes through [`post_movement`], which keeps three
//! things in step inside the caller's transaction: the per-warehouse
//! [`stock_balance`] rows, the item's `quantity_on_hand` and the append-only
//! [`stock_movement`] ledger.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use serde::Serialize;

use crate::entity::stock_movement::{self, MovementType, ReferenceType};
use crate::entity::{item, stock_balance, warehouse};
use crate::error::{AppError, AppResult, OptionExt};
use crate::scope::{find_scoped, scoped, Stamp};
use crate::validate;

/// One requested quantity change
#[derive(Debug, Clone)]
pub struct Movement {
    pub item_id: i64,
    pub warehouse_id: i64,
    pub to_warehouse_id: Option<i64>,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: Option<i64>,
    pub note: Option<String>,
}

impl Movement {
    pub fn manual(item_id: i64, warehouse_id: i64, movement_type: MovementType, quantity: Decimal) -> Self {
        Self {
            item_id,
            warehouse_id,
            to_warehouse_id: None,
            movement_type,
            quantity,
            reference_type: ReferenceType::Manual,
            reference_id: None,
            note: None,
        }
    }

    pub fn check(&self) -> AppResult<()> {
        validate::at_most("quantity", self.quantity.abs(), validate::max_quantity())?;
        match self.movement_type {
            MovementType::Adjustment => {
                if self.quantity.is_zero() {
                    return Err(AppError::Validation("adjustment quantity must not be zero".to_string()));
                }
            }
            _ => {
                if self.quantity <= Decimal::ZERO {
                    return Err(AppError::Validation("quantity must be greater than zero".to_string()));
                }
            }
        }

        match (self.movement_type, self.to_warehouse_id) {
            (MovementType::Transfer, None) => Err(AppError::Validation(
                "transfer requires a destination warehouse".to_string(),
            )),
            (MovementType::Transfer, Some(to)) if to == self.warehouse_id => Err(AppError::Validation(
                "transfer source and destination must differ".to_string(),
            )),
            (MovementType::Transfer, Some(_)) | (_, None) => Ok(()),
            (_, Some(_)) => Err(AppError::Validation(
                "only transfers take a destination warehouse".to_string(),
            )),
        }
    }

    /// Change applied to the source warehouse balance
    pub fn source_delta(&self) -> Decimal {
        match self.movement_type {
            MovementType::In | MovementType::Adjustment => self.quantity,
            MovementType::Out | MovementType::Transfer => -self.quantity,
        }
    }

    /// Change applied to the item's total across warehouses
    pub fn item_delta(&self) -> Decimal {
        match self.movement_type {
            MovementType::Transfer => Decimal::ZERO,
            _ => self.source_delta(),
        }
    }
}

/// New balance after applying `delta`
pub fn apply(balance: Decimal, delta: Decimal, allow_negative: bool) -> AppResult<Decimal> {
    let next = validate::sum("balance", balance, delta)?;
    if next < Decimal::ZERO && delta < Decimal::ZERO && !allow_negative {
        return Err(AppError::InsufficientStock(format!(
            "available {}, requested {}",
            balance, -delta
        )));
    }
    Ok(next)
}

fn balance_row(company_id: i64, item_id: i64, warehouse_id: i64) -> Select<stock_balance::Entity> {
    stock_balance::Entity::find()
        .filter(stock_balance::Column::CompanyId.eq(company_id))
        .filter(stock_balance::Column::ItemId.eq(item_id))
        .filter(stock_balance::Column::WarehouseId.eq(warehouse_id))
        .lock_exclusive()
}

/// Locked balance row of an item in a warehouse, created at zero when missing
async fn lock_balance<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    item_id: i64,
    warehouse_id: i64,
    stamp: Stamp,
) -> AppResult<stock_balance::Model> {
    if let Some(balance) = balance_row(company_id, item_id, warehouse_id).one(db).await? {
        return Ok(balance);
    }

    // A concurrent first movement may insert the same pair; whoever loses waits on the lock below
    let zero = stock_balance::ActiveModel {
        company_id: Set(company_id),
        item_id: Set(item_id),
        warehouse_id: Set(warehouse_id),
        quantity: Set(Decimal::ZERO),
        updated_at: Set(stamp.at),
        ..Default::default()
    };
    stock_balance::Entity::insert(zero)
        .on_conflict(
            OnConflict::columns([
                stock_balance::Column::CompanyId,
                stock_balance::Column::ItemId,
                stock_balance::Column::WarehouseId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    balance_row(company_id, item_id, warehouse_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal(format!("balance of item {} in warehouse {} vanished", item_id, warehouse_id)))
}

async fn store_balance<C: ConnectionTrait>(
    db: &C,
    balance: stock_balance::Model,
    quantity: Decimal,
    stamp: Stamp,
) -> AppResult<stock_balance::Model> {
    let mut active: stock_balance::ActiveModel = balance.into();
    active.quantity = Set(quantity);
    active.updated_at = Set(stamp.at);
    Ok(active.update(db).await?)
}

async fn require_warehouse<C: ConnectionTrait>(db: &C, company_id: i64, id: i64) -> AppResult<warehouse::Model> {
    find_scoped::<warehouse::Entity, _>(db, company_id, id)
        .await?
        .ok_or_not_found(format!("warehouse {} not found", id))
}

/// Apply one movement within the caller's transaction and append it to the ledger
pub async fn post_movement<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    movement: &Movement,
    allow_negative: bool,
    stamp: Stamp,
) -> AppResult<stock_movement::Model> {
    movement.check()?;

    let item = find_scoped::<item::Entity, _>(db, company_id, movement.item_id)
        .await?
        .ok_or_not_found(format!("item {} not found", movement.item_id))?;
    require_warehouse(db, company_id, movement.warehouse_id).await?;

    let source_after = match (movement.movement_type, movement.to_warehouse_id) {
        (MovementType::Transfer, Some(to)) => {
            require_warehouse(db, company_id, to).await?;

            // Fixed lock order keeps concurrent opposite transfers from deadlocking
            let (first, second) = if movement.warehouse_id < to {
                (movement.warehouse_id, to)
            } else {
                (to, movement.warehouse_id)
            };
            let first = lock_balance(db, company_id, item.id, first, stamp).await?;
            let second = lock_balance(db, company_id, item.id, second, stamp).await?;
            let (source, dest) = if first.warehouse_id == movement.warehouse_id {
                (first, second)
            } else {
                (second, first)
            };

            let source_after = apply(source.quantity, -movement.quantity, allow_negative)
                .map_err(|e| insufficient_for(e, &item))?;
            let dest_after = validate::sum("balance", dest.quantity, movement.quantity)?;
            store_balance(db, source, source_after, stamp).await?;
            store_balance(db, dest, dest_after, stamp).await?;
            source_after
        }
        _ => {
            let balance = lock_balance(db, company_id, item.id, movement.warehouse_id, stamp).await?;
            let after = apply(balance.quantity, movement.source_delta(), allow_negative)
                .map_err(|e| insufficient_for(e, &item))?;
            store_balance(db, balance, after, stamp).await?;
            after
        }
    };

    let item_delta = movement.item_delta();
    if !item_delta.is_zero() {
        item::Entity::update_many()
            .col_expr(
                item::Column::QuantityOnHand,
                Expr::col(item::Column::QuantityOnHand).add(item_delta),
            )
            .col_expr(item::Column::UpdatedAt, Expr::value(stamp.at))
            .filter(item::Column::Id.eq(item.id))
            .exec(db)
            .await?;
    }

    let entry = stock_movement::ActiveModel {
        company_id: Set(company_id),
        item_id: Set(item.id),
        warehouse_id: Set(movement.warehouse_id),
        to_warehouse_id: Set(movement.to_warehouse_id),
        movement_type: Set(movement.movement_type),
        quantity: Set(movement.quantity),
        balance_after: Set(source_after),
        reference_type: Set(movement.reference_type),
        reference_id: Set(movement.reference_id),
        note: Set(movement.note.clone()),
        created_at: Set(stamp.at),
        created_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::debug!(
        "Stock {:?} of {} x item {} in warehouse {}, balance now {}",
        movement.movement_type, movement.quantity, item.id, movement.warehouse_id, source_after
    );
    Ok(entry)
}

fn insufficient_for(err: AppError, item: &item::Model) -> AppError {
    match err {
        AppError::InsufficientStock(msg) => AppError::InsufficientStock(format!("{} ({}): {}", item.sku, item.name, msg)),
        other => other,
    }
}

/// Post a single movement in its own transaction
pub async fn move_stock(
    db: &DatabaseConnection,
    company_id: i64,
    movement: &Movement,
    allow_negative: bool,
    stamp: Stamp,
) -> AppResult<stock_movement::Model> {
    let txn = db.begin().await?;
    let entry = post_movement(&txn, company_id, movement, allow_negative, stamp).await?;
    txn.commit().await?;
    Ok(entry)
}

/// Stored balances, optionally narrowed to an item and/or warehouse
pub async fn balances<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    item_id: Option<i64>,
    warehouse_id: Option<i64>,
) -> AppResult<Vec<stock_balance::Model>> {
    let mut query = stock_balance::Entity::find().filter(stock_balance::Column::CompanyId.eq(company_id));
    if let Some(item_id) = item_id {
        query = query.filter(stock_balance::Column::ItemId.eq(item_id));
    }
    if let Some(warehouse_id) = warehouse_id {
        query = query.filter(stock_balance::Column::WarehouseId.eq(warehouse_id));
    }
    Ok(query
        .order_by_asc(stock_balance::Column::ItemId)
        .order_by_asc(stock_balance::Column::WarehouseId)
        .all(db)
        .await?)
}

/// Whether any warehouse holds a non-zero quantity for the filter
pub async fn has_stock<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    item_id: Option<i64>,
    warehouse_id: Option<i64>,
) -> AppResult<bool> {
    Ok(balances(db, company_id, item_id, warehouse_id)
        .await?
        .iter()
        .any(|b| !b.quantity.is_zero()))
}

fn accumulate<K: Ord>(balances: &mut BTreeMap<K, Decimal>, key: K, delta: Decimal) -> AppResult<()> {
    let entry = balances.entry(key).or_default();
    *entry = validate::sum("ledger balance", *entry, delta)?;
    Ok(())
}

/// Balance of every (item, warehouse) pair implied by the ledger
pub fn ledger_balances(movements: &[stock_movement::Model]) -> AppResult<BTreeMap<(i64, i64), Decimal>> {
    let mut balances = BTreeMap::new();
    for m in movements {
        match m.movement_type {
            MovementType::In | MovementType::Adjustment => {
                accumulate(&mut balances, (m.item_id, m.warehouse_id), m.quantity)?;
            }
            MovementType::Out => {
                accumulate(&mut balances, (m.item_id, m.warehouse_id), -m.quantity)?;
            }
            MovementType::Transfer => {
                accumulate(&mut balances, (m.item_id, m.warehouse_id), -m.quantity)?;
                if let Some(to) = m.to_warehouse_id {
                    accumulate(&mut balances, (m.item_id, to), m.quantity)?;
                }
            }
        }
    }
    Ok(balances)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub item_id: i64,
    /// None for an item total
    pub warehouse_id: Option<i64>,
    pub stored: Decimal,
    pub computed: Decimal,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub checked_balances: usize,
    pub checked_items: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub fixed: bool,
}

/// Compare stored balances and item totals with what the ledger implies
pub fn compare(
    ledger: &BTreeMap<(i64, i64), Decimal>,
    stored: &[stock_balance::Model],
    items: &[item::Model],
) -> AppResult<ReconcileReport> {
    let stored_map: HashMap<(i64, i64), Decimal> = stored
        .iter()
        .map(|b| ((b.item_id, b.warehouse_id), b.quantity))
        .collect();

    let mut keys: Vec<(i64, i64)> = ledger.keys().copied().collect();
    keys.extend(stored_map.keys().filter(|k| !ledger.contains_key(k)).copied());
    keys.sort_unstable();

    let mut report = ReconcileReport {
        checked_balances: keys.len(),
        checked_items: items.len(),
        ..Default::default()
    };

    for (item_id, warehouse_id) in keys {
        let stored = stored_map.get(&(item_id, warehouse_id)).copied().unwrap_or_default();
        let computed = ledger.get(&(item_id, warehouse_id)).copied().unwrap_or_default();
        if stored != computed {
            report.discrepancies.push(Discrepancy {
                item_id,
                warehouse_id: Some(warehouse_id),
                stored,
                computed,
            });
        }
    }

    let mut totals: BTreeMap<i64, Decimal> = BTreeMap::new();
    for ((item_id, _), qty) in ledger {
        accumulate(&mut totals, *item_id, *qty)?;
    }
    for item in items {
        let computed = totals.get(&item.id).copied().unwrap_or_default();
        if item.quantity_on_hand != computed {
            report.discrepancies.push(Discrepancy {
                item_id: item.id,
                warehouse_id: None,
                stored: item.quantity_on_hand,
                computed,
            });
        }
    }

    Ok(report)
}

/// Check stored stock against the ledger; with `fix`, rewrite what differs
pub async fn reconcile(
    db: &DatabaseConnection,
    company_id: i64,
    fix: bool,
    stamp: Stamp,
) -> AppResult<ReconcileReport> {
    let txn = db.begin().await?;

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::CompanyId.eq(company_id))
        .order_by_asc(stock_movement::Column::Id)
        .all(&txn)
        .await?;
    let stored = stock_balance::Entity::find()
        .filter(stock_balance::Column::CompanyId.eq(company_id))
        .lock_exclusive()
        .all(&txn)
        .await?;
    let items = scoped::<item::Entity>(company_id).all(&txn).await?;

    let ledger = ledger_balances(&movements)?;
    let mut report = compare(&ledger, &stored, &items)?;

    if fix && !report.discrepancies.is_empty() {
        let mut by_pair: HashMap<(i64, i64), stock_balance::Model> = stored
            .into_iter()
            .map(|b| ((b.item_id, b.warehouse_id), b))
            .collect();

        for d in &report.discrepancies {
            match d.warehouse_id {
                Some(warehouse_id) => match by_pair.remove(&(d.item_id, warehouse_id)) {
                    Some(balance) => {
                        store_balance(&txn, balance, d.computed, stamp).await?;
                    }
                    None => {
                        stock_balance::ActiveModel {
                            company_id: Set(company_id),
                            item_id: Set(d.item_id),
                            warehouse_id: Set(warehouse_id),
                            quantity: Set(d.computed),
                            updated_at: Set(stamp.at),
                            ..Default::default()
                        }
                        .insert(&txn)
                        .await?;
                    }
                },
                None => {
                    item::Entity::update_many()
                        .col_expr(item::Column::QuantityOnHand, Expr::value(d.computed))
                        .col_expr(item::Column::UpdatedAt, Expr::value(stamp.at))
                        .col_expr(item::Column::UpdatedBy, Expr::value(stamp.by))
                        .filter(item::Column::Id.eq(d.item_id))
                        .exec(&txn)
                        .await?;
                }
            }
        }
        report.fixed = true;
        tracing::warn!(
            "Stock reconcile for company {} rewrote {} values",
            company_id,
            report.discrepancies.len()
        );
    }

    txn.commit().await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DbBackend, MockDatabase, MockExecResult, QueryTrait};

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn item_model(id: i64, on_hand: i64) -> item::Model {
        item::Model {
            id,
            company_id: 1,
            sku: format!("SKU-{}", id),
            name: format!("Item {}", id),
            unit: "pcs".to_string(),
            cost_price: dec(5),
            sale_price: dec(8),
            reorder_level: Decimal::ZERO,
            quantity_on_hand: dec(on_hand),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn warehouse_model(id: i64) -> warehouse::Model {
        warehouse::Model {
            id,
            company_id: 1,
            branch_id: None,
            code: format!("WH{}", id),
            name: format!("Warehouse {}", id),
            address: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn balance(item_id: i64, warehouse_id: i64, qty: i64) -> stock_balance::Model {
        stock_balance::Model {
            id: item_id * 100 + warehouse_id,
            company_id: 1,
            item_id,
            warehouse_id,
            quantity: dec(qty),
            updated_at: Utc::now(),
        }
    }

    fn ledger_row(id: i64, movement_type: MovementType, wh: i64, to: Option<i64>, qty: i64) -> stock_movement::Model {
        stock_movement::Model {
            id,
            company_id: 1,
            item_id: 1,
            warehouse_id: wh,
            to_warehouse_id: to,
            movement_type,
            quantity: dec(qty),
            balance_after: Decimal::ZERO,
            reference_type: ReferenceType::Manual,
            reference_id: None,
            note: None,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    #[test]
    fn test_movement_check() {
        assert!(Movement::manual(1, 1, MovementType::In, dec(3)).check().is_ok());
        assert!(Movement::manual(1, 1, MovementType::Out, Decimal::ZERO).check().is_err());
        assert!(Movement::manual(1, 1, MovementType::Adjustment, dec(-2)).check().is_ok());
        assert!(Movement::manual(1, 1, MovementType::Adjustment, Decimal::ZERO).check().is_err());

        let mut transfer = Movement::manual(1, 1, MovementType::Transfer, dec(1));
        assert!(transfer.check().is_err());
        transfer.to_warehouse_id = Some(1);
        assert!(transfer.check().is_err());
        transfer.to_warehouse_id = Some(2);
        assert!(transfer.check().is_ok());

        let mut inbound = Movement::manual(1, 1, MovementType::In, dec(1));
        inbound.to_warehouse_id = Some(2);
        assert!(matches!(inbound.check(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_deltas() {
        assert_eq!(Movement::manual(1, 1, MovementType::In, dec(4)).source_delta(), dec(4));
        assert_eq!(Movement::manual(1, 1, MovementType::Out, dec(4)).source_delta(), dec(-4));
        assert_eq!(Movement::manual(1, 1, MovementType::Adjustment, dec(-4)).item_delta(), dec(-4));
        let transfer = Movement::manual(1, 1, MovementType::Transfer, dec(4));
        assert_eq!(transfer.source_delta(), dec(-4));
        assert_eq!(transfer.item_delta(), Decimal::ZERO);
    }

    #[test]
    fn test_apply() {
        assert_eq!(apply(dec(10), dec(-4), false).unwrap(), dec(6));
        assert_eq!(apply(dec(3), dec(-3), false).unwrap(), Decimal::ZERO);
        assert!(matches!(apply(dec(3), dec(-4), false), Err(AppError::InsufficientStock(_))));
        assert_eq!(apply(dec(3), dec(-4), true).unwrap(), dec(-1));
        // stock that is already negative can still be replenished
        assert_eq!(apply(dec(-5), dec(2), false).unwrap(), dec(-3));
        assert!(matches!(apply(Decimal::MAX, dec(1), true), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_oversized_movement_rejected() {
        let huge = validate::max_quantity() + dec(1);
        assert!(matches!(
            Movement::manual(1, 1, MovementType::In, huge).check(),
            Err(AppError::Validation(_))
        ));
        assert!(Movement::manual(1, 1, MovementType::Adjustment, -huge).check().is_err());
    }

    #[test]
    fn test_ledger_balances() {
        let rows = vec![
            ledger_row(1, MovementType::In, 1, None, 10),
            ledger_row(2, MovementType::Out, 1, None, 3),
            ledger_row(3, MovementType::Transfer, 1, Some(2), 4),
            ledger_row(4, MovementType::Adjustment, 2, None, -1),
        ];
        let balances = ledger_balances(&rows).unwrap();
        assert_eq!(balances.get(&(1, 1)), Some(&dec(3)));
        assert_eq!(balances.get(&(1, 2)), Some(&dec(3)));
    }

    #[test]
    fn test_compare_reports_discrepancies() {
        let rows = vec![
            ledger_row(1, MovementType::In, 1, None, 10),
            ledger_row(2, MovementType::Transfer, 1, Some(2), 4),
        ];
        let ledger = ledger_balances(&rows).unwrap();
        // warehouse 2 row missing, warehouse 1 row off by one, stray warehouse 3 row
        let stored = vec![balance(1, 1, 5), balance(1, 3, 2)];
        let items = vec![item_model(1, 10)];

        let report = compare(&ledger, &stored, &items).unwrap();
        assert_eq!(report.checked_balances, 3);
        assert_eq!(report.checked_items, 1);
        assert_eq!(
            report.discrepancies,
            vec![
                Discrepancy { item_id: 1, warehouse_id: Some(1), stored: dec(5), computed: dec(6) },
                Discrepancy { item_id: 1, warehouse_id: Some(2), stored: Decimal::ZERO, computed: dec(4) },
                Discrepancy { item_id: 1, warehouse_id: Some(3), stored: dec(2), computed: Decimal::ZERO },
            ]
        );

        let consistent = compare(&ledger, &[balance(1, 1, 6), balance(1, 2, 4)], &items).unwrap();
        assert!(consistent.discrepancies.is_empty());
    }

    #[tokio::test]
    async fn test_post_inbound_movement() {
        let mut posted = ledger_row(7, MovementType::In, 2, None, 5);
        posted.balance_after = dec(5);

        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![item_model(1, 0)]])
            .append_query_results([vec![warehouse_model(2)]])
            // no balance row yet: insert at zero, then lock the new row
            .append_query_results([Vec::<stock_balance::Model>::new()])
            .append_query_results([vec![balance(1, 2, 0)]])
            .append_query_results([vec![balance(1, 2, 5)]])
            .append_exec_results([
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
            ])
            .append_query_results([vec![posted]])
            .into_connection();

        let movement = Movement::manual(1, 2, MovementType::In, dec(5));
        let entry = post_movement(&db, 1, &movement, false, Stamp::now(1)).await.unwrap();
        assert_eq!(entry.balance_after, dec(5));

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
        assert!(log.contains("ON CONFLICT"));
        assert!(log.contains("DO NOTHING"));
    }

    #[tokio::test]
    async fn test_post_transfer_locks_in_warehouse_order() {
        let mut posted = ledger_row(8, MovementType::Transfer, 3, Some(2), 4);
        posted.balance_after = dec(6);

        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![item_model(1, 11)]])
            .append_query_results([vec![warehouse_model(3)]])
            .append_query_results([vec![warehouse_model(2)]])
            // lower warehouse id is locked first
            .append_query_results([vec![balance(1, 2, 1)]])
            .append_query_results([vec![balance(1, 3, 10)]])
            .append_query_results([vec![balance(1, 3, 6)]])
            .append_query_results([vec![balance(1, 2, 5)]])
            .append_query_results([vec![posted]])
            .into_connection();

        let mut movement = Movement::manual(1, 3, MovementType::Transfer, dec(4));
        movement.to_warehouse_id = Some(2);
        assert_eq!(movement.item_delta(), Decimal::ZERO);
        let entry = post_movement(&db, 1, &movement, false, Stamp::now(1)).await.unwrap();
        assert_eq!(entry.balance_after, dec(6));

        let log = format!("{:?}", db.into_transaction_log());
        let lock_of = |wh| format!("{:?}", balance_row(1, 1, wh).limit(1).build(DbBackend::Postgres));
        let first = log.find(&lock_of(2)).unwrap();
        let second = log.find(&lock_of(3)).unwrap();
        assert!(first < second);
        // source drops to 6, destination rises to 5, ledger records the source balance
        assert!(log.contains("Decimal(Some(6))"));
        assert!(log.contains("Decimal(Some(5))"));
        // a transfer leaves the item total alone
        assert!(!log.contains(r#"UPDATE \"erp_item\""#));
    }

    #[tokio::test]
    async fn test_transfer_rejects_insufficient_source() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![item_model(1, 3)]])
            .append_query_results([vec![warehouse_model(1)]])
            .append_query_results([vec![warehouse_model(2)]])
            .append_query_results([vec![balance(1, 1, 3)]])
            .append_query_results([vec![balance(1, 2, 0)]])
            .into_connection();

        let mut movement = Movement::manual(1, 1, MovementType::Transfer, dec(4));
        movement.to_warehouse_id = Some(2);
        let result = post_movement(&db, 1, &movement, false, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::InsufficientStock(_))));
    }

    #[tokio::test]
    async fn test_reconcile_fix_rewrites_and_inserts() {
        let rows = vec![
            ledger_row(1, MovementType::In, 1, None, 10),
            ledger_row(2, MovementType::Transfer, 1, Some(2), 4),
        ];
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([rows])
            // warehouse 1 is off by one and warehouse 2 has no row
            .append_query_results([vec![balance(1, 1, 5)]])
            // item total is off as well
            .append_query_results([vec![item_model(1, 9)]])
            .append_query_results([vec![balance(1, 1, 6)]])
            .append_query_results([vec![balance(1, 2, 4)]])
            .append_exec_results([MockExecResult { last_insert_id: 0, rows_affected: 1 }])
            .into_connection();

        let report = reconcile(&db, 1, true, Stamp::now(1)).await.unwrap();
        assert!(report.fixed);
        assert_eq!(
            report.discrepancies,
            vec![
                Discrepancy { item_id: 1, warehouse_id: Some(1), stored: dec(5), computed: dec(6) },
                Discrepancy { item_id: 1, warehouse_id: Some(2), stored: Decimal::ZERO, computed: dec(4) },
                Discrepancy { item_id: 1, warehouse_id: None, stored: dec(9), computed: dec(10) },
            ]
        );

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains(r#"UPDATE \"erp_stock_balance\""#));
        assert!(log.contains(r#"INSERT INTO \"erp_stock_balance\""#));
        assert!(log.contains(r#"UPDATE \"erp_item\""#));
    }

    #[tokio::test]
    async fn test_reconcile_check_only_writes_nothing() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![ledger_row(1, MovementType::In, 1, None, 10)]])
            .append_query_results([vec![balance(1, 1, 7)]])
            .append_query_results([vec![item_model(1, 10)]])
            .into_connection();

        let report = reconcile(&db, 1, false, Stamp::now(1)).await.unwrap();
        assert!(!report.fixed);
        assert_eq!(report.discrepancies.len(), 1);

        let log = format!("{:?}", db.into_transaction_log());
        // only the balance lock mentions UPDATE
        assert!(!log.contains(r#"UPDATE \"erp_"#));
        assert!(!log.contains("INSERT INTO"));
    }

    #[tokio::test]
    async fn test_post_outbound_rejects_insufficient_stock() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![item_model(1, 2)]])
            .append_query_results([vec![warehouse_model(2)]])
            .append_query_results([vec![balance(1, 2, 2)]])
            .into_connection();

        let movement = Movement::manual(1, 2, MovementType::Out, dec(3));
        let result = post_movement(&db, 1, &movement, false, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::InsufficientStock(_))));
    }

    #[tokio::test]
    async fn test_post_movement_unknown_item() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<item::Model>::new()])
            .into_connection();

        let movement = Movement::manual(9, 2, MovementType::In, dec(1));
        let result = post_movement(&db, 1, &movement, false, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
