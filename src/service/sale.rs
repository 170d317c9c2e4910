//! Sale documents
//!
//! Confirming issues every line out of the document's warehouse and fails
//! as a whole when any line lacks stock. Cancelling a confirmed sale returns
//! the quantities.

use rust_decimal::Decimal;
use sea_orm::Set;

use crate::entity::sale::{self, DocumentStatus};
use crate::entity::sale_line;
use crate::scope::Stamp;
use crate::service::document::{
    DocumentInput, DocumentKind, DocumentTable, DocumentTotals, Head, HeaderColumns, LineAmounts, LineInput,
};

impl DocumentTable for sale::Entity {
    const KIND: DocumentKind = DocumentKind::Sale;

    type Active = sale::ActiveModel;
    type Line = sale_line::Entity;
    type ActiveLine = sale_line::ActiveModel;

    fn columns() -> HeaderColumns<sale::Column> {
        HeaderColumns {
            number: sale::Column::Number,
            status: sale::Column::Status,
            partner: sale::Column::PartnerId,
            warehouse: sale::Column::WarehouseId,
            doc_date: sale::Column::DocDate,
        }
    }

    fn line_parent() -> sale_line::Column {
        sale_line::Column::SaleId
    }

    fn line_id() -> sale_line::Column {
        sale_line::Column::Id
    }

    fn head(doc: &sale::Model) -> Head<'_> {
        Head {
            id: doc.id,
            number: &doc.number,
            warehouse_id: doc.warehouse_id,
            status: doc.status,
        }
    }

    fn line_stock(line: &sale_line::Model) -> (i64, Decimal) {
        (line.item_id, line.quantity)
    }

    fn new_header(
        company_id: i64,
        number: String,
        input: &DocumentInput,
        totals: DocumentTotals,
        stamp: Stamp,
    ) -> sale::ActiveModel {
        sale::ActiveModel {
            company_id: Set(company_id),
            branch_id: Set(input.branch_id),
            number: Set(number),
            partner_id: Set(input.partner_id),
            warehouse_id: Set(input.warehouse_id),
            doc_date: Set(input.doc_date),
            status: Set(DocumentStatus::Draft),
            subtotal: Set(totals.subtotal),
            tax_total: Set(totals.tax_total),
            total: Set(totals.total),
            note: Set(input.note.clone()),
            created_at: Set(stamp.at),
            updated_at: Set(stamp.at),
            created_by: Set(stamp.by),
            updated_by: Set(stamp.by),
            ..Default::default()
        }
    }

    fn edit_header(
        doc: sale::Model,
        input: &DocumentInput,
        totals: DocumentTotals,
        stamp: Stamp,
    ) -> sale::ActiveModel {
        let mut active: sale::ActiveModel = doc.into();
        active.branch_id = Set(input.branch_id);
        active.partner_id = Set(input.partner_id);
        active.warehouse_id = Set(input.warehouse_id);
        active.doc_date = Set(input.doc_date);
        active.note = Set(input.note.clone());
        active.subtotal = Set(totals.subtotal);
        active.tax_total = Set(totals.tax_total);
        active.total = Set(totals.total);
        active.updated_at = Set(stamp.at);
        active.updated_by = Set(stamp.by);
        active
    }

    fn with_status(doc: sale::Model, status: DocumentStatus, stamp: Stamp) -> sale::ActiveModel {
        let mut active: sale::ActiveModel = doc.into();
        active.status = Set(status);
        active.updated_at = Set(stamp.at);
        active.updated_by = Set(stamp.by);
        active
    }

    fn new_line(doc: &sale::Model, line: &LineInput, amounts: LineAmounts, stamp: Stamp) -> sale_line::ActiveModel {
        sale_line::ActiveModel {
            company_id: Set(doc.company_id),
            sale_id: Set(doc.id),
            item_id: Set(line.item_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            tax_rate: Set(line.tax_rate),
            line_total: Set(amounts.line_total),
            tax_amount: Set(amounts.tax_amount),
            created_at: Set(stamp.at),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::partner::{self, PartnerKind};
    use crate::entity::{item, stock_balance, stock_movement, warehouse};
    use crate::error::AppError;
    use crate::service::document::{cancel, confirm, create, update};
    use chrono::{NaiveDate, Utc};
    use sea_orm::{DbBackend, MockDatabase, MockExecResult};

    type Doc = sale::Entity;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn partner_model(kind: PartnerKind) -> partner::Model {
        partner::Model {
            id: 3,
            company_id: 1,
            kind,
            code: "ACME".to_string(),
            name: "Acme".to_string(),
            email: None,
            phone: None,
            address: None,
            tax_number: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn warehouse_model() -> warehouse::Model {
        warehouse::Model {
            id: 2,
            company_id: 1,
            branch_id: None,
            code: "MAIN".to_string(),
            name: "Main".to_string(),
            address: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn item_model() -> item::Model {
        item::Model {
            id: 1,
            company_id: 1,
            sku: "BOLT".to_string(),
            name: "Bolt".to_string(),
            unit: "pcs".to_string(),
            cost_price: dec(1),
            sale_price: dec(2),
            reorder_level: Decimal::ZERO,
            quantity_on_hand: Decimal::ZERO,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn header(number: &str, status: DocumentStatus) -> sale::Model {
        sale::Model {
            id: 11,
            company_id: 1,
            branch_id: None,
            number: number.to_string(),
            partner_id: 3,
            warehouse_id: 2,
            doc_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            status,
            subtotal: dec(20),
            tax_total: dec(2),
            total: dec(22),
            note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn line_model() -> sale_line::Model {
        sale_line::Model {
            id: 1,
            company_id: 1,
            sale_id: 11,
            item_id: 1,
            quantity: dec(10),
            unit_price: dec(2),
            tax_rate: dec(10),
            line_total: dec(20),
            tax_amount: dec(2),
            created_at: Utc::now(),
        }
    }

    fn input() -> DocumentInput {
        DocumentInput {
            partner_id: 3,
            warehouse_id: 2,
            branch_id: None,
            doc_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            note: None,
            lines: vec![LineInput {
                item_id: 1,
                quantity: dec(10),
                unit_price: dec(2),
                tax_rate: dec(10),
            }],
        }
    }

    fn balance(quantity: i64) -> stock_balance::Model {
        stock_balance::Model {
            id: 1,
            company_id: 1,
            item_id: 1,
            warehouse_id: 2,
            quantity: dec(quantity),
            updated_at: Utc::now(),
        }
    }

    fn movement(movement_type: stock_movement::MovementType) -> stock_movement::Model {
        stock_movement::Model {
            id: 1,
            company_id: 1,
            item_id: 1,
            warehouse_id: 2,
            to_warehouse_id: None,
            movement_type,
            quantity: dec(10),
            balance_after: Decimal::ZERO,
            reference_type: stock_movement::ReferenceType::Sale,
            reference_id: Some(11),
            note: None,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    #[tokio::test]
    async fn test_create_numbers_after_last_document() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![partner_model(PartnerKind::Customer)]])
            .append_query_results([vec![warehouse_model()]])
            .append_query_results([vec![item_model()]])
            .append_query_results([vec![header("SO-2024-00003", DocumentStatus::Confirmed)]])
            .append_query_results([vec![header("SO-2024-00004", DocumentStatus::Draft)]])
            .append_query_results([vec![line_model()]])
            .into_connection();

        let detail = create::<Doc>(&db, 1, &input(), Stamp::now(1)).await.unwrap();
        assert_eq!(detail.lines.len(), 1);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("SO-2024-00004"));
        assert!(log.contains("CHAR_LENGTH"));
    }

    #[tokio::test]
    async fn test_create_rejects_supplier_partner() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![partner_model(PartnerKind::Supplier)]])
            .into_connection();

        let result = create::<Doc>(&db, 1, &input(), Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_requires_draft() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![header("SO-2024-00001", DocumentStatus::Confirmed)]])
            .into_connection();

        let result = update::<Doc>(&db, 1, 11, &input(), Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
    }

    #[tokio::test]
    async fn test_confirm_rejects_insufficient_stock() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![header("SO-2024-00001", DocumentStatus::Draft)]])
            .append_query_results([vec![line_model()]])
            .append_query_results([vec![item_model()]])
            .append_query_results([vec![warehouse_model()]])
            .append_query_results([vec![balance(4)]])
            .into_connection();

        let result = confirm::<Doc>(&db, 1, 11, false, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::InsufficientStock(_))));

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
        assert!(!log.contains(r#"UPDATE \"erp_sale\""#));
    }

    #[tokio::test]
    async fn test_confirm_issues_lines() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![header("SO-2024-00001", DocumentStatus::Draft)]])
            .append_query_results([vec![line_model()]])
            .append_query_results([vec![item_model()]])
            .append_query_results([vec![warehouse_model()]])
            .append_query_results([vec![balance(12)]])
            .append_query_results([vec![balance(2)]])
            .append_exec_results([exec_ok()])
            .append_query_results([vec![movement(stock_movement::MovementType::Out)]])
            .append_query_results([vec![header("SO-2024-00001", DocumentStatus::Confirmed)]])
            .into_connection();

        let doc = confirm::<Doc>(&db, 1, 11, false, Stamp::now(1)).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Confirmed);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains(r#"String(Some("out"))"#));
    }

    #[tokio::test]
    async fn test_cancel_confirmed_returns_stock() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![header("SO-2024-00001", DocumentStatus::Confirmed)]])
            .append_query_results([vec![line_model()]])
            .append_query_results([vec![item_model()]])
            .append_query_results([vec![warehouse_model()]])
            .append_query_results([vec![balance(0)]])
            .append_query_results([vec![balance(10)]])
            .append_exec_results([exec_ok()])
            .append_query_results([vec![movement(stock_movement::MovementType::In)]])
            .append_query_results([vec![header("SO-2024-00001", DocumentStatus::Cancelled)]])
            .into_connection();

        let doc = cancel::<Doc>(&db, 1, 11, false, Stamp::now(1)).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Cancelled);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
        assert!(log.contains("SO-2024-00001 cancelled"));
        assert!(log.contains(r#"String(Some("in"))"#));
    }

    #[tokio::test]
    async fn test_cancel_draft_posts_nothing() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![header("SO-2024-00002", DocumentStatus::Draft)]])
            .append_query_results([vec![header("SO-2024-00002", DocumentStatus::Cancelled)]])
            .into_connection();

        let doc = cancel::<Doc>(&db, 1, 11, false, Stamp::now(1)).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Cancelled);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(!log.contains("erp_stock_movement"));
    }
}
