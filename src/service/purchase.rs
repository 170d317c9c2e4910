//! Purchase documents
//!
//! Confirming receives every line into the document's warehouse.
//! Cancelling a confirmed purchase issues the same quantities back out.

use rust_decimal::Decimal;
use sea_orm::Set;

use crate::entity::purchase::{self, DocumentStatus};
use crate::entity::purchase_line;
use crate::scope::Stamp;
use crate::service::document::{
    DocumentInput, DocumentKind, DocumentTable, DocumentTotals, Head, HeaderColumns, LineAmounts, LineInput,
};

impl DocumentTable for purchase::Entity {
    const KIND: DocumentKind = DocumentKind::Purchase;

    type Active = purchase::ActiveModel;
    type Line = purchase_line::Entity;
    type ActiveLine = purchase_line::ActiveModel;

    fn columns() -> HeaderColumns<purchase::Column> {
        HeaderColumns {
            number: purchase::Column::Number,
            status: purchase::Column::Status,
            partner: purchase::Column::PartnerId,
            warehouse: purchase::Column::WarehouseId,
            doc_date: purchase::Column::DocDate,
        }
    }

    fn line_parent() -> purchase_line::Column {
        purchase_line::Column::PurchaseId
    }

    fn line_id() -> purchase_line::Column {
        purchase_line::Column::Id
    }

    fn head(doc: &purchase::Model) -> Head<'_> {
        Head {
            id: doc.id,
            number: &doc.number,
            warehouse_id: doc.warehouse_id,
            status: doc.status,
        }
    }

    fn line_stock(line: &purchase_line::Model) -> (i64, Decimal) {
        (line.item_id, line.quantity)
    }

    fn new_header(
        company_id: i64,
        number: String,
        input: &DocumentInput,
        totals: DocumentTotals,
        stamp: Stamp,
    ) -> purchase::ActiveModel {
        purchase::ActiveModel {
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
        doc: purchase::Model,
        input: &DocumentInput,
        totals: DocumentTotals,
        stamp: Stamp,
    ) -> purchase::ActiveModel {
        let mut active: purchase::ActiveModel = doc.into();
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

    fn with_status(doc: purchase::Model, status: DocumentStatus, stamp: Stamp) -> purchase::ActiveModel {
        let mut active: purchase::ActiveModel = doc.into();
        active.status = Set(status);
        active.updated_at = Set(stamp.at);
        active.updated_by = Set(stamp.by);
        active
    }

    fn new_line(doc: &purchase::Model, line: &LineInput, amounts: LineAmounts, stamp: Stamp) -> purchase_line::ActiveModel {
        purchase_line::ActiveModel {
            company_id: Set(doc.company_id),
            purchase_id: Set(doc.id),
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
