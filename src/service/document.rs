//! Purchase and sale documents
//!
//! Both kinds share one workflow. Confirming a draft posts one stock
//! movement per line; cancelling a confirmed document posts the reversing
//! movements. [`DocumentTable`] binds a kind to its header and line tables.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::{Func, SimpleExpr};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entity::partner::PartnerKind;
use crate::entity::purchase::DocumentStatus;
use crate::entity::stock_movement::{MovementType, ReferenceType};
use crate::entity::{item, partner, warehouse};
use crate::error::{AppError, AppResult, OptionExt};
use crate::scope::{find_scoped, find_scoped_for_update, soft_delete, Stamp, Tenanted};
use crate::service::inventory::{self, Movement};
use crate::validate::{self, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Purchase,
    Sale,
}

impl DocumentKind {
    /// Name used in messages and audit descriptions
    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::Purchase => "purchase",
            DocumentKind::Sale => "sale",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Purchase => "PO",
            DocumentKind::Sale => "SO",
        }
    }

    /// Movement posted per line on confirmation
    pub fn confirm_movement(self) -> MovementType {
        match self {
            DocumentKind::Purchase => MovementType::In,
            DocumentKind::Sale => MovementType::Out,
        }
    }

    /// Movement that undoes a confirmed line
    pub fn reverse_movement(self) -> MovementType {
        match self {
            DocumentKind::Purchase => MovementType::Out,
            DocumentKind::Sale => MovementType::In,
        }
    }

    pub fn reference_type(self) -> ReferenceType {
        match self {
            DocumentKind::Purchase => ReferenceType::Purchase,
            DocumentKind::Sale => ReferenceType::Sale,
        }
    }

    pub fn accepts(self, kind: PartnerKind) -> bool {
        match self {
            DocumentKind::Purchase => kind.can_supply(),
            DocumentKind::Sale => kind.can_buy(),
        }
    }

    /// `PO-2024-00001`
    pub fn number(self, year: i32, seq: i64) -> String {
        format!("{}-{}-{:05}", self.prefix(), year, seq)
    }

    pub fn number_prefix(self, year: i32) -> String {
        format!("{}-{}-", self.prefix(), year)
    }

    /// Sequence following the highest number issued in `year`
    pub fn next_sequence(self, last: Option<&str>, year: i32) -> i64 {
        last.and_then(|n| n.strip_prefix(&self.number_prefix(year)))
            .and_then(|seq| seq.parse::<i64>().ok())
            .map_or(1, |seq| seq + 1)
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInput {
    pub item_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percent
    #[serde(default)]
    pub tax_rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub line_total: Decimal,
    pub tax_amount: Decimal,
}

impl LineInput {
    pub fn amounts(&self) -> AppResult<LineAmounts> {
        let line_total = round2(validate::product("lineTotal", self.quantity, self.unit_price)?);
        validate::at_most("lineTotal", line_total, validate::max_amount())?;
        let tax = validate::product("taxAmount", line_total, self.tax_rate)?;
        Ok(LineAmounts {
            line_total,
            tax_amount: round2(tax / Decimal::ONE_HUNDRED),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

pub fn totals(lines: &[LineInput]) -> AppResult<DocumentTotals> {
    let mut totals = DocumentTotals::default();
    for line in lines {
        let amounts = line.amounts()?;
        totals.subtotal = validate::sum("subtotal", totals.subtotal, amounts.line_total)?;
        totals.tax_total = validate::sum("taxTotal", totals.tax_total, amounts.tax_amount)?;
    }
    totals.total = validate::sum("total", totals.subtotal, totals.tax_total)?;
    Ok(totals)
}

pub const MAX_LINES: usize = 1000;

/// Body of `add` and `update` for both document types
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    pub partner_id: i64,
    pub warehouse_id: i64,
    pub branch_id: Option<i64>,
    pub doc_date: NaiveDate,
    pub note: Option<String>,
    pub lines: Vec<LineInput>,
}

impl Validate for DocumentInput {
    fn validate(&self) -> AppResult<()> {
        if self.lines.is_empty() {
            return Err(AppError::Validation("a document needs at least one line".to_string()));
        }
        if self.lines.len() > MAX_LINES {
            return Err(AppError::Validation(format!("a document has at most {} lines", MAX_LINES)));
        }
        validate::optional_text("note", self.note.as_deref(), 500)?;
        for line in &self.lines {
            validate::positive("quantity", line.quantity)?;
            validate::at_most("quantity", line.quantity, validate::max_quantity())?;
            validate::non_negative("unitPrice", line.unit_price)?;
            validate::at_most("unitPrice", line.unit_price, validate::max_amount())?;
            validate::non_negative("taxRate", line.tax_rate)?;
            if line.tax_rate > Decimal::ONE_HUNDRED {
                return Err(AppError::Validation("taxRate must not exceed 100".to_string()));
            }
        }
        Ok(())
    }
}

pub fn check_editable(status: DocumentStatus) -> AppResult<()> {
    if status == DocumentStatus::Draft {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!("document is {:?}, only drafts can change", status)))
    }
}

pub fn check_confirmable(status: DocumentStatus) -> AppResult<()> {
    if status == DocumentStatus::Draft {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!("document is {:?}, only drafts can be confirmed", status)))
    }
}

/// Whether cancelling needs reversing movements
pub fn check_cancellable(status: DocumentStatus) -> AppResult<bool> {
    match status {
        DocumentStatus::Draft => Ok(false),
        DocumentStatus::Confirmed => Ok(true),
        DocumentStatus::Cancelled => Err(AppError::InvalidState("document is already cancelled".to_string())),
    }
}

/// Partner, warehouse and items must be live rows of the company
pub async fn check_references<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    kind: DocumentKind,
    input: &DocumentInput,
) -> AppResult<()> {
    let partner = find_scoped::<partner::Entity, _>(db, company_id, input.partner_id)
        .await?
        .ok_or_not_found(format!("partner {} not found", input.partner_id))?;
    if !kind.accepts(partner.kind) {
        return Err(AppError::Validation(format!(
            "partner {} cannot be used on a {:?} document",
            partner.code, kind
        )));
    }

    find_scoped::<warehouse::Entity, _>(db, company_id, input.warehouse_id)
        .await?
        .ok_or_not_found(format!("warehouse {} not found", input.warehouse_id))?;

    for line in &input.lines {
        let item = find_scoped::<item::Entity, _>(db, company_id, line.item_id)
            .await?
            .ok_or_not_found(format!("item {} not found", line.item_id))?;
        if !item.is_active {
            return Err(AppError::Validation(format!("item {} is inactive", item.sku)));
        }
    }
    Ok(())
}

/// The document whose lines are posted to stock
#[derive(Debug, Clone, Copy)]
pub struct Posting<'a> {
    pub kind: DocumentKind,
    pub document_id: i64,
    pub number: &'a str,
    pub warehouse_id: i64,
    /// Post the reversing movement type instead
    pub reverse: bool,
}

/// Post one movement per `(item_id, quantity)` line of a document
pub async fn post_lines<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    posting: Posting<'_>,
    lines: &[(i64, Decimal)],
    allow_negative: bool,
    stamp: Stamp,
) -> AppResult<()> {
    let kind = posting.kind;
    let (movement_type, note) = if posting.reverse {
        (kind.reverse_movement(), format!("{} cancelled", posting.number))
    } else {
        (kind.confirm_movement(), posting.number.to_string())
    };

    for (item_id, quantity) in lines {
        let movement = Movement {
            item_id: *item_id,
            warehouse_id: posting.warehouse_id,
            to_warehouse_id: None,
            movement_type,
            quantity: *quantity,
            reference_type: kind.reference_type(),
            reference_id: Some(posting.document_id),
            note: Some(note.clone()),
        };
        inventory::post_movement(db, company_id, &movement, allow_negative, stamp).await?;
    }
    Ok(())
}


/// Header columns the shared queries filter and sort on
pub struct HeaderColumns<C> {
    pub number: C,
    pub status: C,
    pub partner: C,
    pub warehouse: C,
    pub doc_date: C,
}

/// Header fields the workflow reads
#[derive(Debug, Clone, Copy)]
pub struct Head<'a> {
    pub id: i64,
    pub number: &'a str,
    pub warehouse_id: i64,
    pub status: DocumentStatus,
}

pub type LineOf<D> = <<D as DocumentTable>::Line as EntityTrait>::Model;

/// Header and line tables of one document kind
pub trait DocumentTable: Tenanted {
    const KIND: DocumentKind;

    type Active: ActiveModelTrait<Entity = Self> + ActiveModelBehavior + Send + 'static;
    type Line: EntityTrait;
    type ActiveLine: ActiveModelTrait<Entity = Self::Line> + ActiveModelBehavior + Send + 'static;

    fn columns() -> HeaderColumns<Self::Column>;
    /// Line column referencing the header
    fn line_parent() -> <Self::Line as EntityTrait>::Column;
    fn line_id() -> <Self::Line as EntityTrait>::Column;

    fn head(doc: &Self::Model) -> Head<'_>;
    /// `(item_id, quantity)` posted for a line
    fn line_stock(line: &LineOf<Self>) -> (i64, Decimal);

    fn new_header(
        company_id: i64,
        number: String,
        input: &DocumentInput,
        totals: DocumentTotals,
        stamp: Stamp,
    ) -> Self::Active;
    fn edit_header(doc: Self::Model, input: &DocumentInput, totals: DocumentTotals, stamp: Stamp) -> Self::Active;
    fn with_status(doc: Self::Model, status: DocumentStatus, stamp: Stamp) -> Self::Active;
    fn new_line(doc: &Self::Model, line: &LineInput, amounts: LineAmounts, stamp: Stamp) -> Self::ActiveLine;
}

#[derive(Debug, Serialize)]
pub struct DocumentDetail<H, L> {
    #[serde(flatten)]
    pub header: H,
    pub lines: Vec<L>,
}

pub type Detail<D> = DocumentDetail<<D as EntityTrait>::Model, LineOf<D>>;

/// Next number of the year. Deleted drafts keep their numbers.
async fn next_number<D: DocumentTable, C: ConnectionTrait>(db: &C, company_id: i64, year: i32) -> AppResult<String> {
    let number = D::columns().number;
    // a longer sequence sorts after every shorter one
    let last = D::find()
        .filter(D::company_column().eq(company_id))
        .filter(number.starts_with(D::KIND.number_prefix(year)))
        .order_by_desc(SimpleExpr::from(Func::char_length(number.into_expr())))
        .order_by_desc(number)
        .one(db)
        .await?;
    let seq = D::KIND.next_sequence(last.as_ref().map(|doc| D::head(doc).number), year);
    Ok(D::KIND.number(year, seq))
}

async fn insert_lines<D, C>(db: &C, doc: &D::Model, lines: &[LineInput], stamp: Stamp) -> AppResult<Vec<LineOf<D>>>
where
    D: DocumentTable,
    C: ConnectionTrait,
    LineOf<D>: IntoActiveModel<D::ActiveLine>,
{
    let mut saved = Vec::with_capacity(lines.len());
    for line in lines {
        let amounts = line.amounts()?;
        saved.push(D::new_line(doc, line, amounts, stamp).insert(db).await?);
    }
    Ok(saved)
}

pub async fn lines<D: DocumentTable, C: ConnectionTrait>(db: &C, document_id: i64) -> AppResult<Vec<LineOf<D>>> {
    Ok(<D::Line as EntityTrait>::find()
        .filter(D::line_parent().eq(document_id))
        .order_by_asc(D::line_id())
        .all(db)
        .await?)
}

fn not_found<D: DocumentTable>(id: i64) -> String {
    format!("{} {} not found", D::KIND.label(), id)
}

/// Header locked until the transaction ends
async fn lock<D: DocumentTable, C: ConnectionTrait>(db: &C, company_id: i64, id: i64) -> AppResult<D::Model> {
    find_scoped_for_update::<D, _>(db, company_id, id)
        .await?
        .ok_or_not_found(not_found::<D>(id))
}

pub async fn detail<D: DocumentTable, C: ConnectionTrait>(db: &C, company_id: i64, id: i64) -> AppResult<Detail<D>> {
    let header = find_scoped::<D, _>(db, company_id, id)
        .await?
        .ok_or_not_found(not_found::<D>(id))?;
    let lines = lines::<D, _>(db, D::head(&header).id).await?;
    Ok(DocumentDetail { header, lines })
}

pub async fn create<D>(db: &DatabaseConnection, company_id: i64, input: &DocumentInput, stamp: Stamp) -> AppResult<Detail<D>>
where
    D: DocumentTable,
    D::Model: IntoActiveModel<D::Active>,
    LineOf<D>: IntoActiveModel<D::ActiveLine>,
{
    let totals = totals(&input.lines)?;
    let txn = db.begin().await?;

    check_references(&txn, company_id, D::KIND, input).await?;
    let number = next_number::<D, _>(&txn, company_id, input.doc_date.year()).await?;
    let header = D::new_header(company_id, number, input, totals, stamp).insert(&txn).await?;
    let lines = insert_lines::<D, _>(&txn, &header, &input.lines, stamp).await?;

    txn.commit().await?;
    Ok(DocumentDetail { header, lines })
}

/// Replace header fields and all lines of a draft
pub async fn update<D>(
    db: &DatabaseConnection,
    company_id: i64,
    id: i64,
    input: &DocumentInput,
    stamp: Stamp,
) -> AppResult<Detail<D>>
where
    D: DocumentTable,
    D::Model: IntoActiveModel<D::Active>,
    LineOf<D>: IntoActiveModel<D::ActiveLine>,
{
    let totals = totals(&input.lines)?;
    let txn = db.begin().await?;

    let doc = lock::<D, _>(&txn, company_id, id).await?;
    check_editable(D::head(&doc).status)?;
    check_references(&txn, company_id, D::KIND, input).await?;

    <D::Line as EntityTrait>::delete_many()
        .filter(D::line_parent().eq(id))
        .exec(&txn)
        .await?;
    let header = D::edit_header(doc, input, totals, stamp).update(&txn).await?;
    let lines = insert_lines::<D, _>(&txn, &header, &input.lines, stamp).await?;

    txn.commit().await?;
    Ok(DocumentDetail { header, lines })
}

pub async fn delete<D: DocumentTable>(db: &DatabaseConnection, company_id: i64, id: i64, stamp: Stamp) -> AppResult<()> {
    let txn = db.begin().await?;

    let doc = lock::<D, _>(&txn, company_id, id).await?;
    check_editable(D::head(&doc).status)?;
    soft_delete::<D, _>(&txn, company_id, id, stamp.by.unwrap_or_default()).await?;

    txn.commit().await?;
    Ok(())
}

async fn post_document<D: DocumentTable, C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    doc: &D::Model,
    reverse: bool,
    allow_negative: bool,
    stamp: Stamp,
) -> AppResult<()> {
    let head = D::head(doc);
    let stock: Vec<(i64, Decimal)> = lines::<D, _>(db, head.id).await?.iter().map(D::line_stock).collect();
    let posting = Posting {
        kind: D::KIND,
        document_id: head.id,
        number: head.number,
        warehouse_id: head.warehouse_id,
        reverse,
    };
    post_lines(db, company_id, posting, &stock, allow_negative, stamp).await
}

/// Post every line of a draft to stock
pub async fn confirm<D>(
    db: &DatabaseConnection,
    company_id: i64,
    id: i64,
    allow_negative: bool,
    stamp: Stamp,
) -> AppResult<D::Model>
where
    D: DocumentTable,
    D::Model: IntoActiveModel<D::Active>,
{
    let txn = db.begin().await?;

    let doc = lock::<D, _>(&txn, company_id, id).await?;
    check_confirmable(D::head(&doc).status)?;
    post_document::<D, _>(&txn, company_id, &doc, false, allow_negative, stamp).await?;
    let doc = D::with_status(doc, DocumentStatus::Confirmed, stamp).update(&txn).await?;

    txn.commit().await?;
    tracing::info!("{} {} confirmed", D::KIND.label(), D::head(&doc).number);
    Ok(doc)
}

/// Cancel a draft, or a confirmed document together with its stock
pub async fn cancel<D>(
    db: &DatabaseConnection,
    company_id: i64,
    id: i64,
    allow_negative: bool,
    stamp: Stamp,
) -> AppResult<D::Model>
where
    D: DocumentTable,
    D::Model: IntoActiveModel<D::Active>,
{
    let txn = db.begin().await?;

    let doc = lock::<D, _>(&txn, company_id, id).await?;
    if check_cancellable(D::head(&doc).status)? {
        post_document::<D, _>(&txn, company_id, &doc, true, allow_negative, stamp).await?;
    }
    let doc = D::with_status(doc, DocumentStatus::Cancelled, stamp).update(&txn).await?;

    txn.commit().await?;
    tracing::info!("{} {} cancelled", D::KIND.label(), D::head(&doc).number);
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(qty: &str, price: &str, rate: &str) -> LineInput {
        LineInput {
            item_id: 1,
            quantity: qty.parse().unwrap(),
            unit_price: price.parse().unwrap(),
            tax_rate: rate.parse().unwrap(),
        }
    }

    fn input(lines: Vec<LineInput>) -> DocumentInput {
        DocumentInput {
            partner_id: 1,
            warehouse_id: 1,
            branch_id: None,
            doc_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            note: None,
            lines,
        }
    }

    #[test]
    fn test_line_amounts_and_totals() {
        let lines = vec![line("3", "19.99", "10"), line("0.5", "7.25", "0")];
        assert_eq!(
            lines[0].amounts().unwrap(),
            LineAmounts {
                line_total: "59.97".parse().unwrap(),
                tax_amount: "6.00".parse().unwrap(),
            }
        );

        let t = totals(&lines).unwrap();
        // 59.97 + 3.625 rounded
        assert_eq!(t.subtotal, "63.60".parse().unwrap());
        assert_eq!(t.tax_total, "6.00".parse().unwrap());
        assert_eq!(t.total, "69.60".parse().unwrap());
    }

    #[test]
    fn test_huge_line_is_an_error() {
        let huge = "100000000000000000000";
        let big = line(huge, huge, "0");
        assert!(matches!(big.amounts(), Err(AppError::Validation(_))));
        assert!(matches!(totals(&[big.clone()]), Err(AppError::Validation(_))));
        assert!(matches!(input(vec![big]).validate(), Err(AppError::Validation(_))));

        // each bound holds but the product is too large for a line
        let wide = line("10000000000", "1000000000000", "0");
        assert!(matches!(wide.amounts(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_numbering() {
        let kind = DocumentKind::Purchase;
        assert_eq!(kind.number(2024, 7), "PO-2024-00007");
        assert_eq!(kind.next_sequence(None, 2024), 1);
        assert_eq!(kind.next_sequence(Some("PO-2024-00041"), 2024), 42);
        // numbering restarts each year
        assert_eq!(kind.next_sequence(Some("PO-2023-00041"), 2024), 1);
        assert_eq!(DocumentKind::Sale.number(2025, 123_456), "SO-2025-123456");
        assert_eq!(DocumentKind::Sale.next_sequence(Some("SO-2025-100000"), 2025), 100_001);
    }

    #[test]
    fn test_partner_kinds() {
        assert!(DocumentKind::Purchase.accepts(PartnerKind::Supplier));
        assert!(DocumentKind::Purchase.accepts(PartnerKind::Both));
        assert!(!DocumentKind::Purchase.accepts(PartnerKind::Customer));
        assert!(DocumentKind::Sale.accepts(PartnerKind::Customer));
        assert!(!DocumentKind::Sale.accepts(PartnerKind::Supplier));
    }

    #[test]
    fn test_status_rules() {
        assert!(check_editable(DocumentStatus::Draft).is_ok());
        assert!(check_editable(DocumentStatus::Confirmed).is_err());
        assert!(check_confirmable(DocumentStatus::Cancelled).is_err());
        assert_eq!(check_cancellable(DocumentStatus::Draft).unwrap(), false);
        assert_eq!(check_cancellable(DocumentStatus::Confirmed).unwrap(), true);
        assert!(matches!(
            check_cancellable(DocumentStatus::Cancelled),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_document_validation() {
        let mut input = input(vec![line("1", "2", "5")]);
        assert!(input.validate().is_ok());

        input.lines[0].tax_rate = "150".parse().unwrap();
        assert!(input.validate().is_err());

        input.lines[0].tax_rate = Decimal::ZERO;
        input.lines[0].unit_price = "1000000000001".parse().unwrap();
        assert!(input.validate().is_err());

        input.lines = vec![line("1", "2", "5"); MAX_LINES + 1];
        assert!(input.validate().is_err());

        input.lines.clear();
        assert!(matches!(input.validate(), Err(AppError::Validation(_))));
    }
}
