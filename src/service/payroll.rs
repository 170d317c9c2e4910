//! Payroll runs
//!
//! A run creates one [`payroll_record`] header per company (or branch) and
//! month and one [`payroll_data`] line per active employee. Line amounts come
//! from [`compute_line`]; header totals from [`summarize`].

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::config::{PayrollConfig, TaxBracket};
use crate::entity::employee::{self, EmployeeStatus};
use crate::entity::leave_request::{self, LeaveStatus, LeaveType};
use crate::entity::payroll_record::{self, PayrollStatus};
use crate::entity::{attendance, payroll_data};
use crate::error::{AppError, AppResult, OptionExt};
use crate::scope::{find_scoped_for_update, scoped, soft_delete, Stamp};
use crate::service::calendar;

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Inputs of one employee's payroll line
#[derive(Debug, Clone, PartialEq)]
pub struct LineInput {
    pub basic_salary: Decimal,
    pub allowance: Decimal,
    pub overtime_hours: Decimal,
    pub unpaid_leave_days: i64,
    /// Working days of the payroll month
    pub working_days: i64,
}

/// Computed amounts of one payroll line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAmounts {
    pub overtime_pay: Decimal,
    pub deduction: Decimal,
    pub gross: Decimal,
    pub income_tax: Decimal,
    pub net_salary: Decimal,
}

/// Progressive tax over `taxable` with brackets ordered by `up_to`
pub fn income_tax(taxable: Decimal, brackets: &[TaxBracket]) -> Decimal {
    let mut tax = Decimal::ZERO;
    let mut lower = Decimal::ZERO;

    for bracket in brackets {
        if taxable <= lower {
            break;
        }
        let upper = bracket.up_to.map_or(taxable, |u| u.min(taxable));
        if upper > lower {
            tax += (upper - lower) * bracket.rate / Decimal::ONE_HUNDRED;
        }
        match bracket.up_to {
            Some(u) => lower = lower.max(u),
            None => break,
        }
    }

    round2(tax)
}

/// Salary, overtime, deduction and tax arithmetic for one employee
pub fn compute_line(input: &LineInput, config: &PayrollConfig) -> LineAmounts {
    let working_days = Decimal::from(input.working_days.max(0));

    let (overtime_pay, deduction) = if working_days.is_zero() {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        let daily_rate = input.basic_salary / working_days;
        let hours = working_days * config.standard_hours_per_day;
        let hourly_rate = if hours.is_zero() { Decimal::ZERO } else { input.basic_salary / hours };

        let overtime_pay = round2(input.overtime_hours * hourly_rate * config.overtime_multiplier);
        let deduction = round2(daily_rate * Decimal::from(input.unpaid_leave_days.max(0)))
            .min(input.basic_salary);
        (overtime_pay, deduction)
    };

    let gross = input.basic_salary + input.allowance + overtime_pay;
    let taxable = (gross - deduction).max(Decimal::ZERO);
    let income_tax = income_tax(taxable, &config.tax_brackets);

    LineAmounts {
        overtime_pay,
        deduction,
        gross,
        income_tax,
        net_salary: gross - deduction - income_tax,
    }
}

/// Header totals of a payroll run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollTotals {
    pub employee_count: i32,
    pub total_basic: Decimal,
    pub total_allowance: Decimal,
    pub total_overtime: Decimal,
    pub total_deduction: Decimal,
    pub total_income_tax: Decimal,
    pub total_net: Decimal,
    /// Sum of basic salaries minus sum of income tax
    pub total_amount: Decimal,
}

pub fn summarize<'a>(lines: impl IntoIterator<Item = &'a payroll_data::Model>) -> PayrollTotals {
    let mut totals = lines.into_iter().fold(PayrollTotals::default(), |mut t, line| {
        t.employee_count += 1;
        t.total_basic += line.basic_salary;
        t.total_allowance += line.allowance;
        t.total_overtime += line.overtime_pay;
        t.total_deduction += line.deduction;
        t.total_income_tax += line.income_tax;
        t.total_net += line.net_salary;
        t
    });
    totals.total_amount = totals.total_basic - totals.total_income_tax;
    totals
}

/// Allowed status changes: draft -> approved -> paid
pub fn check_transition(from: PayrollStatus, to: PayrollStatus) -> AppResult<()> {
    match (from, to) {
        (PayrollStatus::Draft, PayrollStatus::Approved) | (PayrollStatus::Approved, PayrollStatus::Paid) => Ok(()),
        _ => Err(AppError::InvalidState(format!(
            "payroll cannot move from {:?} to {:?}",
            from, to
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPayroll {
    pub year: i32,
    pub month: u32,
    pub branch_id: Option<i64>,
}

/// Create and fill a draft payroll record for a month
pub async fn run(
    db: &DatabaseConnection,
    config: &PayrollConfig,
    company_id: i64,
    req: &RunPayroll,
    stamp: Stamp,
) -> AppResult<payroll_record::Model> {
    calendar::month_range(req.year, req.month)
        .ok_or_else(|| AppError::Validation(format!("invalid period {}-{}", req.year, req.month)))?;

    let txn = db.begin().await?;

    let mut existing = scoped::<payroll_record::Entity>(company_id)
        .filter(payroll_record::Column::PeriodYear.eq(req.year))
        .filter(payroll_record::Column::PeriodMonth.eq(req.month as i32));
    existing = match req.branch_id {
        Some(branch_id) => existing.filter(payroll_record::Column::BranchId.eq(branch_id)),
        None => existing.filter(payroll_record::Column::BranchId.is_null()),
    };
    if existing.one(&txn).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "payroll for {}-{:02} already exists",
            req.year, req.month
        )));
    }

    let record = payroll_record::ActiveModel {
        company_id: Set(company_id),
        branch_id: Set(req.branch_id),
        period_year: Set(req.year),
        period_month: Set(req.month as i32),
        status: Set(PayrollStatus::Draft),
        employee_count: Set(0),
        total_basic: Set(Decimal::ZERO),
        total_allowance: Set(Decimal::ZERO),
        total_overtime: Set(Decimal::ZERO),
        total_deduction: Set(Decimal::ZERO),
        total_income_tax: Set(Decimal::ZERO),
        total_net: Set(Decimal::ZERO),
        total_amount: Set(Decimal::ZERO),
        paid_at: Set(None),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let lines = generate_lines(&txn, config, &record, stamp).await?;
    let record = write_totals(&txn, record, &summarize(&lines), stamp).await?;

    txn.commit().await?;

    tracing::info!(
        "Payroll {}-{:02} for company {} created with {} lines",
        req.year, req.month, company_id, lines.len()
    );
    Ok(record)
}

/// Header locked until the transaction ends
async fn lock_record<C: ConnectionTrait>(db: &C, company_id: i64, id: i64) -> AppResult<payroll_record::Model> {
    find_scoped_for_update::<payroll_record::Entity, _>(db, company_id, id)
        .await?
        .ok_or_not_found("payroll record not found")
}

/// Regenerate the lines of a draft run from current employee data
pub async fn recalculate(
    db: &DatabaseConnection,
    config: &PayrollConfig,
    company_id: i64,
    id: i64,
    stamp: Stamp,
) -> AppResult<payroll_record::Model> {
    let txn = db.begin().await?;

    let record = lock_record(&txn, company_id, id).await?;
    if record.status != PayrollStatus::Draft {
        return Err(AppError::InvalidState("only draft payrolls can be recalculated".to_string()));
    }

    discard_lines(&txn, &record, stamp).await?;
    let lines = generate_lines(&txn, config, &record, stamp).await?;
    let record = write_totals(&txn, record, &summarize(&lines), stamp).await?;

    txn.commit().await?;
    Ok(record)
}

/// Move a run to `to`, stamping `paid_at` when paying
pub async fn set_status(
    db: &DatabaseConnection,
    company_id: i64,
    id: i64,
    to: PayrollStatus,
    stamp: Stamp,
) -> AppResult<payroll_record::Model> {
    let txn = db.begin().await?;

    let record = lock_record(&txn, company_id, id).await?;
    check_transition(record.status, to)?;

    let mut active: payroll_record::ActiveModel = record.into();
    active.status = Set(to);
    if to == PayrollStatus::Paid {
        active.paid_at = Set(Some(stamp.at));
    }
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    let record = active.update(&txn).await?;

    txn.commit().await?;
    Ok(record)
}

/// Soft-delete a draft run and its lines
pub async fn delete(db: &DatabaseConnection, company_id: i64, id: i64, stamp: Stamp) -> AppResult<()> {
    let txn = db.begin().await?;

    let record = lock_record(&txn, company_id, id).await?;
    if record.status != PayrollStatus::Draft {
        return Err(AppError::InvalidState("only draft payrolls can be deleted".to_string()));
    }

    discard_lines(&txn, &record, stamp).await?;
    soft_delete::<payroll_record::Entity, _>(&txn, company_id, id, stamp.by.unwrap_or_default()).await?;

    txn.commit().await?;
    Ok(())
}

/// Live lines of a run, ordered by employee
pub async fn lines<C: ConnectionTrait>(
    db: &C,
    record: &payroll_record::Model,
) -> AppResult<Vec<payroll_data::Model>> {
    Ok(scoped::<payroll_data::Entity>(record.company_id)
        .filter(payroll_data::Column::PayrollRecordId.eq(record.id))
        .order_by_asc(payroll_data::Column::EmployeeId)
        .all(db)
        .await?)
}

async fn discard_lines<C: ConnectionTrait>(
    db: &C,
    record: &payroll_record::Model,
    stamp: Stamp,
) -> AppResult<()> {
    payroll_data::Entity::update_many()
        .col_expr(payroll_data::Column::DeletedAt, Expr::value(stamp.at))
        .col_expr(payroll_data::Column::DeletedBy, Expr::value(stamp.by))
        .filter(payroll_data::Column::PayrollRecordId.eq(record.id))
        .filter(payroll_data::Column::DeletedAt.is_null())
        .exec(db)
        .await?;
    Ok(())
}

async fn write_totals<C: ConnectionTrait>(
    db: &C,
    record: payroll_record::Model,
    totals: &PayrollTotals,
    stamp: Stamp,
) -> AppResult<payroll_record::Model> {
    let mut active: payroll_record::ActiveModel = record.into();
    active.employee_count = Set(totals.employee_count);
    active.total_basic = Set(totals.total_basic);
    active.total_allowance = Set(totals.total_allowance);
    active.total_overtime = Set(totals.total_overtime);
    active.total_deduction = Set(totals.total_deduction);
    active.total_income_tax = Set(totals.total_income_tax);
    active.total_net = Set(totals.total_net);
    active.total_amount = Set(totals.total_amount);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    Ok(active.update(db).await?)
}

async fn generate_lines<C: ConnectionTrait>(
    db: &C,
    config: &PayrollConfig,
    record: &payroll_record::Model,
    stamp: Stamp,
) -> AppResult<Vec<payroll_data::Model>> {
    let company_id = record.company_id;
    let (start, end) = calendar::month_range(record.period_year, record.period_month as u32)
        .ok_or_else(|| AppError::Internal(format!("payroll {} has an invalid period", record.id)))?;
    let working_days = calendar::count_working_days(start, end);

    let mut employees = scoped::<employee::Entity>(company_id)
        .filter(employee::Column::Status.eq(EmployeeStatus::Active))
        .filter(employee::Column::HireDate.lte(end));
    if let Some(branch_id) = record.branch_id {
        employees = employees.filter(employee::Column::BranchId.eq(branch_id));
    }
    let employees = employees.order_by_asc(employee::Column::Id).all(db).await?;
    if employees.is_empty() {
        return Err(AppError::Validation("no active employees for this payroll".to_string()));
    }
    let ids: Vec<i64> = employees.iter().map(|e| e.id).collect();

    let mut overtime: HashMap<i64, Decimal> = HashMap::new();
    for row in scoped::<attendance::Entity>(company_id)
        .filter(attendance::Column::EmployeeId.is_in(ids.clone()))
        .filter(attendance::Column::WorkDate.between(start, end))
        .all(db)
        .await?
    {
        *overtime.entry(row.employee_id).or_default() += row.overtime_hours;
    }

    let mut unpaid_days: HashMap<i64, i64> = HashMap::new();
    for leave in scoped::<leave_request::Entity>(company_id)
        .filter(leave_request::Column::EmployeeId.is_in(ids))
        .filter(leave_request::Column::LeaveType.eq(LeaveType::Unpaid))
        .filter(leave_request::Column::Status.eq(LeaveStatus::Approved))
        .filter(leave_request::Column::StartDate.lte(end))
        .filter(leave_request::Column::EndDate.gte(start))
        .all(db)
        .await?
    {
        if let Some((from, to)) = calendar::overlap((start, end), (leave.start_date, leave.end_date)) {
            *unpaid_days.entry(leave.employee_id).or_default() += calendar::count_working_days(from, to);
        }
    }

    let mut lines = Vec::with_capacity(employees.len());
    for emp in employees {
        let input = LineInput {
            basic_salary: emp.basic_salary,
            allowance: emp.allowance,
            overtime_hours: overtime.get(&emp.id).copied().unwrap_or_default(),
            unpaid_leave_days: unpaid_days.get(&emp.id).copied().unwrap_or_default(),
            working_days,
        };
        let amounts = compute_line(&input, config);

        let line = payroll_data::ActiveModel {
            company_id: Set(company_id),
            payroll_record_id: Set(record.id),
            employee_id: Set(emp.id),
            basic_salary: Set(input.basic_salary),
            allowance: Set(input.allowance),
            overtime_hours: Set(input.overtime_hours),
            overtime_pay: Set(amounts.overtime_pay),
            unpaid_leave_days: Set(input.unpaid_leave_days as i32),
            deduction: Set(amounts.deduction),
            gross: Set(amounts.gross),
            income_tax: Set(amounts.income_tax),
            net_salary: Set(amounts.net_salary),
            created_at: Set(stamp.at),
            updated_at: Set(stamp.at),
            created_by: Set(stamp.by),
            updated_by: Set(stamp.by),
            ..Default::default()
        }
        .insert(db)
        .await?;
        lines.push(line);
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use sea_orm::{DbBackend, MockDatabase, MockExecResult};

    fn config() -> PayrollConfig {
        PayrollConfig::default()
    }

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_income_tax_brackets() {
        let brackets = config().tax_brackets;
        assert_eq!(income_tax(dec(4_000), &brackets), Decimal::ZERO);
        assert_eq!(income_tax(dec(5_000), &brackets), Decimal::ZERO);
        assert_eq!(income_tax(dec(12_000), &brackets), dec(700));
        // 15000 * 10% + 5000 * 20%
        assert_eq!(income_tax(dec(25_000), &brackets), dec(2_500));
        assert_eq!(income_tax(Decimal::ZERO, &brackets), Decimal::ZERO);
        assert_eq!(income_tax(dec(1_000), &[]), Decimal::ZERO);
    }

    #[test]
    fn test_compute_line() {
        let input = LineInput {
            basic_salary: dec(8_800),
            allowance: dec(500),
            overtime_hours: dec(4),
            unpaid_leave_days: 1,
            working_days: 22,
        };
        let amounts = compute_line(&input, &config());

        // hourly rate 8800 / (22 * 8) = 50, overtime 4h * 50 * 1.5
        assert_eq!(amounts.overtime_pay, dec(300));
        assert_eq!(amounts.deduction, dec(400));
        assert_eq!(amounts.gross, dec(9_600));
        // (9200 - 5000) * 10%
        assert_eq!(amounts.income_tax, dec(420));
        assert_eq!(amounts.net_salary, dec(8_780));
    }

    #[test]
    fn test_deduction_capped_at_basic_salary() {
        let input = LineInput {
            basic_salary: dec(2_000),
            allowance: Decimal::ZERO,
            overtime_hours: Decimal::ZERO,
            unpaid_leave_days: 30,
            working_days: 20,
        };
        let amounts = compute_line(&input, &config());
        assert_eq!(amounts.deduction, dec(2_000));
        assert_eq!(amounts.income_tax, Decimal::ZERO);
        assert_eq!(amounts.net_salary, Decimal::ZERO);
    }

    fn line(basic: i64, tax: i64, net: i64) -> payroll_data::Model {
        payroll_data::Model {
            id: 0,
            company_id: 1,
            payroll_record_id: 1,
            employee_id: 1,
            basic_salary: dec(basic),
            allowance: dec(100),
            overtime_hours: Decimal::ZERO,
            overtime_pay: dec(10),
            unpaid_leave_days: 0,
            deduction: Decimal::ZERO,
            gross: dec(basic + 110),
            income_tax: dec(tax),
            net_salary: dec(net),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn test_summarize() {
        let lines = vec![line(6_000, 100, 6_010), line(9_000, 400, 8_710)];
        let totals = summarize(&lines);
        assert_eq!(totals.employee_count, 2);
        assert_eq!(totals.total_basic, dec(15_000));
        assert_eq!(totals.total_allowance, dec(200));
        assert_eq!(totals.total_overtime, dec(20));
        assert_eq!(totals.total_income_tax, dec(500));
        assert_eq!(totals.total_net, dec(14_720));
        assert_eq!(totals.total_amount, dec(14_500));

        assert_eq!(summarize(&[]), PayrollTotals::default());
    }

    #[test]
    fn test_transitions() {
        assert!(check_transition(PayrollStatus::Draft, PayrollStatus::Approved).is_ok());
        assert!(check_transition(PayrollStatus::Approved, PayrollStatus::Paid).is_ok());
        assert!(matches!(
            check_transition(PayrollStatus::Draft, PayrollStatus::Paid),
            Err(AppError::InvalidState(_))
        ));
        assert!(check_transition(PayrollStatus::Paid, PayrollStatus::Approved).is_err());
    }

    fn record(status: PayrollStatus) -> payroll_record::Model {
        payroll_record::Model {
            id: 9,
            company_id: 1,
            branch_id: None,
            period_year: 2024,
            period_month: 6,
            status,
            employee_count: 0,
            total_basic: Decimal::ZERO,
            total_allowance: Decimal::ZERO,
            total_overtime: Decimal::ZERO,
            total_deduction: Decimal::ZERO,
            total_income_tax: Decimal::ZERO,
            total_net: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn active_employee(id: i64, basic: i64) -> employee::Model {
        employee::Model {
            id,
            company_id: 1,
            code: format!("E{}", id),
            full_name: format!("Employee {}", id),
            email: None,
            phone: None,
            position: None,
            branch_id: None,
            department_id: None,
            user_id: None,
            hire_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            status: EmployeeStatus::Active,
            basic_salary: dec(basic),
            allowance: Decimal::ZERO,
            annual_leave_days: 12,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[tokio::test]
    async fn test_run_rejects_existing_period() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![record(PayrollStatus::Draft)]])
            .into_connection();

        let req = RunPayroll { year: 2024, month: 6, branch_id: None };
        let result = run(&db, &config(), 1, &req, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_month() {
        let db = MockDatabase::new(DbBackend::Postgres).into_connection();
        let req = RunPayroll { year: 2024, month: 13, branch_id: None };
        let result = run(&db, &config(), 1, &req, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_run_writes_lines_and_totals() {
        // June 2024 has 20 working days; 16000 / 20 / 8 = 100 per hour
        let mut expected_line = line(16_000, 0, 0);
        expected_line.id = 31;
        expected_line.payroll_record_id = 9;

        let mut totals_record = record(PayrollStatus::Draft);
        totals_record.employee_count = 1;
        totals_record.total_basic = dec(16_000);

        let db = MockDatabase::new(DbBackend::Postgres)
            // no existing run
            .append_query_results([Vec::<payroll_record::Model>::new()])
            // inserted header
            .append_query_results([vec![record(PayrollStatus::Draft)]])
            .append_query_results([vec![active_employee(4, 16_000)]])
            .append_query_results([vec![attendance::Model {
                id: 1,
                company_id: 1,
                employee_id: 4,
                work_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                check_in: Utc::now(),
                check_out: None,
                worked_hours: dec(10),
                overtime_hours: dec(2),
                note: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                created_by: None,
                updated_by: None,
                deleted_at: None,
                deleted_by: None,
            }]])
            .append_query_results([Vec::<leave_request::Model>::new()])
            .append_query_results([vec![expected_line]])
            .append_query_results([vec![totals_record]])
            .append_exec_results([MockExecResult { last_insert_id: 0, rows_affected: 1 }])
            .into_connection();

        let req = RunPayroll { year: 2024, month: 6, branch_id: None };
        let result = run(&db, &config(), 1, &req, Stamp::now(1)).await.unwrap();
        assert_eq!(result.employee_count, 1);
        assert_eq!(result.total_basic, dec(16_000));
        assert_eq!(result.status, PayrollStatus::Draft);
    }

    #[tokio::test]
    async fn test_delete_requires_draft() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![record(PayrollStatus::Approved)]])
            .into_connection();

        let result = delete(&db, 1, 9, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
        assert!(!log.contains(r#"UPDATE \"erp_payroll"#));
    }

    #[tokio::test]
    async fn test_recalculate_requires_draft() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![record(PayrollStatus::Paid)]])
            .into_connection();

        let result = recalculate(&db, &config(), 1, 9, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
        assert!(!log.contains(r#"UPDATE \"erp_payroll"#));
    }

    #[tokio::test]
    async fn test_pay_stamps_paid_at() {
        let mut paid = record(PayrollStatus::Paid);
        paid.paid_at = Some(Utc::now());
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![record(PayrollStatus::Approved)]])
            .append_query_results([vec![paid]])
            .into_connection();

        let result = set_status(&db, 1, 9, PayrollStatus::Paid, Stamp::now(1)).await.unwrap();
        assert_eq!(result.status, PayrollStatus::Paid);
        assert!(result.paid_at.is_some());

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"));
    }

    #[tokio::test]
    async fn test_skipping_approval_rejected() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![record(PayrollStatus::Draft)]])
            .into_connection();

        let result = set_status(&db, 1, 9, PayrollStatus::Paid, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }
}
