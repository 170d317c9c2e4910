//! Leave requests and the annual entitlement

use chrono::{Datelike, NaiveDate};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, QueryFilter, Set};
use serde::Deserialize;

use crate::entity::employee;
use crate::entity::leave_request::{self, LeaveStatus, LeaveType};
use crate::error::{AppError, AppResult, OptionExt};
use crate::scope::{find_scoped, scoped, Stamp};
use crate::service::calendar;
use crate::validate::{self, Validate};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveInput {
    pub employee_id: i64,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

impl Validate for LeaveInput {
    fn validate(&self) -> AppResult<()> {
        leave_days(self.start_date, self.end_date)?;
        validate::optional_text("reason", self.reason.as_deref(), 255)
    }
}

/// Longest request, in calendar days
pub const MAX_LEAVE_SPAN: i64 = 366;

/// Working days requested, rejecting ranges without any
pub fn leave_days(start: NaiveDate, end: NaiveDate) -> AppResult<i64> {
    validate::date_range(Some(start), Some(end))?;
    if (end - start).num_days() >= MAX_LEAVE_SPAN {
        return Err(AppError::Validation(format!(
            "leave must not span more than {} days",
            MAX_LEAVE_SPAN
        )));
    }
    match calendar::count_working_days(start, end) {
        0 => Err(AppError::Validation("leave covers no working days".to_string())),
        days => Ok(days),
    }
}

/// Annual leave days approved for requests starting in `year`
pub fn annual_days_taken(requests: &[leave_request::Model], year: i32) -> i64 {
    requests
        .iter()
        .filter(|r| r.leave_type == LeaveType::Annual)
        .filter(|r| r.status == LeaveStatus::Approved)
        .filter(|r| r.start_date.year() == year)
        .map(|r| r.days as i64)
        .sum()
}

pub fn check_entitlement(entitlement: i32, taken: i64, requested: i64) -> AppResult<()> {
    let remaining = entitlement as i64 - taken;
    if requested > remaining {
        return Err(AppError::Validation(format!(
            "annual leave exceeds entitlement: {} requested, {} remaining",
            requested,
            remaining.max(0)
        )));
    }
    Ok(())
}

async fn approved_annual<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    employee_id: i64,
    year: i32,
) -> AppResult<i64> {
    let rows = scoped::<leave_request::Entity>(company_id)
        .filter(leave_request::Column::EmployeeId.eq(employee_id))
        .filter(leave_request::Column::LeaveType.eq(LeaveType::Annual))
        .filter(leave_request::Column::Status.eq(LeaveStatus::Approved))
        .all(db)
        .await?;
    Ok(annual_days_taken(&rows, year))
}

async fn find<C: ConnectionTrait>(db: &C, company_id: i64, id: i64) -> AppResult<leave_request::Model> {
    find_scoped::<leave_request::Entity, _>(db, company_id, id)
        .await?
        .ok_or_not_found(format!("leave request {} not found", id))
}

/// File a pending request
pub async fn request<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    input: &LeaveInput,
    stamp: Stamp,
) -> AppResult<leave_request::Model> {
    let employee = find_scoped::<employee::Entity, _>(db, company_id, input.employee_id)
        .await?
        .ok_or_not_found(format!("employee {} not found", input.employee_id))?;
    let days = leave_days(input.start_date, input.end_date)?;

    let overlapping = scoped::<leave_request::Entity>(company_id)
        .filter(leave_request::Column::EmployeeId.eq(employee.id))
        .filter(leave_request::Column::Status.is_in(LeaveStatus::ACTIVE))
        .filter(leave_request::Column::StartDate.lte(input.end_date))
        .filter(leave_request::Column::EndDate.gte(input.start_date))
        .one(db)
        .await?;
    if let Some(other) = overlapping {
        return Err(AppError::Conflict(format!(
            "overlaps leave request {} ({} to {})",
            other.id, other.start_date, other.end_date
        )));
    }

    if input.leave_type == LeaveType::Annual {
        let taken = approved_annual(db, company_id, employee.id, input.start_date.year()).await?;
        check_entitlement(employee.annual_leave_days, taken, days)?;
    }

    Ok(leave_request::ActiveModel {
        company_id: Set(company_id),
        employee_id: Set(employee.id),
        leave_type: Set(input.leave_type),
        start_date: Set(input.start_date),
        end_date: Set(input.end_date),
        days: Set(days as i32),
        reason: Set(input.reason.clone()),
        status: Set(LeaveStatus::Pending),
        decided_by: Set(None),
        decided_at: Set(None),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Approve or reject a pending request
pub async fn decide<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    id: i64,
    approve: bool,
    stamp: Stamp,
) -> AppResult<leave_request::Model> {
    let request = find(db, company_id, id).await?;
    if request.status != LeaveStatus::Pending {
        return Err(AppError::InvalidState(format!("leave request is {:?}", request.status)));
    }

    if approve && request.leave_type == LeaveType::Annual {
        let employee = find_scoped::<employee::Entity, _>(db, company_id, request.employee_id)
            .await?
            .ok_or_not_found(format!("employee {} not found", request.employee_id))?;
        let taken = approved_annual(db, company_id, employee.id, request.start_date.year()).await?;
        check_entitlement(employee.annual_leave_days, taken, request.days as i64)?;
    }

    let mut active: leave_request::ActiveModel = request.into();
    active.status = Set(if approve { LeaveStatus::Approved } else { LeaveStatus::Rejected });
    active.decided_by = Set(stamp.by);
    active.decided_at = Set(Some(stamp.at));
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    Ok(active.update(db).await?)
}

/// Cancel a pending or approved request. `own_user` restricts the request
/// to an employee linked to that user.
pub async fn cancel<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    id: i64,
    own_user: Option<i64>,
    stamp: Stamp,
) -> AppResult<leave_request::Model> {
    let request = find(db, company_id, id).await?;

    if let Some(user_id) = own_user {
        let employee = find_scoped::<employee::Entity, _>(db, company_id, request.employee_id).await?;
        if employee.and_then(|e| e.user_id) != Some(user_id) {
            return Err(AppError::Forbidden);
        }
    }

    if !LeaveStatus::ACTIVE.contains(&request.status) {
        return Err(AppError::InvalidState(format!("leave request is {:?}", request.status)));
    }

    let mut active: leave_request::ActiveModel = request.into();
    active.status = Set(LeaveStatus::Cancelled);
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sea_orm::{DbBackend, MockDatabase};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn leave(id: i64, leave_type: LeaveType, status: LeaveStatus, start: NaiveDate, days: i32) -> leave_request::Model {
        leave_request::Model {
            id,
            company_id: 1,
            employee_id: 4,
            leave_type,
            start_date: start,
            end_date: start,
            days,
            reason: None,
            status,
            decided_by: None,
            decided_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    fn employee_model(user_id: Option<i64>) -> employee::Model {
        employee::Model {
            id: 4,
            company_id: 1,
            code: "E4".to_string(),
            full_name: "Dana".to_string(),
            email: None,
            phone: None,
            position: None,
            branch_id: None,
            department_id: None,
            user_id,
            hire_date: d(1, 1),
            status: employee::EmployeeStatus::Active,
            basic_salary: Decimal::from(3000),
            allowance: Decimal::ZERO,
            annual_leave_days: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn test_leave_days() {
        // Mon 3 June to Mon 10 June
        assert_eq!(leave_days(d(6, 3), d(6, 10)).unwrap(), 6);
        assert!(matches!(leave_days(d(6, 8), d(6, 9)), Err(AppError::Validation(_))));
        assert!(leave_days(d(6, 10), d(6, 3)).is_err());
    }

    #[test]
    fn test_leave_span_capped() {
        let start = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap();
        assert!(matches!(leave_days(start, end), Err(AppError::Validation(_))));

        // a whole leap year still fits
        let year = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(leave_days(year, last).unwrap(), 262);

        let input = LeaveInput {
            employee_id: 1,
            leave_type: LeaveType::Unpaid,
            start_date: start,
            end_date: end,
            reason: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_annual_days_taken() {
        let rows = vec![
            leave(1, LeaveType::Annual, LeaveStatus::Approved, d(2, 5), 3),
            leave(2, LeaveType::Annual, LeaveStatus::Pending, d(3, 5), 2),
            leave(3, LeaveType::Sick, LeaveStatus::Approved, d(4, 5), 1),
            leave(4, LeaveType::Annual, LeaveStatus::Approved, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(), 5),
        ];
        assert_eq!(annual_days_taken(&rows, 2024), 3);
    }

    #[test]
    fn test_check_entitlement() {
        assert!(check_entitlement(10, 7, 3).is_ok());
        assert!(check_entitlement(10, 7, 4).is_err());
        assert!(check_entitlement(10, 12, 1).is_err());
    }

    #[tokio::test]
    async fn test_overlapping_request_conflicts() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![employee_model(None)]])
            .append_query_results([vec![leave(1, LeaveType::Sick, LeaveStatus::Pending, d(6, 4), 1)]])
            .into_connection();

        let input = LeaveInput {
            employee_id: 4,
            leave_type: LeaveType::Annual,
            start_date: d(6, 3),
            end_date: d(6, 5),
            reason: None,
        };
        let result = request(&db, 1, &input, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_decide_requires_pending() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![leave(1, LeaveType::Sick, LeaveStatus::Rejected, d(6, 4), 1)]])
            .into_connection();

        let result = decide(&db, 1, 1, true, Stamp::now(1)).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_cancel_by_other_user_forbidden() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![leave(1, LeaveType::Sick, LeaveStatus::Pending, d(6, 4), 1)]])
            .append_query_results([vec![employee_model(Some(8))]])
            .into_connection();

        let result = cancel(&db, 1, 1, Some(9), Stamp::now(9)).await;
        assert!(matches!(result, Err(AppError::Forbidden)));
    }
}
