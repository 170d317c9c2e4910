//! Daily attendance records

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::prelude::DateTimeUtc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, QueryFilter, Set};
use serde::Deserialize;

use crate::entity::attendance;
use crate::error::{AppError, AppResult};
use crate::scope::{scoped, Stamp};
use crate::validate::{self, Validate};

/// Elapsed hours between check-in and check-out, 2 dp
pub fn worked_hours(check_in: DateTimeUtc, check_out: DateTimeUtc) -> AppResult<Decimal> {
    if check_out <= check_in {
        return Err(AppError::Validation("check-out must be after check-in".to_string()));
    }
    let seconds = Decimal::from((check_out - check_in).num_seconds());
    Ok((seconds / Decimal::from(3600)).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

pub fn overtime_hours(worked: Decimal, standard: Decimal) -> Decimal {
    (worked - standard).max(Decimal::ZERO)
}

async fn find_day<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    employee_id: i64,
    work_date: NaiveDate,
) -> AppResult<Option<attendance::Model>> {
    Ok(scoped::<attendance::Entity>(company_id)
        .filter(attendance::Column::EmployeeId.eq(employee_id))
        .filter(attendance::Column::WorkDate.eq(work_date))
        .one(db)
        .await?)
}

pub async fn check_in<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    employee_id: i64,
    stamp: Stamp,
) -> AppResult<attendance::Model> {
    let today = stamp.at.date_naive();
    if find_day(db, company_id, employee_id, today).await?.is_some() {
        return Err(AppError::Conflict(format!("already checked in on {}", today)));
    }

    Ok(attendance::ActiveModel {
        company_id: Set(company_id),
        employee_id: Set(employee_id),
        work_date: Set(today),
        check_in: Set(stamp.at),
        check_out: Set(None),
        worked_hours: Set(Decimal::ZERO),
        overtime_hours: Set(Decimal::ZERO),
        note: Set(None),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn check_out<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    employee_id: i64,
    standard_hours: Decimal,
    stamp: Stamp,
) -> AppResult<attendance::Model> {
    let today = stamp.at.date_naive();
    let record = find_day(db, company_id, employee_id, today)
        .await?
        .filter(|r| r.check_out.is_none())
        .ok_or_else(|| AppError::InvalidState("no open attendance record for today".to_string()))?;

    let worked = worked_hours(record.check_in, stamp.at)?;
    let mut active: attendance::ActiveModel = record.into();
    active.check_out = Set(Some(stamp.at));
    active.worked_hours = Set(worked);
    active.overtime_hours = Set(overtime_hours(worked, standard_hours));
    active.updated_at = Set(stamp.at);
    active.updated_by = Set(stamp.by);
    Ok(active.update(db).await?)
}

/// Body of a manual attendance entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAttendance {
    pub employee_id: i64,
    pub check_in: DateTimeUtc,
    pub check_out: Option<DateTimeUtc>,
    pub note: Option<String>,
}

impl Validate for ManualAttendance {
    fn validate(&self) -> AppResult<()> {
        validate::optional_text("note", self.note.as_deref(), 255)?;
        if let Some(out) = self.check_out {
            worked_hours(self.check_in, out)?;
        }
        Ok(())
    }
}

pub async fn record<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    input: &ManualAttendance,
    standard_hours: Decimal,
    stamp: Stamp,
) -> AppResult<attendance::Model> {
    let work_date = input.check_in.date_naive();
    if find_day(db, company_id, input.employee_id, work_date).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "employee {} already has a record on {}",
            input.employee_id, work_date
        )));
    }

    let worked = match input.check_out {
        Some(out) => worked_hours(input.check_in, out)?,
        None => Decimal::ZERO,
    };

    Ok(attendance::ActiveModel {
        company_id: Set(company_id),
        employee_id: Set(input.employee_id),
        work_date: Set(work_date),
        check_in: Set(input.check_in),
        check_out: Set(input.check_out),
        worked_hours: Set(worked),
        overtime_hours: Set(overtime_hours(worked, standard_hours)),
        note: Set(input.note.clone()),
        created_at: Set(stamp.at),
        updated_at: Set(stamp.at),
        created_by: Set(stamp.by),
        updated_by: Set(stamp.by),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sea_orm::{DbBackend, MockDatabase};

    fn at(h: u32, m: u32) -> DateTimeUtc {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    fn open_record() -> attendance::Model {
        attendance::Model {
            id: 1,
            company_id: 1,
            employee_id: 4,
            work_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            check_in: at(8, 0),
            check_out: None,
            worked_hours: Decimal::ZERO,
            overtime_hours: Decimal::ZERO,
            note: None,
            created_at: at(8, 0),
            updated_at: at(8, 0),
            created_by: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[test]
    fn test_worked_hours() {
        assert_eq!(worked_hours(at(8, 0), at(17, 30)).unwrap(), Decimal::new(950, 2));
        // 20 minutes
        assert_eq!(worked_hours(at(8, 0), at(8, 20)).unwrap(), Decimal::new(33, 2));
        assert!(worked_hours(at(9, 0), at(9, 0)).is_err());
    }

    #[test]
    fn test_overtime_hours() {
        let standard = Decimal::from(8);
        assert_eq!(overtime_hours(Decimal::new(950, 2), standard), Decimal::new(150, 2));
        assert_eq!(overtime_hours(Decimal::from(6), standard), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_second_check_in_conflicts() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![open_record()]])
            .into_connection();

        let stamp = Stamp { at: at(12, 0), by: Some(1) };
        let result = check_in(&db, 1, 4, stamp).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_check_out_closes_open_record() {
        let mut closed = open_record();
        closed.check_out = Some(at(18, 0));
        closed.worked_hours = Decimal::from(10);
        closed.overtime_hours = Decimal::from(2);

        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![open_record()]])
            .append_query_results([vec![closed]])
            .into_connection();

        let stamp = Stamp { at: at(18, 0), by: Some(1) };
        let result = check_out(&db, 1, 4, Decimal::from(8), stamp).await.unwrap();
        assert_eq!(result.overtime_hours, Decimal::from(2));
    }

    #[tokio::test]
    async fn test_check_out_without_check_in() {
        let db = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([Vec::<attendance::Model>::new()])
            .into_connection();

        let stamp = Stamp { at: at(18, 0), by: Some(1) };
        let result = check_out(&db, 1, 4, Decimal::from(8), stamp).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }
}
