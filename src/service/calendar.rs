//! Working-day arithmetic

use chrono::{Datelike, NaiveDate, Weekday};

pub fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Monday to Friday days in `[start, end]`; 0 when `end < start`
pub fn count_working_days(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return 0;
    }

    let days = (end - start).num_days() + 1;
    let first = i64::from(start.weekday().num_days_from_monday());
    // every full week has five working days; walk the remainder
    let rest = (0..days % 7).filter(|offset| (first + offset) % 7 < 5).count() as i64;

    days / 7 * 5 + rest
}

/// First and last day of a month, None for an invalid year/month
pub fn month_range(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

/// Intersection of two inclusive date ranges
pub fn overlap(a: (NaiveDate, NaiveDate), b: (NaiveDate, NaiveDate)) -> Option<(NaiveDate, NaiveDate)> {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    (start <= end).then_some((start, end))
}
