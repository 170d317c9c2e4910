//! Request body validation

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};

/// Implemented by request bodies that need checks beyond deserialization
pub trait Validate {
    fn validate(&self) -> AppResult<()>;
}

/// Non-blank text of at most `max` characters
pub fn text(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    optional_text(field, Some(value), max)
}

pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> AppResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(AppError::Validation(format!(
            "{} must not exceed {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

pub fn non_negative(field: &str, value: Decimal) -> AppResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::Validation(format!("{} must not be negative", field)));
    }
    Ok(())
}

pub fn positive(field: &str, value: Decimal) -> AppResult<()> {
    if value <= Decimal::ZERO {
        return Err(AppError::Validation(format!("{} must be greater than zero", field)));
    }
    Ok(())
}

/// Largest quantity a single line or movement may carry
pub fn max_quantity() -> Decimal {
    Decimal::from(10_000_000_000_i64)
}

/// Largest unit price or line amount
pub fn max_amount() -> Decimal {
    Decimal::from(1_000_000_000_000_i64)
}

pub fn at_most(field: &str, value: Decimal, max: Decimal) -> AppResult<()> {
    if value > max {
        return Err(AppError::Validation(format!("{} must not exceed {}", field, max)));
    }
    Ok(())
}

fn out_of_range(field: &str) -> AppError {
    AppError::Validation(format!("{} is out of range", field))
}

/// `a + b` without overflowing
pub fn sum(field: &str, a: Decimal, b: Decimal) -> AppResult<Decimal> {
    a.checked_add(b).ok_or_else(|| out_of_range(field))
}

/// `a * b` without overflowing
pub fn product(field: &str, a: Decimal, b: Decimal) -> AppResult<Decimal> {
    a.checked_mul(b).ok_or_else(|| out_of_range(field))
}

/// `start <= end` when both are present
pub fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> AppResult<()> {
    match (start, end) {
        (Some(s), Some(e)) if e < s => Err(AppError::Validation(
            "end date must not be before start date".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text() {
        assert!(text("name", "Main", 32).is_ok());
        assert!(matches!(text("name", "   ", 32), Err(AppError::Validation(_))));
        assert!(text("name", &"x".repeat(33), 32).is_err());
        // length counts characters, not bytes
        assert!(text("name", "仓库仓库", 4).is_ok());
    }

    #[test]
    fn test_numbers() {
        assert!(non_negative("salary", Decimal::ZERO).is_ok());
        assert!(non_negative("salary", Decimal::new(-1, 2)).is_err());
        assert!(positive("quantity", Decimal::ZERO).is_err());
        assert!(positive("quantity", Decimal::new(5, 1)).is_ok());
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(sum("total", Decimal::ONE, Decimal::ONE).unwrap(), Decimal::TWO);
        assert!(matches!(sum("total", Decimal::MAX, Decimal::ONE), Err(AppError::Validation(_))));
        assert!(matches!(product("lineTotal", Decimal::MAX, Decimal::TWO), Err(AppError::Validation(_))));
        assert!(at_most("quantity", max_quantity(), max_quantity()).is_ok());
        assert!(at_most("quantity", max_quantity() + Decimal::ONE, max_quantity()).is_err());
    }

    #[test]
    fn test_date_range() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        assert!(date_range(Some(d(1)), Some(d(1))).is_ok());
        assert!(date_range(Some(d(2)), Some(d(1))).is_err());
        assert!(date_range(None, Some(d(1))).is_ok());
    }
}
