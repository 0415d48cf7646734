//! Helpers for fixed-point monetary values.
//!
//! Amounts are [Decimal]s. They are stored as canonical text in SQLite and
//! summed in Rust so that no floating point rounding ever touches a balance.

use std::str::FromStr;

use rusqlite::{Row, types::Type};
use rust_decimal::Decimal;

use crate::Error;

/// Parse user supplied text into an amount.
///
/// Surrounding whitespace is ignored. Negative values are accepted here, the
/// operations that need a positive amount check for that themselves.
///
/// # Errors
/// Returns [Error::InvalidAmount] if `text` is empty or is not a decimal number.
pub fn parse_amount(text: &str) -> Result<Decimal, Error> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidAmount("amount cannot be empty".to_owned()));
    }

    Decimal::from_str(trimmed)
        .map(|amount| amount.normalize())
        .map_err(|error| Error::InvalidAmount(format!("\"{trimmed}\": {error}")))
}

/// Check that `amount` is strictly greater than zero.
///
/// # Errors
/// Returns [Error::InvalidAmount] for zero and negative amounts.
pub fn ensure_positive(amount: Decimal) -> Result<Decimal, Error> {
    if amount <= Decimal::ZERO {
        Err(Error::InvalidAmount(format!(
            "{amount} must be greater than zero"
        )))
    } else {
        Ok(amount)
    }
}

/// Add two amounts.
///
/// # Errors
/// Returns [Error::InvalidAmount] if the result is too large to represent.
pub fn checked_add(left: Decimal, right: Decimal) -> Result<Decimal, Error> {
    left.checked_add(right)
        .ok_or_else(|| Error::InvalidAmount(format!("{left} + {right} is out of range")))
}

/// Subtract `right` from `left`.
///
/// # Errors
/// Returns [Error::InvalidAmount] if the result is too large to represent.
pub fn checked_sub(left: Decimal, right: Decimal) -> Result<Decimal, Error> {
    left.checked_sub(right)
        .ok_or_else(|| Error::InvalidAmount(format!("{left} - {right} is out of range")))
}

/// Sum `amounts`, starting from zero.
///
/// # Errors
/// Returns [Error::InvalidAmount] if a partial sum is too large to represent.
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal, Error> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, checked_add)
}

/// The text stored in the database for `amount`.
pub(crate) fn to_column(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Read a decimal stored as text from column `index` of `row`.
pub(crate) fn get_decimal(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let raw: String = row.get(index)?;

    Decimal::from_str(&raw).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}
