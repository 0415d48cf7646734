//! Monthly spending figures compared against the owner's budget.

use rusqlite::Connection;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    account::AccountId,
    money::{checked_sub, checked_sum, get_decimal},
    owner::OwnerId,
    period::{DateRange, month_bounds},
    transaction::TransactionType,
};

use super::core::{Budget, current_budget};

/// Sum the expenses of `owner_id` in the calendar month containing `as_of`.
///
/// Every day of the month counts, including days after `as_of`. When
/// `account_id` is given only that account's expenses are summed. A month
/// with no expenses sums to zero.
///
/// # Errors
/// This function will return a:
/// - [Error::DateOutOfRange] if the month cannot be represented,
/// - [Error::InvalidAmount] if the sum is out of range,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn monthly_spend(
    owner_id: &OwnerId,
    account_id: Option<AccountId>,
    as_of: Date,
    connection: &Connection,
) -> Result<Decimal, Error> {
    let period = month_bounds(as_of)?;

    spend_in_range(owner_id, account_id, period, connection)
}

/// Sum the expenses of `owner_id` dated inside `range`.
pub(crate) fn spend_in_range(
    owner_id: &OwnerId,
    account_id: Option<AccountId>,
    range: DateRange,
    connection: &Connection,
) -> Result<Decimal, Error> {
    let amounts = connection
        .prepare(
            "SELECT amount FROM \"transaction\"
             WHERE owner_id = ?1
                AND (?2 IS NULL OR account_id = ?2)
                AND kind = ?3
                AND date BETWEEN ?4 AND ?5",
        )?
        .query_map(
            (
                owner_id,
                account_id,
                TransactionType::Expense,
                range.start,
                range.end,
            ),
            |row| get_decimal(row, 0),
        )?
        .collect::<Result<Vec<Decimal>, rusqlite::Error>>()?;

    checked_sum(amounts)
}

/// The share of `ceiling` that `spent` uses, as a percentage.
///
/// Returns `None` for a ceiling of zero or less, which has no meaningful
/// percentage. A percentage too large to represent saturates at
/// [Decimal::MAX], so runaway spending still lands in the highest band.
pub fn percent_used(spent: Decimal, ceiling: Decimal) -> Option<Decimal> {
    if ceiling <= Decimal::ZERO {
        return None;
    }

    let percent = spent
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(ceiling))
        .or_else(|| {
            spent
                .checked_div(ceiling)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        })
        .unwrap_or(if spent.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        });

    Some(percent)
}

/// Cut `percent` to two decimal places without rounding up, so a figure just
/// under a band boundary never reads as the boundary itself.
pub(crate) fn display_percent(percent: Decimal) -> Decimal {
    percent.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// The month's spending next to the owner's budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    /// The owner's budget, `None` if no ceiling is configured.
    pub budget: Option<Budget>,
    /// The calendar month the figures cover.
    pub period: DateRange,
    /// The expenses recorded in the month.
    pub spent: Decimal,
    /// `spent` as a percentage of the ceiling, truncated to two places.
    pub percent_used: Option<Decimal>,
    /// What is left of the ceiling. Negative once the budget is exceeded.
    pub remaining: Option<Decimal>,
}

/// Summarise the spending of `owner_id` for the month containing `as_of`.
///
/// # Errors
/// This function will return a:
/// - [Error::DateOutOfRange] if the month cannot be represented,
/// - [Error::InvalidAmount] if the sum or the remaining amount is out of range,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn budget_status(
    owner_id: &OwnerId,
    account_id: Option<AccountId>,
    as_of: Date,
    connection: &Connection,
) -> Result<BudgetStatus, Error> {
    let period = month_bounds(as_of)?;
    let budget = current_budget(owner_id, connection)?;
    let spent = spend_in_range(owner_id, account_id, period, connection)?;

    let percent = budget
        .as_ref()
        .and_then(|budget| percent_used(spent, budget.amount))
        .map(display_percent);
    let remaining = budget
        .as_ref()
        .map(|budget| checked_sub(budget.amount, spent))
        .transpose()?;

    Ok(BudgetStatus {
        budget,
        period,
        spent,
        percent_used: percent,
        remaining,
    })
}
