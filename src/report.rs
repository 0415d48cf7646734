//! Summaries of an owner's transactions for a month or a chart range.

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, Duration};

use crate::{
    Error,
    money::{checked_add, checked_sub, checked_sum},
    owner::OwnerId,
    period::{DateRange, month_bounds},
    transaction::{TRANSACTION_COLUMNS, Transaction, TransactionType, map_transaction_row},
};

/// The total spent in one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    /// The category key.
    pub category: String,
    /// The sum of the category's expenses.
    pub total: Decimal,
}

/// Income and expenses for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReport {
    /// The owner the report is for.
    pub owner_id: OwnerId,
    /// The calendar month the report covers.
    pub period: DateRange,
    /// The sum of all income in the month.
    pub total_income: Decimal,
    /// The sum of all expenses in the month.
    pub total_expenses: Decimal,
    /// Income minus expenses.
    pub net: Decimal,
    /// Expenses per category, largest first.
    pub expenses_by_category: Vec<CategoryTotal>,
    /// The number of transactions in the month.
    pub transaction_count: usize,
}

/// Build the report for the calendar month containing `month_of`, across all
/// of the owner's accounts.
///
/// # Errors
/// This function will return a:
/// - [Error::DateOutOfRange] if the month cannot be represented,
/// - [Error::InvalidAmount] if a total is out of range,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn monthly_report(
    owner_id: &OwnerId,
    month_of: Date,
    connection: &Connection,
) -> Result<MonthlyReport, Error> {
    let period = month_bounds(month_of)?;

    let transactions = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE owner_id = ?1 AND date BETWEEN ?2 AND ?3"
        ))?
        .query_map((owner_id, period.start, period.end), map_transaction_row)?
        .collect::<Result<Vec<Transaction>, rusqlite::Error>>()?;

    let mut total_income = Decimal::ZERO;
    let mut total_expenses = Decimal::ZERO;
    let mut by_category: BTreeMap<&str, Decimal> = BTreeMap::new();

    for transaction in &transactions {
        match transaction.kind {
            TransactionType::Income => {
                total_income = checked_add(total_income, transaction.amount)?;
            }
            TransactionType::Expense => {
                total_expenses = checked_add(total_expenses, transaction.amount)?;
                let total = by_category
                    .entry(transaction.category.as_str())
                    .or_default();
                *total = checked_add(*total, transaction.amount)?;
            }
        }
    }

    let mut expenses_by_category: Vec<CategoryTotal> = by_category
        .into_iter()
        .map(|(category, total)| CategoryTotal {
            category: category.to_owned(),
            total,
        })
        .collect();
    expenses_by_category.sort_by(|a, b| b.total.cmp(&a.total).then(a.category.cmp(&b.category)));

    Ok(MonthlyReport {
        owner_id: owner_id.clone(),
        period,
        total_income,
        total_expenses,
        net: checked_sub(total_income, total_expenses)?,
        expenses_by_category,
        transaction_count: transactions.len(),
    })
}

/// The preset windows for the account chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChartRange {
    /// The last 7 days.
    #[serde(rename = "7D")]
    LastWeek,
    /// The last 30 days.
    #[default]
    #[serde(rename = "1M")]
    LastMonth,
    /// The last 90 days.
    #[serde(rename = "3M")]
    LastQuarter,
    /// The last 180 days.
    #[serde(rename = "6M")]
    LastHalfYear,
    /// Every transaction up to today.
    #[serde(rename = "ALL")]
    AllTime,
}

impl ChartRange {
    /// The short name of the range, e.g. "7D".
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastWeek => "7D",
            Self::LastMonth => "1M",
            Self::LastQuarter => "3M",
            Self::LastHalfYear => "6M",
            Self::AllTime => "ALL",
        }
    }

    /// How many days before `today` the range starts, `None` for all time.
    pub fn days(self) -> Option<i64> {
        match self {
            Self::LastWeek => Some(7),
            Self::LastMonth => Some(30),
            Self::LastQuarter => Some(90),
            Self::LastHalfYear => Some(180),
            Self::AllTime => None,
        }
    }

    /// Whether `date` is inside the range ending on `today`.
    pub fn contains(self, date: Date, today: Date) -> bool {
        if date > today {
            return false;
        }

        match self.days() {
            Some(days) => today
                .checked_sub(Duration::days(days))
                .is_none_or(|start| date >= start),
            None => true,
        }
    }
}

impl FromStr for ChartRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "7D" => Ok(Self::LastWeek),
            "1M" => Ok(Self::LastMonth),
            "3M" => Ok(Self::LastQuarter),
            "6M" => Ok(Self::LastHalfYear),
            "ALL" => Ok(Self::AllTime),
            _ => Err(Error::InvalidVariant {
                kind: "chart range",
                value: s.to_owned(),
            }),
        }
    }
}

impl Display for ChartRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Income and expenses recorded on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayTotal {
    /// The calendar day.
    pub date: Date,
    /// The sum of the day's income.
    pub income: Decimal,
    /// The sum of the day's expenses.
    pub expense: Decimal,
}

/// Per-day totals for a chart range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotals {
    /// The range the totals cover.
    pub range: ChartRange,
    /// One entry per day that has transactions, oldest first.
    pub days: Vec<DayTotal>,
    /// The sum of income over all days.
    pub total_income: Decimal,
    /// The sum of expenses over all days.
    pub total_expense: Decimal,
}

/// Group `transactions` in `range` by day.
///
/// Days without transactions are left out. Transactions dated after `today`
/// are ignored.
///
/// # Errors
/// Returns [Error::InvalidAmount] if a total is out of range.
pub fn daily_totals(
    transactions: &[Transaction],
    range: ChartRange,
    today: Date,
) -> Result<DailyTotals, Error> {
    let mut grouped: BTreeMap<Date, (Decimal, Decimal)> = BTreeMap::new();

    for transaction in transactions
        .iter()
        .filter(|transaction| range.contains(transaction.date, today))
    {
        let (income, expense) = grouped.entry(transaction.date).or_default();
        match transaction.kind {
            TransactionType::Income => *income = checked_add(*income, transaction.amount)?,
            TransactionType::Expense => *expense = checked_add(*expense, transaction.amount)?,
        }
    }

    let days: Vec<DayTotal> = grouped
        .into_iter()
        .map(|(date, (income, expense))| DayTotal {
            date,
            income,
            expense,
        })
        .collect();

    Ok(DailyTotals {
        range,
        total_income: checked_sum(days.iter().map(|day| day.income))?,
        total_expense: checked_sum(days.iter().map(|day| day.expense))?,
        days,
    })
}
