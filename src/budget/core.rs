//! The monthly spending ceiling of an owner.

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    money::{ensure_positive, get_decimal, to_column},
    owner::OwnerId,
};

/// Database identifier for a budget.
pub type BudgetId = i64;

/// The most an owner plans to spend in a calendar month.
///
/// An owner has at most one budget. Having none is a valid state that means
/// no ceiling is configured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budget {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The owner the ceiling applies to.
    pub owner_id: OwnerId,
    /// The monthly ceiling, always greater than zero.
    pub amount: Decimal,
    /// When the ceiling was last set.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const BUDGET_COLUMNS: &str = "id, owner_id, amount, updated_at";

/// Create the budget table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_budget_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL UNIQUE,
                amount TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_budget_row(row: &Row) -> Result<Budget, rusqlite::Error> {
    Ok(Budget {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        amount: get_decimal(row, 2)?,
        updated_at: row.get(3)?,
    })
}

/// Set the monthly ceiling of `owner_id`, replacing any existing ceiling.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if `ceiling` is not greater than zero,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn set_budget(
    owner_id: &OwnerId,
    ceiling: Decimal,
    connection: &Connection,
) -> Result<Budget, Error> {
    let ceiling = ensure_positive(ceiling)?;

    let budget = connection
        .prepare(&format!(
            "INSERT INTO budget (owner_id, amount, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner_id) DO UPDATE SET amount = excluded.amount, updated_at = excluded.updated_at
             RETURNING {BUDGET_COLUMNS}"
        ))?
        .query_row(
            (owner_id, to_column(ceiling), OffsetDateTime::now_utc()),
            map_budget_row,
        )?;

    tracing::info!(owner = %owner_id, amount = %budget.amount, "set budget");

    Ok(budget)
}

/// Retrieve the budget of `owner_id`, `None` if no ceiling is configured.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn current_budget(owner_id: &OwnerId, connection: &Connection) -> Result<Option<Budget>, Error> {
    let result = connection
        .prepare(&format!(
            "SELECT {BUDGET_COLUMNS} FROM budget WHERE owner_id = ?1"
        ))?
        .query_row([owner_id], map_budget_row);

    match result {
        Ok(budget) => Ok(Some(budget)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// The owners that have a budget, sorted by owner id.
pub(crate) fn owners_with_budget(connection: &Connection) -> Result<Vec<OwnerId>, Error> {
    connection
        .prepare("SELECT owner_id FROM budget ORDER BY owner_id")?
        .query_map([], |row| row.get(0))?
        .map(|owner_result| owner_result.map_err(Error::SqlError))
        .collect()
}
