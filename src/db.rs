//! Opening and initialising the SQLite ledger store.

use std::{path::Path, str::FromStr};

use rusqlite::{
    Connection, Transaction as SqlTransaction, TransactionBehavior,
    types::{FromSqlError, FromSqlResult, ValueRef},
};

use crate::{
    Error,
    account::create_account_table,
    budget::{create_budget_alert_table, create_budget_table},
    transaction::create_transaction_table,
};

/// Open the ledger database at `path` and create any missing tables.
///
/// # Errors
/// Returns [Error::SqlError] if the file cannot be opened or the schema cannot
/// be created.
pub fn open(path: &Path) -> Result<Connection, Error> {
    let connection = Connection::open(path)?;
    initialize(&connection)?;

    Ok(connection)
}

/// Create the tables for the domain models.
///
/// Safe to call on a database that has already been initialised.
///
/// # Errors
/// Returns [Error::SqlError] if any table or index cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    // Has no effect inside a transaction, so it must come first.
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_account_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_budget_table(&transaction)?;
    create_budget_alert_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Start a store transaction for an operation that reads and then writes.
///
/// The write lock is taken immediately, so a second process running the same
/// operation waits for this one to commit instead of reading stale rows.
///
/// # Errors
/// Returns [Error::SqlError] if the lock cannot be acquired before the
/// connection's busy timeout expires.
pub fn begin_write(connection: &Connection) -> Result<SqlTransaction<'_>, Error> {
    SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate).map_err(Error::from)
}

/// Parse a text column into one of the engine's enumerations.
///
/// Shared by the `FromSql` implementations of the types stored by name.
pub(crate) fn parse_text_column<T>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T: FromStr<Err = Error>,
{
    value
        .as_str()?
        .parse()
        .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
}
