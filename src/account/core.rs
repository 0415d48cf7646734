//! Defines the account model and its database table.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    db::parse_text_column,
    money::{checked_add, get_decimal, to_column},
    owner::OwnerId,
};

/// Database identifier for an account.
pub type AccountId = i64;

/// The kind of bank account. This is a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// An everyday transaction account.
    Checking,
    /// A savings account.
    Savings,
    /// A credit card or line of credit. Balances are usually negative.
    Credit,
}

impl AccountType {
    /// The name used for the account type in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "CHECKING",
            Self::Savings => "SAVINGS",
            Self::Credit => "CREDIT",
        }
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CHECKING" => Ok(Self::Checking),
            "SAVINGS" => Ok(Self::Savings),
            "CREDIT" => Ok(Self::Credit),
            _ => Err(Error::InvalidVariant {
                kind: "account type",
                value: s.to_owned(),
            }),
        }
    }
}

impl Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for AccountType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccountType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

/// A bank account or credit card that transactions are posted to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// The ID of the account.
    pub id: AccountId,
    /// The owner of the account.
    pub owner_id: OwnerId,
    /// The display name of the account.
    pub name: String,
    /// What kind of account this is.
    pub kind: AccountType,
    /// The running balance: the opening balance plus every posted transaction.
    pub balance: Decimal,
    /// Whether this is the owner's default account.
    ///
    /// Each owner with at least one account has exactly one default account.
    pub is_default: bool,
    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The columns selected by [map_account_row], in order.
pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, owner_id, name, kind, balance, is_default, created_at";

/// Create the account table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('CHECKING', 'SAVINGS', 'CREDIT')),
            balance TEXT NOT NULL,
            opening_balance TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        (),
    )?;

    // The store itself refuses a second default account for the same owner.
    connection.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_account_single_default
         ON account(owner_id) WHERE is_default = 1",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_account_owner ON account(owner_id, created_at)",
        (),
    )?;

    Ok(())
}

/// Map a database row to an [Account].
///
/// The row must contain the columns in [ACCOUNT_COLUMNS].
pub fn map_account_row(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        balance: get_decimal(row, 4)?,
        is_default: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Retrieve the account `account_id` if it belongs to `owner_id`.
///
/// # Errors
/// Returns [Error::NotFound] if the account does not exist or belongs to
/// someone else, or [Error::SqlError] if there is some other SQL error.
pub fn get_account(
    owner_id: &OwnerId,
    account_id: AccountId,
    connection: &Connection,
) -> Result<Account, Error> {
    connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = ?1 AND owner_id = ?2"
        ))?
        .query_row((account_id, owner_id), map_account_row)
        .map_err(|error| error.into())
}

/// Add `delta` to the balance of `account_id` and return the new balance.
///
/// Callers must run this inside the same store transaction as the ledger
/// change it accounts for.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the account does not exist,
/// - [Error::InvalidAmount] if the new balance is out of range.
pub(crate) fn adjust_balance(
    account_id: AccountId,
    delta: Decimal,
    connection: &Connection,
) -> Result<Decimal, Error> {
    let current = connection
        .prepare("SELECT balance FROM account WHERE id = ?1")?
        .query_row([account_id], |row| get_decimal(row, 0))?;

    let new_balance = checked_add(current, delta)?;

    connection.execute(
        "UPDATE account SET balance = ?1 WHERE id = ?2",
        (to_column(new_balance), account_id),
    )?;

    Ok(new_balance)
}

/// Count the accounts owned by `owner_id`.
pub(crate) fn count_accounts(owner_id: &OwnerId, connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row(
            "SELECT COUNT(id) FROM account WHERE owner_id = ?1",
            [owner_id],
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}
