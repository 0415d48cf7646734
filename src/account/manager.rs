//! Account operations that keep exactly one default account per owner.
//!
//! Every operation that touches the default flag clears the old default and
//! sets the new one inside a single store transaction, then checks the
//! invariant before committing. A caller can therefore never observe an owner
//! with two default accounts, or with accounts but no default.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    db::begin_write,
    money::{checked_sum, get_decimal, to_column},
    owner::OwnerId,
    transaction::TransactionType,
};

use super::core::{
    ACCOUNT_COLUMNS, Account, AccountId, AccountType, count_accounts, get_account, map_account_row,
};

impl Account {
    /// Create a new account.
    ///
    /// Shortcut for [AccountBuilder] for discoverability.
    pub fn build(name: &str, kind: AccountType, opening_balance: Decimal) -> AccountBuilder {
        AccountBuilder {
            name: name.to_owned(),
            kind,
            opening_balance,
            is_default: false,
        }
    }
}

/// A builder for the fields of a new [Account].
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBuilder {
    /// The display name, e.g. "Everyday" or "Visa".
    pub name: String,
    /// The kind of account.
    pub kind: AccountType,
    /// The balance before any transactions are recorded.
    ///
    /// May be negative, e.g. for a credit card that already carries debt.
    pub opening_balance: Decimal,
    /// Whether the caller asked for this to become the default account.
    ///
    /// The first account an owner creates is always made the default.
    pub is_default: bool,
}

impl AccountBuilder {
    /// Ask for the new account to become the owner's default account.
    pub fn is_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }
}

/// Create an account for `owner_id`.
///
/// The account becomes the default if it was requested, or if it is the
/// owner's first account. Any previous default is cleared in the same store
/// transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::EmptyAccountName] if the name is blank,
/// - [Error::InvariantViolation] if the default flag check fails,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_account(
    owner_id: &OwnerId,
    builder: AccountBuilder,
    connection: &Connection,
) -> Result<Account, Error> {
    let name = builder.name.trim();
    if name.is_empty() {
        return Err(Error::EmptyAccountName);
    }

    let transaction = begin_write(connection)?;

    let existing_accounts = count_accounts(owner_id, &transaction)?;
    let is_default = existing_accounts == 0 || builder.is_default;

    if is_default {
        clear_default(owner_id, &transaction)?;
    }

    let account = transaction
        .prepare(&format!(
            "INSERT INTO account (owner_id, name, kind, balance, opening_balance, is_default, created_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)
             RETURNING {ACCOUNT_COLUMNS}"
        ))?
        .query_row(
            (
                owner_id,
                name,
                builder.kind,
                to_column(builder.opening_balance),
                is_default,
                OffsetDateTime::now_utc(),
            ),
            map_account_row,
        )?;

    ensure_single_default(owner_id, &transaction)?;
    transaction.commit()?;

    tracing::info!(
        owner = %owner_id,
        account_id = account.id,
        is_default,
        "created account"
    );

    Ok(account)
}

/// Make `account_id` the default account of `owner_id`.
///
/// Setting the current default again is a no-op.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the account does not belong to `owner_id`,
/// - [Error::InvariantViolation] if the default flag check fails,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn set_default_account(
    owner_id: &OwnerId,
    account_id: AccountId,
    connection: &Connection,
) -> Result<Account, Error> {
    let transaction = begin_write(connection)?;

    let account = get_account(owner_id, account_id, &transaction)?;

    if !account.is_default {
        clear_default(owner_id, &transaction)?;
        transaction.execute(
            "UPDATE account SET is_default = 1 WHERE id = ?1",
            [account_id],
        )?;
    }

    ensure_single_default(owner_id, &transaction)?;
    let account = get_account(owner_id, account_id, &transaction)?;
    transaction.commit()?;

    tracing::info!(owner = %owner_id, account_id, "set default account");

    Ok(account)
}

/// Retrieve the accounts owned by `owner_id`, newest first.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn list_accounts(owner_id: &OwnerId, connection: &Connection) -> Result<Vec<Account>, Error> {
    connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE owner_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?
        .query_map([owner_id], map_account_row)?
        .map(|maybe_account| maybe_account.map_err(|error| error.into()))
        .collect()
}

/// Retrieve the default account of `owner_id`, if the owner has any accounts.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn get_default_account(
    owner_id: &OwnerId,
    connection: &Connection,
) -> Result<Option<Account>, Error> {
    let result = connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE owner_id = ?1 AND is_default = 1"
        ))?
        .query_row([owner_id], map_account_row);

    match result {
        Ok(account) => Ok(Some(account)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Delete an account that has no transactions.
///
/// If the account was the default, the owner's most recently created
/// remaining account becomes the default in the same store transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the account does not belong to `owner_id`,
/// - [Error::AccountNotEmpty] if transactions are still posted to it,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_account(
    owner_id: &OwnerId,
    account_id: AccountId,
    connection: &Connection,
) -> Result<(), Error> {
    let transaction = begin_write(connection)?;

    let account = get_account(owner_id, account_id, &transaction)?;

    let transaction_count: u32 = transaction.query_row(
        "SELECT COUNT(id) FROM \"transaction\" WHERE account_id = ?1",
        [account_id],
        |row| row.get(0),
    )?;

    if transaction_count > 0 {
        return Err(Error::AccountNotEmpty(account_id));
    }

    transaction.execute("DELETE FROM account WHERE id = ?1", [account_id])?;

    if account.is_default {
        transaction.execute(
            "UPDATE account SET is_default = 1 WHERE id = (
                SELECT id FROM account WHERE owner_id = ?1
                ORDER BY created_at DESC, id DESC LIMIT 1
            )",
            [owner_id],
        )?;
    }

    ensure_single_default(owner_id, &transaction)?;
    transaction.commit()?;

    tracing::info!(owner = %owner_id, account_id, "deleted account");

    Ok(())
}

/// The stored balance of an account next to the balance implied by its ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    /// The account that was checked.
    pub account_id: AccountId,
    /// The running balance stored on the account.
    pub stored_balance: Decimal,
    /// The opening balance plus the signed amount of every posted transaction.
    pub ledger_balance: Decimal,
}

impl Reconciliation {
    /// Whether the stored balance agrees with the ledger.
    pub fn is_balanced(&self) -> bool {
        self.stored_balance == self.ledger_balance
    }
}

/// Recompute the balance of `account_id` from its full transaction history.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the account does not belong to `owner_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn reconcile_account(
    owner_id: &OwnerId,
    account_id: AccountId,
    connection: &Connection,
) -> Result<Reconciliation, Error> {
    // Both reads must see the same snapshot.
    let snapshot = connection.unchecked_transaction()?;

    let (stored_balance, opening_balance) = snapshot
        .prepare("SELECT balance, opening_balance FROM account WHERE id = ?1 AND owner_id = ?2")?
        .query_row((account_id, owner_id), |row| {
            Ok((get_decimal(row, 0)?, get_decimal(row, 1)?))
        })?;

    let entries = snapshot
        .prepare("SELECT kind, amount FROM \"transaction\" WHERE account_id = ?1")?
        .query_map([account_id], |row| {
            let kind: TransactionType = row.get(0)?;
            let amount = get_decimal(row, 1)?;
            Ok(kind.signed(amount))
        })?
        .collect::<Result<Vec<Decimal>, rusqlite::Error>>()?;
    snapshot.finish()?;

    let ledger_balance = checked_sum(std::iter::once(opening_balance).chain(entries))?;

    Ok(Reconciliation {
        account_id,
        stored_balance,
        ledger_balance,
    })
}

fn clear_default(owner_id: &OwnerId, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "UPDATE account SET is_default = 0 WHERE owner_id = ?1 AND is_default = 1",
        [owner_id],
    )?;

    Ok(())
}

/// Check that an owner with accounts has exactly one default account.
///
/// Runs inside the store transaction, before the commit.
fn ensure_single_default(owner_id: &OwnerId, connection: &Connection) -> Result<(), Error> {
    let (account_count, default_count): (u32, u32) = connection.query_row(
        "SELECT COUNT(id), COALESCE(SUM(is_default), 0) FROM account WHERE owner_id = ?1",
        [owner_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if account_count > 0 && default_count != 1 {
        tracing::error!(
            owner = %owner_id,
            account_count,
            default_count,
            "refusing to commit default account change"
        );
        return Err(Error::InvariantViolation(format!(
            "owner {owner_id} would have {default_count} default accounts"
        )));
    }

    Ok(())
}
