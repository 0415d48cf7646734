//! The ledger and recurring-transaction engine behind a personal finance app.
//!
//! This library owns the rules that keep a user's ledger consistent:
//! - exactly one default account per owner,
//! - account balances that always agree with the transactions posted to them,
//! - recurring transactions that materialise on a deterministic schedule,
//! - monthly budget figures and budget alerts that fire once per band per month.
//!
//! Records live in SQLite via [rusqlite]. Every operation that reads and then
//! writes runs inside one `IMMEDIATE` store transaction, so several processes can
//! share a database file safely.

#![warn(missing_docs)]

pub mod account;
pub mod budget;
pub mod category;
pub mod config;
pub mod db;
pub mod money;
pub mod notify;
pub mod owner;
pub mod pagination;
pub mod period;
pub mod recurrence;
pub mod report;
pub mod timezone;
pub mod transaction;

pub use account::{Account, AccountId, AccountType};
pub use budget::{AlertBand, AlertDecision, AlertEvent, Budget, BudgetId};
pub use category::{CategoryCatalog, DefaultCategories};
pub use config::Config;
pub use db::initialize as initialize_db;
pub use notify::Notifier;
pub use owner::OwnerId;
pub use recurrence::{Recurrence, RecurringInterval, RunReport};
pub use transaction::{Transaction, TransactionId, TransactionType};

/// The errors that may occur in the ledger engine.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A monetary value was not acceptable for the operation, e.g. a
    /// transaction amount of zero or a budget ceiling below zero.
    ///
    /// The string describes the rejected input.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The referenced account or transaction does not exist, or is an
    /// account that the caller does not own.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The transaction exists but belongs to another owner.
    #[error("the resource belongs to another owner")]
    Forbidden,

    /// The operation would have left an owner with zero or several default
    /// accounts. The store transaction is rolled back before anything is
    /// written.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Materialising a recurring transaction failed. The template's schedule
    /// was left unadvanced and the next run will retry it.
    #[error("could not materialise recurring transaction {transaction_id}: {reason}")]
    ScheduleFailure {
        /// The ID of the recurring template that failed.
        transaction_id: i64,
        /// Why the child transaction could not be recorded.
        reason: String,
    },

    /// The category key is not in the catalog for the transaction type.
    #[error("\"{0}\" is not a valid category for this transaction type")]
    InvalidCategory(String),

    /// Text could not be parsed into one of the engine's enumerations.
    #[error("\"{value}\" is not a valid {kind}")]
    InvalidVariant {
        /// The name of the enumeration, e.g. "account type".
        kind: &'static str,
        /// The text that failed to parse.
        value: String,
    },

    /// An empty string was used to name an account.
    #[error("account name cannot be empty")]
    EmptyAccountName,

    /// Tried to delete an account that still owns transactions.
    #[error("account {0} still has transactions and cannot be deleted")]
    AccountNotEmpty(AccountId),

    /// A date calculation went outside the range supported by [time].
    #[error("date out of range: {0}")]
    DateOutOfRange(String),

    /// A canonical timezone name could not be resolved.
    #[error("invalid timezone {0}")]
    InvalidTimezone(String),

    /// The notification collaborator could not deliver an alert.
    #[error("could not deliver notification: {0}")]
    NotificationFailed(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<time::error::ComponentRange> for Error {
    fn from(value: time::error::ComponentRange) -> Self {
        Error::DateOutOfRange(value.to_string())
    }
}
