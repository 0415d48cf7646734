//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    account::AccountId,
    db::parse_text_column,
    money::get_decimal,
    owner::OwnerId,
    recurrence::{Recurrence, RecurringInterval},
};

// ============================================================================
// MODELS
// ============================================================================

/// Database identifier for a transaction.
pub type TransactionId = i64;

/// Whether money came in or went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Money earned, e.g. wages.
    Income,
    /// Money spent, e.g. groceries.
    Expense,
}

impl TransactionType {
    /// The name used for the transaction type in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }

    /// The effect of `amount` on an account balance: positive for income,
    /// negative for expenses.
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            Self::Income => amount,
            Self::Expense => -amount,
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCOME" => Ok(Self::Income),
            "EXPENSE" => Ok(Self::Expense),
            _ => Err(Error::InvalidVariant {
                kind: "transaction type",
                value: s.to_owned(),
            }),
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

/// An expense or income posted to an account.
///
/// To create a new `Transaction`, use [Transaction::build] and
/// [crate::transaction::record_transaction].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The owner of the transaction and its account.
    pub owner_id: OwnerId,
    /// The account the transaction is posted to.
    pub account_id: AccountId,
    /// Whether this is income or an expense.
    pub kind: TransactionType,
    /// The unsigned amount. The sign of its effect comes from `kind`.
    pub amount: Decimal,
    /// The category key, validated against the category catalog.
    pub category: String,
    /// The calendar date of the transaction.
    pub date: Date,
    /// An optional free text description.
    pub description: Option<String>,
    /// The schedule of a recurring transaction, `None` for one-off entries.
    pub recurrence: Option<Recurrence>,
    /// The recurring template this transaction was materialised from.
    pub template_id: Option<TransactionId>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        account_id: AccountId,
        kind: TransactionType,
        amount: Decimal,
        category: &str,
        date: Date,
    ) -> TransactionBuilder {
        TransactionBuilder {
            account_id,
            kind,
            amount,
            category: category.to_owned(),
            date,
            description: None,
            recurrence: None,
            template_id: None,
        }
    }

    /// Whether the transaction repeats on a schedule.
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// The effect of this transaction on its account balance.
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

/// A builder for creating [Transaction] instances.
///
/// # Examples
///
/// ```
/// use rust_decimal::Decimal;
/// use time::macros::date;
///
/// use ledger_engine::{RecurringInterval, Transaction, TransactionType};
///
/// let rent = Transaction::build(
///         1,
///         TransactionType::Expense,
///         Decimal::new(1_450_00, 2),
///         "housing",
///         date!(2025 - 01 - 31),
///     )
///     .description("Rent")
///     .recurring(RecurringInterval::Monthly);
///
/// assert_eq!(rent.recurrence, Some(RecurringInterval::Monthly));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionBuilder {
    /// The account to post the transaction to.
    pub account_id: AccountId,
    /// Whether this is income or an expense.
    pub kind: TransactionType,
    /// The amount of money, which must be greater than zero.
    pub amount: Decimal,
    /// The category key.
    pub category: String,
    /// The calendar date of the transaction.
    ///
    /// For a recurring transaction this is also the first occurrence and the
    /// anchor for monthly and yearly schedules.
    pub date: Date,
    /// An optional description. Blank descriptions are stored as `None`.
    pub description: Option<String>,
    /// Makes the transaction a recurring template with this interval.
    pub recurrence: Option<RecurringInterval>,
    /// Set when the recurrence scheduler materialises a child of a template.
    pub(crate) template_id: Option<TransactionId>,
}

impl TransactionBuilder {
    /// Set the description for the transaction.
    pub fn description(mut self, description: &str) -> Self {
        self.description = normalize_description(Some(description));
        self
    }

    /// Make the transaction repeat every `interval`.
    pub fn recurring(mut self, interval: RecurringInterval) -> Self {
        self.recurrence = Some(interval);
        self
    }

    pub(crate) fn template_id(mut self, template_id: TransactionId) -> Self {
        self.template_id = Some(template_id);
        self
    }
}

/// Trim a description, mapping blank text to `None`.
pub(crate) fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// The columns selected by [map_transaction_row], in order.
pub(crate) const TRANSACTION_COLUMNS: &str = "id, owner_id, account_id, kind, amount, category, \
    date, description, recurring_interval, next_recurring_date, last_processed_date, \
    recurring_template_id";

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                account_id INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('INCOME', 'EXPENSE')),
                amount TEXT NOT NULL,
                category TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT,
                recurring_interval TEXT,
                next_recurring_date TEXT,
                last_processed_date TEXT,
                recurring_template_id INTEGER,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE RESTRICT,
                FOREIGN KEY(recurring_template_id) REFERENCES \"transaction\"(id) ON DELETE SET NULL,
                CHECK ((recurring_interval IS NULL) = (next_recurring_date IS NULL)),
                CHECK ((recurring_interval IS NULL) = (last_processed_date IS NULL))
                )",
        (),
    )?;

    // Used by the budget aggregator and reports.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_owner_date ON \"transaction\"(owner_id, date)",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_account ON \"transaction\"(account_id)",
        (),
    )?;

    // Used by the recurrence scheduler to find due templates.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_next_recurring_date
         ON \"transaction\"(next_recurring_date) WHERE recurring_interval IS NOT NULL",
        (),
    )?;

    // A template never has two children on the same date.
    connection.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transaction_template_date
         ON \"transaction\"(recurring_template_id, date) WHERE recurring_template_id IS NOT NULL",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
///
/// The row must contain the columns in [TRANSACTION_COLUMNS].
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let interval: Option<RecurringInterval> = row.get(8)?;
    let next_date: Option<Date> = row.get(9)?;
    let last_processed_date: Option<Date> = row.get(10)?;

    let recurrence = match (interval, next_date, last_processed_date) {
        (Some(interval), Some(next_date), Some(last_processed_date)) => Some(Recurrence {
            interval,
            next_date,
            last_processed_date,
        }),
        (None, None, None) => None,
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                8,
                Type::Null,
                Box::new(Error::InvariantViolation(
                    "recurring schedule is only partially set".to_owned(),
                )),
            ));
        }
    };

    Ok(Transaction {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        account_id: row.get(2)?,
        kind: row.get(3)?,
        amount: get_decimal(row, 4)?,
        category: row.get(5)?,
        date: row.get(6)?,
        description: row.get(7)?,
        recurrence,
        template_id: row.get(11)?,
    })
}

/// Retrieve a transaction by its `id`, checking that `owner_id` owns it.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction,
/// - [Error::Forbidden] if the transaction belongs to someone else,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_transaction(
    owner_id: &OwnerId,
    id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = :id"
        ))?
        .query_row(&[(":id", &id)], map_transaction_row)?;

    if &transaction.owner_id != owner_id {
        return Err(Error::Forbidden);
    }

    Ok(transaction)
}

/// Retrieve the transactions of `owner_id`, newest first.
///
/// When `account_id` is given only that account's transactions are returned.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn list_transactions(
    owner_id: &OwnerId,
    account_id: Option<AccountId>,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    // Sort by date, and then ID to keep transaction order stable after updates
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE owner_id = ?1 AND (?2 IS NULL OR account_id = ?2)
             ORDER BY date DESC, id DESC"
        ))?
        .query_map((owner_id, account_id), map_transaction_row)?
        .map(|transaction_result| transaction_result.map_err(Error::SqlError))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{Error, recurrence::RecurringInterval};

    use super::{Transaction, TransactionType, create_transaction_table, normalize_description};

    #[test]
    fn sql_is_valid() {
        let connection = Connection::open_in_memory().unwrap();
        crate::account::create_account_table(&connection).unwrap();

        assert_eq!(Ok(()), create_transaction_table(&connection));
    }

    #[test]
    fn signed_amount_follows_type() {
        assert_eq!(TransactionType::Income.signed(dec!(12.5)), dec!(12.5));
        assert_eq!(TransactionType::Expense.signed(dec!(12.5)), dec!(-12.5));
    }

    #[test]
    fn transaction_type_parses_case_insensitively() {
        assert_eq!("expense".parse(), Ok(TransactionType::Expense));
        assert!(matches!(
            "transfer".parse::<TransactionType>(),
            Err(Error::InvalidVariant { .. })
        ));
    }

    #[test]
    fn builder_sets_optional_fields() {
        let builder = Transaction::build(
            3,
            TransactionType::Expense,
            dec!(9.99),
            "entertainment",
            date!(2025 - 06 - 01),
        )
        .description("  Streaming  ")
        .recurring(RecurringInterval::Monthly);

        assert_eq!(builder.description.as_deref(), Some("Streaming"));
        assert_eq!(builder.recurrence, Some(RecurringInterval::Monthly));
        assert_eq!(builder.template_id, None);
    }

    #[test]
    fn blank_description_becomes_none() {
        assert_eq!(normalize_description(Some("   ")), None);
        assert_eq!(normalize_description(None), None);
    }
}
