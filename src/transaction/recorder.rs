//! Writes to the ledger that keep account balances in step with their
//! transactions.
//!
//! Every operation inserts, changes or removes ledger entries and adjusts the
//! affected balances inside one store transaction.

use std::collections::BTreeMap;

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    account::{AccountId, adjust_balance, get_account},
    category::{CategoryCatalog, validate_category},
    db::begin_write,
    money::{checked_sub, ensure_positive, to_column},
    owner::OwnerId,
    recurrence::{Recurrence, RecurringInterval},
};

use super::core::{
    TRANSACTION_COLUMNS, Transaction, TransactionBuilder, TransactionId, TransactionType,
    get_transaction, map_transaction_row, normalize_description,
};

/// Record a new transaction for `owner_id` and apply it to the account balance.
///
/// A recurring transaction is the first occurrence of its own schedule: its
/// next occurrence is one interval after `builder.date`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the amount is not greater than zero, or the
///   account balance would go out of range,
/// - [Error::InvalidCategory] if `categories` rejects the category,
/// - [Error::NotFound] if the account does not belong to `owner_id`,
/// - [Error::DateOutOfRange] if the next occurrence cannot be represented,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn record_transaction(
    owner_id: &OwnerId,
    builder: TransactionBuilder,
    categories: &dyn CategoryCatalog,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let sql_transaction = begin_write(connection)?;
    let transaction = insert_transaction(owner_id, builder, categories, &sql_transaction)?;
    sql_transaction.commit()?;

    tracing::info!(
        owner = %owner_id,
        transaction_id = transaction.id,
        account_id = transaction.account_id,
        kind = %transaction.kind,
        amount = %transaction.amount,
        recurring = transaction.is_recurring(),
        "recorded transaction"
    );

    Ok(transaction)
}

/// Insert a transaction and adjust its account balance.
///
/// The caller owns the store transaction and decides when to commit.
pub(crate) fn insert_transaction(
    owner_id: &OwnerId,
    builder: TransactionBuilder,
    categories: &dyn CategoryCatalog,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let amount = ensure_positive(builder.amount)?;
    validate_category(categories, builder.kind, &builder.category)?;
    get_account(owner_id, builder.account_id, connection)?;

    let recurrence = builder
        .recurrence
        .map(|interval| Recurrence::starting(interval, builder.date))
        .transpose()?;

    let transaction = connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (owner_id, account_id, kind, amount, category, date,
                description, recurring_interval, next_recurring_date, last_processed_date,
                recurring_template_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                owner_id,
                builder.account_id,
                builder.kind,
                to_column(amount),
                &builder.category,
                builder.date,
                &builder.description,
                recurrence.map(|schedule| schedule.interval),
                recurrence.map(|schedule| schedule.next_date),
                recurrence.map(|schedule| schedule.last_processed_date),
                builder.template_id,
            ),
            map_transaction_row,
        )?;

    adjust_balance(
        transaction.account_id,
        transaction.signed_amount(),
        connection,
    )?;

    Ok(transaction)
}

/// The fields to change on an existing transaction.
///
/// `None` leaves a field unchanged. For `description` and `recurrence`,
/// `Some(None)` clears the field; clearing the recurrence cancels the
/// schedule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    /// Move the transaction to another account owned by the same owner.
    pub account_id: Option<AccountId>,
    /// Change between income and expense.
    pub kind: Option<TransactionType>,
    /// The new amount, which must be greater than zero.
    pub amount: Option<Decimal>,
    /// The new category key.
    pub category: Option<String>,
    /// The new date.
    pub date: Option<Date>,
    /// The new description.
    pub description: Option<Option<String>>,
    /// The new recurrence interval.
    pub recurrence: Option<Option<RecurringInterval>>,
}

/// Change a transaction and move its balance effect in one step.
///
/// The old effect is reversed and the new one applied as a single net
/// adjustment per affected account. Changing the interval or the date of a
/// recurring transaction restarts its schedule from the new date.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the transaction, or the account it is moved to,
///   does not exist for `owner_id`,
/// - [Error::Forbidden] if the transaction belongs to someone else,
/// - [Error::InvalidAmount] if the new amount is not greater than zero, or an
///   account balance would go out of range,
/// - [Error::InvalidCategory] if `categories` rejects the resulting category,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    owner_id: &OwnerId,
    transaction_id: TransactionId,
    update: TransactionUpdate,
    categories: &dyn CategoryCatalog,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let sql_transaction = begin_write(connection)?;
    let existing = get_transaction(owner_id, transaction_id, &sql_transaction)?;

    let account_id = update.account_id.unwrap_or(existing.account_id);
    let kind = update.kind.unwrap_or(existing.kind);
    let amount = ensure_positive(update.amount.unwrap_or(existing.amount))?;
    let category = update.category.unwrap_or_else(|| existing.category.clone());
    let date = update.date.unwrap_or(existing.date);
    let description = match update.description {
        Some(description) => normalize_description(description.as_deref()),
        None => existing.description.clone(),
    };

    validate_category(categories, kind, &category)?;

    if account_id != existing.account_id {
        get_account(owner_id, account_id, &sql_transaction)?;
    }

    let interval = update
        .recurrence
        .unwrap_or(existing.recurrence.map(|schedule| schedule.interval));
    let recurrence = match (existing.recurrence, interval) {
        (_, None) => None,
        (Some(schedule), Some(interval))
            if schedule.interval == interval && existing.date == date =>
        {
            Some(schedule)
        }
        (_, Some(interval)) => Some(Recurrence::starting(interval, date)?),
    };

    let updated = sql_transaction
        .prepare(&format!(
            "UPDATE \"transaction\"
             SET account_id = ?1, kind = ?2, amount = ?3, category = ?4, date = ?5,
                description = ?6, recurring_interval = ?7, next_recurring_date = ?8,
                last_processed_date = ?9
             WHERE id = ?10
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                account_id,
                kind,
                to_column(amount),
                &category,
                date,
                &description,
                recurrence.map(|schedule| schedule.interval),
                recurrence.map(|schedule| schedule.next_date),
                recurrence.map(|schedule| schedule.last_processed_date),
                transaction_id,
            ),
            map_transaction_row,
        )?;

    if updated.account_id == existing.account_id {
        let delta = checked_sub(updated.signed_amount(), existing.signed_amount())?;
        if !delta.is_zero() {
            adjust_balance(updated.account_id, delta, &sql_transaction)?;
        }
    } else {
        adjust_balance(
            existing.account_id,
            -existing.signed_amount(),
            &sql_transaction,
        )?;
        adjust_balance(
            updated.account_id,
            updated.signed_amount(),
            &sql_transaction,
        )?;
    }

    sql_transaction.commit()?;

    tracing::info!(
        owner = %owner_id,
        transaction_id,
        account_id = updated.account_id,
        "updated transaction"
    );

    Ok(updated)
}

/// What happened to one id in a call to [delete_transactions].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteOutcome {
    /// The transaction was removed and its balance effect reversed.
    Deleted,
    /// No transaction has this id.
    NotFound,
    /// The transaction belongs to someone else and was left alone.
    Forbidden,
    /// The change for this transaction's account was rejected, or the
    /// transaction moved to another account while the batch was running.
    Failed(String),
}

/// The outcome for one id in a call to [delete_transactions].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    /// The id the caller asked to delete.
    pub transaction_id: TransactionId,
    /// What happened to it.
    pub outcome: DeleteOutcome,
}

/// Delete a batch of transactions owned by `owner_id`.
///
/// Transactions are grouped by account and each account's group is removed,
/// with one net balance reversal, in its own store transaction. Ids that are
/// missing or owned by someone else are skipped and reported. A failure on
/// one account does not undo the groups already committed for other
/// accounts.
///
/// Duplicate ids are deleted once. Results are returned in the order the ids
/// were first given.
///
/// # Errors
/// Returns [Error::SqlError] only if the ownership lookup itself fails.
/// Problems with individual ids are reported in the results.
pub fn delete_transactions(
    owner_id: &OwnerId,
    transaction_ids: &[TransactionId],
    connection: &Connection,
) -> Result<Vec<DeleteResult>, Error> {
    let mut ids = Vec::with_capacity(transaction_ids.len());
    for &id in transaction_ids {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let mut outcomes: BTreeMap<TransactionId, DeleteOutcome> = BTreeMap::new();
    let mut by_account: BTreeMap<AccountId, Vec<TransactionId>> = BTreeMap::new();

    {
        let mut statement = connection
            .prepare("SELECT owner_id, account_id FROM \"transaction\" WHERE id = ?1")?;

        for &id in &ids {
            let lookup = statement.query_row([id], |row| {
                Ok((row.get::<_, OwnerId>(0)?, row.get::<_, AccountId>(1)?))
            });

            match lookup {
                Ok((owner, account_id)) if &owner == owner_id => {
                    by_account.entry(account_id).or_default().push(id);
                }
                Ok(_) => {
                    tracing::warn!(owner = %owner_id, transaction_id = id, "skipping transaction owned by someone else");
                    outcomes.insert(id, DeleteOutcome::Forbidden);
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tracing::warn!(owner = %owner_id, transaction_id = id, "skipping missing transaction");
                    outcomes.insert(id, DeleteOutcome::NotFound);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    for (account_id, group) in by_account {
        match delete_account_group(owner_id, account_id, &group, connection) {
            Ok(group_outcomes) => outcomes.extend(group_outcomes),
            Err(error) => {
                tracing::warn!(
                    owner = %owner_id,
                    account_id,
                    %error,
                    "could not delete transactions for account"
                );
                for id in group {
                    outcomes.insert(id, DeleteOutcome::Failed(error.to_string()));
                }
            }
        }
    }

    Ok(ids
        .into_iter()
        .map(|transaction_id| DeleteResult {
            transaction_id,
            outcome: outcomes
                .remove(&transaction_id)
                .unwrap_or(DeleteOutcome::NotFound),
        })
        .collect())
}

/// Remove the transactions in `group` from one account and reverse their
/// combined effect with a single balance adjustment.
fn delete_account_group(
    owner_id: &OwnerId,
    account_id: AccountId,
    group: &[TransactionId],
    connection: &Connection,
) -> Result<Vec<(TransactionId, DeleteOutcome)>, Error> {
    let sql_transaction = begin_write(connection)?;
    let mut outcomes = Vec::with_capacity(group.len());
    let mut reversal = Decimal::ZERO;

    for &id in group {
        // Re-read under the write lock, another caller may have got here first.
        let transaction = match get_transaction(owner_id, id, &sql_transaction) {
            Ok(transaction) if transaction.account_id == account_id => transaction,
            Ok(transaction) => {
                outcomes.push((
                    id,
                    DeleteOutcome::Failed(format!(
                        "moved to account {} before it could be deleted",
                        transaction.account_id
                    )),
                ));
                continue;
            }
            Err(Error::NotFound) => {
                outcomes.push((id, DeleteOutcome::NotFound));
                continue;
            }
            Err(Error::Forbidden) => {
                outcomes.push((id, DeleteOutcome::Forbidden));
                continue;
            }
            Err(error) => return Err(error),
        };

        sql_transaction.execute("DELETE FROM \"transaction\" WHERE id = ?1", [id])?;
        reversal = checked_sub(reversal, transaction.signed_amount())?;
        outcomes.push((id, DeleteOutcome::Deleted));
    }

    if !reversal.is_zero() {
        adjust_balance(account_id, reversal, &sql_transaction)?;
    }

    sql_transaction.commit()?;

    let deleted = outcomes
        .iter()
        .filter(|(_, outcome)| *outcome == DeleteOutcome::Deleted)
        .count();
    tracing::info!(owner = %owner_id, account_id, deleted, "deleted transactions");

    Ok(outcomes)
}

/// Stop a recurring transaction from producing further occurrences.
///
/// The transaction stays in the ledger as an ordinary entry. Cancelling a
/// transaction that is not recurring is a no-op.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the transaction does not exist,
/// - [Error::Forbidden] if the transaction belongs to someone else,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn cancel_recurrence(
    owner_id: &OwnerId,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let sql_transaction = begin_write(connection)?;
    let existing = get_transaction(owner_id, transaction_id, &sql_transaction)?;

    if !existing.is_recurring() {
        return Ok(existing);
    }

    let cancelled = sql_transaction
        .prepare(&format!(
            "UPDATE \"transaction\"
             SET recurring_interval = NULL, next_recurring_date = NULL, last_processed_date = NULL
             WHERE id = ?1
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row([transaction_id], map_transaction_row)?;

    sql_transaction.commit()?;

    tracing::info!(owner = %owner_id, transaction_id, "cancelled recurrence");

    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        account::{Account, AccountId, AccountType, create_account, get_account, reconcile_account},
        category::DefaultCategories,
        db::initialize,
        owner::OwnerId,
        recurrence::RecurringInterval,
        transaction::{Transaction, TransactionType, get_transaction, list_transactions},
    };

    use super::{
        DeleteOutcome, TransactionUpdate, cancel_recurrence, delete_account_group,
        delete_transactions, record_transaction, update_transaction,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn new_account(owner: &OwnerId, opening: Decimal, conn: &Connection) -> AccountId {
        create_account(
            owner,
            Account::build("Everyday", AccountType::Checking, opening),
            conn,
        )
        .unwrap()
        .id
    }

    fn balance(owner: &OwnerId, account_id: AccountId, conn: &Connection) -> Decimal {
        get_account(owner, account_id, conn).unwrap().balance
    }

    fn expense(account_id: AccountId, amount: Decimal) -> crate::transaction::TransactionBuilder {
        Transaction::build(
            account_id,
            TransactionType::Expense,
            amount,
            "groceries",
            date!(2025 - 03 - 10),
        )
    }

    #[test]
    fn record_adjusts_balance_by_type() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(100), &conn);

        record_transaction(&owner, expense(account_id, dec!(30.25)), &DefaultCategories, &conn)
            .unwrap();
        record_transaction(
            &owner,
            Transaction::build(
                account_id,
                TransactionType::Income,
                dec!(1000),
                "salary",
                date!(2025 - 03 - 15),
            ),
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        assert_eq!(balance(&owner, account_id, &conn), dec!(1069.75));
        assert!(reconcile_account(&owner, account_id, &conn).unwrap().is_balanced());
    }

    #[test]
    fn record_rejects_non_positive_amounts() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);

        for amount in [dec!(0), dec!(-5)] {
            let result =
                record_transaction(&owner, expense(account_id, amount), &DefaultCategories, &conn);

            assert!(matches!(result, Err(Error::InvalidAmount(_))));
        }
        assert_eq!(balance(&owner, account_id, &conn), dec!(0));
    }

    #[test]
    fn record_rejects_other_owners_account() {
        let conn = get_test_connection();
        let bobs_account = new_account(&OwnerId::new("bob"), dec!(0), &conn);

        let result = record_transaction(
            &OwnerId::new("alice"),
            expense(bobs_account, dec!(10)),
            &DefaultCategories,
            &conn,
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn record_rejects_category_of_wrong_type() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);

        let result = record_transaction(
            &owner,
            Transaction::build(
                account_id,
                TransactionType::Expense,
                dec!(10),
                "salary",
                date!(2025 - 03 - 10),
            ),
            &DefaultCategories,
            &conn,
        );

        assert_eq!(result, Err(Error::InvalidCategory("salary".to_owned())));
    }

    #[test]
    fn record_recurring_sets_first_schedule() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);

        let rent = record_transaction(
            &owner,
            Transaction::build(
                account_id,
                TransactionType::Expense,
                dec!(1450),
                "housing",
                date!(2025 - 01 - 31),
            )
            .recurring(RecurringInterval::Monthly),
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        let schedule = rent.recurrence.unwrap();
        assert_eq!(schedule.next_date, date!(2025 - 02 - 28));
        assert_eq!(schedule.last_processed_date, date!(2025 - 01 - 31));
    }

    #[test]
    fn update_applies_net_delta() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(100), &conn);
        let transaction =
            record_transaction(&owner, expense(account_id, dec!(40)), &DefaultCategories, &conn)
                .unwrap();

        let updated = update_transaction(
            &owner,
            transaction.id,
            TransactionUpdate {
                amount: Some(dec!(25)),
                description: Some(Some("Farmers market".to_owned())),
                ..Default::default()
            },
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        assert_eq!(updated.amount, dec!(25));
        assert_eq!(updated.description.as_deref(), Some("Farmers market"));
        assert_eq!(balance(&owner, account_id, &conn), dec!(75));
    }

    #[test]
    fn update_changing_type_flips_effect() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);
        let transaction =
            record_transaction(&owner, expense(account_id, dec!(10)), &DefaultCategories, &conn)
                .unwrap();

        update_transaction(
            &owner,
            transaction.id,
            TransactionUpdate {
                kind: Some(TransactionType::Income),
                category: Some("freelance".to_owned()),
                ..Default::default()
            },
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        assert_eq!(balance(&owner, account_id, &conn), dec!(10));
    }

    #[test]
    fn update_moves_effect_between_accounts() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let from = new_account(&owner, dec!(100), &conn);
        let to = new_account(&owner, dec!(100), &conn);
        let transaction =
            record_transaction(&owner, expense(from, dec!(20)), &DefaultCategories, &conn)
                .unwrap();

        update_transaction(
            &owner,
            transaction.id,
            TransactionUpdate {
                account_id: Some(to),
                ..Default::default()
            },
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        assert_eq!(balance(&owner, from, &conn), dec!(100));
        assert_eq!(balance(&owner, to, &conn), dec!(80));
        assert!(reconcile_account(&owner, from, &conn).unwrap().is_balanced());
        assert!(reconcile_account(&owner, to, &conn).unwrap().is_balanced());
    }

    #[test]
    fn update_by_other_owner_is_forbidden() {
        let conn = get_test_connection();
        let alice = OwnerId::new("alice");
        let account_id = new_account(&alice, dec!(0), &conn);
        let transaction =
            record_transaction(&alice, expense(account_id, dec!(10)), &DefaultCategories, &conn)
                .unwrap();

        let result = update_transaction(
            &OwnerId::new("mallory"),
            transaction.id,
            TransactionUpdate {
                amount: Some(dec!(1)),
                ..Default::default()
            },
            &DefaultCategories,
            &conn,
        );

        assert_eq!(result, Err(Error::Forbidden));
        assert_eq!(balance(&alice, account_id, &conn), dec!(-10));
    }

    #[test]
    fn update_missing_transaction_is_not_found() {
        let conn = get_test_connection();

        let result = update_transaction(
            &OwnerId::new("alice"),
            404,
            TransactionUpdate::default(),
            &DefaultCategories,
            &conn,
        );

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn update_clearing_recurrence_cancels_schedule() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);
        let template = record_transaction(
            &owner,
            expense(account_id, dec!(15)).recurring(RecurringInterval::Weekly),
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        let updated = update_transaction(
            &owner,
            template.id,
            TransactionUpdate {
                recurrence: Some(None),
                ..Default::default()
            },
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        assert!(!updated.is_recurring());
    }

    #[test]
    fn delete_reverses_balance_and_reports_each_id() {
        let conn = get_test_connection();
        let alice = OwnerId::new("alice");
        let bob = OwnerId::new("bob");
        let everyday = new_account(&alice, dec!(100), &conn);
        let savings = new_account(&alice, dec!(500), &conn);
        let bobs_account = new_account(&bob, dec!(0), &conn);

        let first =
            record_transaction(&alice, expense(everyday, dec!(10)), &DefaultCategories, &conn)
                .unwrap();
        let second =
            record_transaction(&alice, expense(everyday, dec!(15)), &DefaultCategories, &conn)
                .unwrap();
        let third =
            record_transaction(&alice, expense(savings, dec!(50)), &DefaultCategories, &conn)
                .unwrap();
        let bobs =
            record_transaction(&bob, expense(bobs_account, dec!(5)), &DefaultCategories, &conn)
                .unwrap();

        let results = delete_transactions(
            &alice,
            &[first.id, bobs.id, 999, second.id, third.id, first.id],
            &conn,
        )
        .unwrap();

        let outcomes: Vec<(i64, DeleteOutcome)> = results
            .into_iter()
            .map(|result| (result.transaction_id, result.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (first.id, DeleteOutcome::Deleted),
                (bobs.id, DeleteOutcome::Forbidden),
                (999, DeleteOutcome::NotFound),
                (second.id, DeleteOutcome::Deleted),
                (third.id, DeleteOutcome::Deleted),
            ]
        );
        assert_eq!(balance(&alice, everyday, &conn), dec!(100));
        assert_eq!(balance(&alice, savings, &conn), dec!(500));
        assert_eq!(balance(&bob, bobs_account, &conn), dec!(-5));
        assert!(list_transactions(&alice, None, &conn).unwrap().is_empty());
    }

    #[test]
    fn cancel_recurrence_keeps_entry() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);
        let template = record_transaction(
            &owner,
            expense(account_id, dec!(15)).recurring(RecurringInterval::Daily),
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        let cancelled = cancel_recurrence(&owner, template.id, &conn).unwrap();

        assert_eq!(cancelled.recurrence, None);
        assert_eq!(cancelled.amount, dec!(15));
        assert_eq!(
            get_transaction(&owner, template.id, &conn).unwrap(),
            cancelled
        );
        assert_eq!(balance(&owner, account_id, &conn), dec!(-15));
    }

    #[test]
    fn cancel_recurrence_by_other_owner_is_forbidden() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);
        let template = record_transaction(
            &owner,
            expense(account_id, dec!(15)).recurring(RecurringInterval::Daily),
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        let result = cancel_recurrence(&OwnerId::new("bob"), template.id, &conn);

        assert_eq!(result, Err(Error::Forbidden));
    }

    fn income(account_id: AccountId, amount: Decimal) -> crate::transaction::TransactionBuilder {
        Transaction::build(
            account_id,
            TransactionType::Income,
            amount,
            "salary",
            date!(2025 - 03 - 10),
        )
    }

    #[test]
    fn record_rejects_balance_overflow_and_rolls_back() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);
        record_transaction(&owner, income(account_id, Decimal::MAX), &DefaultCategories, &conn)
            .unwrap();

        let result = record_transaction(&owner, income(account_id, dec!(1)), &DefaultCategories, &conn);

        assert!(matches!(result, Err(Error::InvalidAmount(_))));
        assert_eq!(balance(&owner, account_id, &conn), Decimal::MAX);
        assert_eq!(list_transactions(&owner, None, &conn).unwrap().len(), 1);
        assert!(reconcile_account(&owner, account_id, &conn)
            .unwrap()
            .is_balanced());
    }

    #[test]
    fn update_rejects_delta_overflow_and_rolls_back() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, dec!(0), &conn);
        let recorded =
            record_transaction(&owner, income(account_id, Decimal::MAX), &DefaultCategories, &conn)
                .unwrap();

        let result = update_transaction(
            &owner,
            recorded.id,
            TransactionUpdate {
                kind: Some(TransactionType::Expense),
                category: Some("groceries".to_owned()),
                ..Default::default()
            },
            &DefaultCategories,
            &conn,
        );

        assert!(matches!(result, Err(Error::InvalidAmount(_))));
        assert_eq!(get_transaction(&owner, recorded.id, &conn).unwrap(), recorded);
        assert_eq!(balance(&owner, account_id, &conn), Decimal::MAX);
    }

    #[test]
    fn transaction_moved_before_its_group_runs_is_reported_failed() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let everyday = new_account(&owner, dec!(100), &conn);
        let savings = new_account(&owner, dec!(100), &conn);
        let recorded =
            record_transaction(&owner, expense(everyday, dec!(30)), &DefaultCategories, &conn)
                .unwrap();
        // Grouped under `everyday`, then moved before the group's store transaction.
        update_transaction(
            &owner,
            recorded.id,
            TransactionUpdate {
                account_id: Some(savings),
                ..Default::default()
            },
            &DefaultCategories,
            &conn,
        )
        .unwrap();

        let outcomes = delete_account_group(&owner, everyday, &[recorded.id], &conn).unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].1, DeleteOutcome::Failed(ref reason) if reason.contains("moved")));
        assert!(get_transaction(&owner, recorded.id, &conn).is_ok());
        assert_eq!(balance(&owner, everyday, &conn), dec!(100));
        assert_eq!(balance(&owner, savings, &conn), dec!(70));
    }
}
