//! Finds recurring transactions that are due and materialises their
//! occurrences as ordinary ledger entries.
//!
//! Each occurrence is one store transaction: the child entry, its balance
//! effect and the template's schedule advance commit together or not at all.
//! The advance is a compare-and-swap on the template's next date, so two
//! schedulers running at once can never materialise the same occurrence
//! twice, and a run interrupted part way through resumes from the stored
//! schedule.

use rusqlite::Connection;
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    category::CategoryCatalog,
    db::begin_write,
    transaction::{
        TRANSACTION_COLUMNS, Transaction, TransactionId, insert_transaction, map_transaction_row,
    },
};

/// Every recurring transaction with an occurrence due on or before `as_of`.
///
/// Calling this twice with the same `as_of` and no materialisation in between
/// returns the same transactions.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn due_transactions(as_of: Date, connection: &Connection) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE recurring_interval IS NOT NULL
                AND next_recurring_date <= ?1
                AND last_processed_date < next_recurring_date
             ORDER BY next_recurring_date ASC, id ASC"
        ))?
        .query_map([as_of], map_transaction_row)?
        .map(|transaction_result| transaction_result.map_err(Error::SqlError))
        .collect()
}

/// Materialise the next occurrence of `template` if it is due on or before
/// `as_of`.
///
/// The child is a one-off copy of the template dated on the occurrence.
/// Returns `None` when nothing was due, when another run already advanced the
/// schedule, or when a child for that date already exists. In the last case
/// the schedule is still advanced.
///
/// # Errors
/// Returns [Error::ScheduleFailure] if the child cannot be recorded, e.g.
/// because the template's category is no longer valid. The template's
/// schedule is left unadvanced so the next run retries the same occurrence.
pub fn materialize(
    template: &Transaction,
    as_of: Date,
    categories: &dyn CategoryCatalog,
    connection: &Connection,
) -> Result<Option<Transaction>, Error> {
    try_materialize(template, as_of, categories, connection).map_err(|error| {
        tracing::warn!(
            template_id = template.id,
            %error,
            "could not materialise recurring transaction"
        );

        match error {
            Error::ScheduleFailure { .. } => error,
            error => Error::ScheduleFailure {
                transaction_id: template.id,
                reason: error.to_string(),
            },
        }
    })
}

fn try_materialize(
    template: &Transaction,
    as_of: Date,
    categories: &dyn CategoryCatalog,
    connection: &Connection,
) -> Result<Option<Transaction>, Error> {
    let Some(schedule) = template.recurrence else {
        return Ok(None);
    };

    if !schedule.is_due(as_of) {
        tracing::debug!(template_id = template.id, %as_of, "recurring transaction is not due");
        return Ok(None);
    }

    let occurrence = schedule.next_date;
    let next_date = schedule.interval.advance(occurrence, template.date.day())?;

    let sql_transaction = begin_write(connection)?;

    let advanced = sql_transaction.execute(
        "UPDATE \"transaction\"
         SET next_recurring_date = ?1, last_processed_date = ?2
         WHERE id = ?3 AND recurring_interval = ?4 AND next_recurring_date = ?2",
        (next_date, occurrence, template.id, schedule.interval),
    )?;

    if advanced == 0 {
        tracing::debug!(
            template_id = template.id,
            %occurrence,
            "schedule already advanced by another run"
        );
        return Ok(None);
    }

    let already_materialized: bool = sql_transaction.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM \"transaction\" WHERE recurring_template_id = ?1 AND date = ?2
        )",
        (template.id, occurrence),
        |row| row.get(0),
    )?;

    let child = if already_materialized {
        tracing::debug!(template_id = template.id, %occurrence, "occurrence already materialised");
        None
    } else {
        let mut builder = Transaction::build(
            template.account_id,
            template.kind,
            template.amount,
            &template.category,
            occurrence,
        )
        .template_id(template.id);
        builder.description = template.description.clone();

        Some(insert_transaction(
            &template.owner_id,
            builder,
            categories,
            &sql_transaction,
        )?)
    };

    sql_transaction.commit()?;

    if let Some(child) = &child {
        tracing::info!(
            owner = %template.owner_id,
            template_id = template.id,
            transaction_id = child.id,
            date = %occurrence,
            %next_date,
            "materialised recurring transaction"
        );
    }

    Ok(child)
}

/// A recurring transaction that could not be materialised during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRun {
    /// The recurring template whose occurrence failed.
    pub transaction_id: TransactionId,
    /// The occurrence that will be retried on the next run.
    pub due_date: Date,
    /// Why the occurrence failed.
    pub reason: String,
}

/// The result of a call to [run_recurring].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// The date the run materialised occurrences up to.
    pub as_of: Date,
    /// The child transactions created, in the order they were created.
    pub materialized: Vec<Transaction>,
    /// The templates that failed and were left for the next run.
    pub failures: Vec<FailedRun>,
}

/// Materialise every occurrence due on or before `as_of`.
///
/// A template that missed several periods produces one child per period,
/// oldest first, until its next date is after `as_of`. Each occurrence commits
/// on its own. A failing template stops at the failed occurrence and is
/// reported while the other templates carry on.
///
/// # Errors
/// Returns [Error::SqlError] if the due templates cannot be read. Failures of
/// individual templates are reported in the [RunReport].
pub fn run_recurring(
    as_of: Date,
    categories: &dyn CategoryCatalog,
    connection: &Connection,
) -> Result<RunReport, Error> {
    let mut report = RunReport {
        as_of,
        materialized: Vec::new(),
        failures: Vec::new(),
    };

    for template in due_transactions(as_of, connection)? {
        let mut current = template;

        loop {
            let due_date = match current.recurrence {
                Some(schedule) if schedule.is_due(as_of) => schedule.next_date,
                _ => break,
            };

            match materialize(&current, as_of, categories, connection) {
                Ok(Some(child)) => report.materialized.push(child),
                Ok(None) => {}
                Err(error) => {
                    let reason = match error {
                        Error::ScheduleFailure { reason, .. } => reason,
                        error => error.to_string(),
                    };
                    report.failures.push(FailedRun {
                        transaction_id: current.id,
                        due_date,
                        reason,
                    });
                    break;
                }
            }

            current = match reload_template(current.id, connection) {
                Ok(Some(template)) => template,
                Ok(None) => break,
                Err(error) => {
                    report.failures.push(FailedRun {
                        transaction_id: current.id,
                        due_date,
                        reason: error.to_string(),
                    });
                    break;
                }
            };
        }
    }

    tracing::info!(
        %as_of,
        materialized = report.materialized.len(),
        failed = report.failures.len(),
        "finished recurring transaction run"
    );

    Ok(report)
}

/// Read the latest copy of a template, `None` if it was deleted.
fn reload_template(
    id: TransactionId,
    connection: &Connection,
) -> Result<Option<Transaction>, Error> {
    let result = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = ?1"
        ))?
        .query_row([id], map_transaction_row);

    match result {
        Ok(template) => Ok(Some(template)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::{Date, Duration, macros::date};

    use crate::{
        Error,
        account::{Account, AccountId, AccountType, create_account, get_account, reconcile_account},
        category::{CategoryCatalog, DefaultCategories},
        db::initialize,
        owner::OwnerId,
        recurrence::RecurringInterval,
        transaction::{
            Transaction, TransactionType, cancel_recurrence, get_transaction, list_transactions,
            record_transaction,
        },
    };

    use super::{due_transactions, materialize, run_recurring};

    struct RejectAll;

    impl CategoryCatalog for RejectAll {
        fn is_valid(&self, _kind: TransactionType, _key: &str) -> bool {
            false
        }
    }

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn new_account(owner: &OwnerId, conn: &Connection) -> AccountId {
        create_account(
            owner,
            Account::build("Everyday", AccountType::Checking, dec!(0)),
            conn,
        )
        .unwrap()
        .id
    }

    fn record_template(
        owner: &OwnerId,
        account_id: AccountId,
        amount: Decimal,
        date: Date,
        interval: RecurringInterval,
        conn: &Connection,
    ) -> Transaction {
        record_transaction(
            owner,
            Transaction::build(account_id, TransactionType::Expense, amount, "bills", date)
                .description("Phone plan")
                .recurring(interval),
            &DefaultCategories,
            conn,
        )
        .unwrap()
    }

    #[test]
    fn daily_catch_up_materialises_each_missed_day() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        let as_of = date!(2025 - 03 - 10);
        let template = record_template(
            &owner,
            account_id,
            dec!(10),
            as_of - Duration::days(3),
            RecurringInterval::Daily,
            &conn,
        );

        let report = run_recurring(as_of, &DefaultCategories, &conn).unwrap();

        let dates: Vec<Date> = report.materialized.iter().map(|child| child.date).collect();
        assert_eq!(
            dates,
            vec![date!(2025 - 03 - 08), date!(2025 - 03 - 09), date!(2025 - 03 - 10)]
        );
        assert!(report.failures.is_empty());

        let template = get_transaction(&owner, template.id, &conn).unwrap();
        let schedule = template.recurrence.unwrap();
        assert_eq!(schedule.next_date, as_of + Duration::days(1));
        assert_eq!(schedule.last_processed_date, as_of);

        assert_eq!(
            get_account(&owner, account_id, &conn).unwrap().balance,
            dec!(-40)
        );
        assert!(reconcile_account(&owner, account_id, &conn).unwrap().is_balanced());
    }

    #[test]
    fn children_are_one_off_copies_of_template() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        let template = record_template(
            &owner,
            account_id,
            dec!(65),
            date!(2025 - 03 - 01),
            RecurringInterval::Weekly,
            &conn,
        );

        let report = run_recurring(date!(2025 - 03 - 08), &DefaultCategories, &conn).unwrap();

        let child = &report.materialized[0];
        assert_eq!(report.materialized.len(), 1);
        assert_eq!(child.template_id, Some(template.id));
        assert_eq!(child.recurrence, None);
        assert_eq!(child.amount, dec!(65));
        assert_eq!(child.category, "bills");
        assert_eq!(child.description.as_deref(), Some("Phone plan"));
        assert_eq!(child.date, date!(2025 - 03 - 08));
    }

    #[test]
    fn second_run_for_same_date_materialises_nothing() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        record_template(
            &owner,
            account_id,
            dec!(10),
            date!(2025 - 03 - 01),
            RecurringInterval::Daily,
            &conn,
        );
        let as_of = date!(2025 - 03 - 05);

        let first = run_recurring(as_of, &DefaultCategories, &conn).unwrap();
        let second = run_recurring(as_of, &DefaultCategories, &conn).unwrap();

        assert_eq!(first.materialized.len(), 4);
        assert!(second.materialized.is_empty());
        assert_eq!(list_transactions(&owner, None, &conn).unwrap().len(), 5);
    }

    #[test]
    fn due_transactions_is_stable_until_materialised() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        let template = record_template(
            &owner,
            account_id,
            dec!(10),
            date!(2025 - 03 - 01),
            RecurringInterval::Weekly,
            &conn,
        );
        record_template(
            &owner,
            account_id,
            dec!(20),
            date!(2025 - 03 - 05),
            RecurringInterval::Monthly,
            &conn,
        );
        let as_of = date!(2025 - 03 - 08);

        let first = due_transactions(as_of, &conn).unwrap();
        let second = due_transactions(as_of, &conn).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, template.id);

        materialize(&first[0], as_of, &DefaultCategories, &conn).unwrap();

        assert!(due_transactions(as_of, &conn).unwrap().is_empty());
    }

    #[test]
    fn stale_template_copy_cannot_materialise_twice() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        let template = record_template(
            &owner,
            account_id,
            dec!(10),
            date!(2025 - 03 - 01),
            RecurringInterval::Weekly,
            &conn,
        );
        let as_of = date!(2025 - 03 - 08);

        let first = materialize(&template, as_of, &DefaultCategories, &conn).unwrap();
        let second = materialize(&template, as_of, &DefaultCategories, &conn).unwrap();

        assert!(first.is_some());
        assert_eq!(second, None);
        assert_eq!(
            get_account(&owner, account_id, &conn).unwrap().balance,
            dec!(-20)
        );
    }

    #[test]
    fn monthly_run_follows_anchor_day() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        let template = record_template(
            &owner,
            account_id,
            dec!(1450),
            date!(2025 - 01 - 31),
            RecurringInterval::Monthly,
            &conn,
        );

        let report = run_recurring(date!(2025 - 04 - 30), &DefaultCategories, &conn).unwrap();

        let dates: Vec<Date> = report.materialized.iter().map(|child| child.date).collect();
        assert_eq!(
            dates,
            vec![date!(2025 - 02 - 28), date!(2025 - 03 - 31), date!(2025 - 04 - 30)]
        );
        let schedule = get_transaction(&owner, template.id, &conn)
            .unwrap()
            .recurrence
            .unwrap();
        assert_eq!(schedule.next_date, date!(2025 - 05 - 31));
    }

    #[test]
    fn failure_leaves_schedule_for_retry() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        let template = record_template(
            &owner,
            account_id,
            dec!(10),
            date!(2025 - 03 - 01),
            RecurringInterval::Daily,
            &conn,
        );
        let as_of = date!(2025 - 03 - 03);

        let failed = run_recurring(as_of, &RejectAll, &conn).unwrap();

        assert!(failed.materialized.is_empty());
        assert_eq!(failed.failures.len(), 1);
        assert_eq!(failed.failures[0].transaction_id, template.id);
        assert_eq!(failed.failures[0].due_date, date!(2025 - 03 - 02));
        let schedule = get_transaction(&owner, template.id, &conn)
            .unwrap()
            .recurrence
            .unwrap();
        assert_eq!(schedule.next_date, date!(2025 - 03 - 02));
        assert_eq!(
            get_account(&owner, account_id, &conn).unwrap().balance,
            dec!(-10)
        );

        let retried = run_recurring(as_of, &DefaultCategories, &conn).unwrap();

        assert_eq!(retried.materialized.len(), 2);
        assert!(retried.failures.is_empty());
    }

    #[test]
    fn materialize_reports_schedule_failure() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        let template = record_template(
            &owner,
            account_id,
            dec!(10),
            date!(2025 - 03 - 01),
            RecurringInterval::Daily,
            &conn,
        );

        let result = materialize(&template, date!(2025 - 03 - 02), &RejectAll, &conn);

        assert!(matches!(
            result,
            Err(Error::ScheduleFailure { transaction_id, .. }) if transaction_id == template.id
        ));
    }

    #[test]
    fn cancelled_template_is_never_due() {
        let conn = get_test_connection();
        let owner = OwnerId::new("alice");
        let account_id = new_account(&owner, &conn);
        let template = record_template(
            &owner,
            account_id,
            dec!(10),
            date!(2025 - 03 - 01),
            RecurringInterval::Daily,
            &conn,
        );

        cancel_recurrence(&owner, template.id, &conn).unwrap();
        let report = run_recurring(date!(2025 - 03 - 31), &DefaultCategories, &conn).unwrap();

        assert!(report.materialized.is_empty());
        assert!(due_transactions(date!(2025 - 03 - 31), &conn).unwrap().is_empty());
    }
}
