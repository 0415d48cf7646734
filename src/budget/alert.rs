//! Budget alerts that fire once per band per account per calendar month.
//!
//! The band last delivered for each (owner, account, month) is kept in the
//! `budget_alert` table. Because the key includes the first day of the month,
//! a new month starts with no delivered band and needs no explicit reset.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection,
    types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    account::{AccountId, get_account, get_default_account},
    db::{begin_write, parse_text_column},
    notify::Notifier,
    owner::OwnerId,
    period::month_bounds,
};

use super::{
    aggregation::{display_percent, percent_used, spend_in_range},
    core::{current_budget, owners_with_budget},
};

/// How close spending is to the budget ceiling, from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertBand {
    /// Less than 75% of the ceiling is used.
    NoAlert,
    /// At least 75% of the ceiling is used.
    Warning,
    /// At least 90% of the ceiling is used.
    Critical,
}

impl AlertBand {
    /// The smallest percentage of the ceiling that is [AlertBand::Warning].
    pub const WARNING_PERCENT: Decimal = Decimal::from_parts(75, 0, 0, false, 0);
    /// The smallest percentage of the ceiling that is [AlertBand::Critical].
    pub const CRITICAL_PERCENT: Decimal = Decimal::from_parts(90, 0, 0, false, 0);

    /// The band for a percentage of the ceiling, checking the highest band
    /// first.
    pub fn from_percent(percent_used: Decimal) -> Self {
        if percent_used >= Self::CRITICAL_PERCENT {
            Self::Critical
        } else if percent_used >= Self::WARNING_PERCENT {
            Self::Warning
        } else {
            Self::NoAlert
        }
    }

    /// The name used for the band in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAlert => "NO_ALERT",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl FromStr for AlertBand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NO_ALERT" => Ok(Self::NoAlert),
            "WARNING" => Ok(Self::Warning),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(Error::InvalidVariant {
                kind: "alert band",
                value: s.to_owned(),
            }),
        }
    }
}

impl Display for AlertBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for AlertBand {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AlertBand {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

/// An alert to hand to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    /// The owner whose budget is running out.
    pub owner_id: OwnerId,
    /// The account the spending was measured on.
    pub account_id: AccountId,
    /// Either [AlertBand::Warning] or [AlertBand::Critical].
    pub band: AlertBand,
    /// The month's spending as a percentage of the ceiling, truncated to two
    /// places so it never reads higher than the band it was placed in.
    pub percent_used: Decimal,
    /// The month's spending.
    pub spent: Decimal,
    /// The owner's monthly ceiling.
    pub ceiling: Decimal,
    /// The first day of the month.
    pub period_start: Date,
    /// The last day of the month.
    pub period_end: Date,
}

/// The outcome of evaluating one account against its owner's budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", content = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertDecision {
    /// No budget is configured or spending is below the warning band.
    NoAlert,
    /// Spending reached a band that has not been delivered this month.
    Notify(AlertEvent),
    /// Spending is in a band that was already delivered this month.
    Suppressed(AlertEvent),
}

/// Create the table that remembers which band was delivered each month.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_budget_alert_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget_alert (
                owner_id TEXT NOT NULL,
                account_id INTEGER NOT NULL,
                period_start TEXT NOT NULL,
                band TEXT NOT NULL CHECK (band IN ('WARNING', 'CRITICAL')),
                emitted_at TEXT NOT NULL,
                PRIMARY KEY (owner_id, account_id, period_start),
                FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    Ok(())
}

/// Decide whether spending on `account_id` in the month of `as_of` warrants
/// an alert.
///
/// This only reads. Use [evaluate_and_notify] to deliver the alert and record
/// that it was delivered.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the account does not belong to `owner_id`,
/// - [Error::DateOutOfRange] if the month cannot be represented,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn evaluate(
    owner_id: &OwnerId,
    account_id: AccountId,
    as_of: Date,
    connection: &Connection,
) -> Result<AlertDecision, Error> {
    get_account(owner_id, account_id, connection)?;

    let Some(budget) = current_budget(owner_id, connection)? else {
        return Ok(AlertDecision::NoAlert);
    };

    let period = month_bounds(as_of)?;
    let spent = spend_in_range(owner_id, Some(account_id), period, connection)?;
    let Some(percent) = percent_used(spent, budget.amount) else {
        return Ok(AlertDecision::NoAlert);
    };

    let band = AlertBand::from_percent(percent);
    if band == AlertBand::NoAlert {
        return Ok(AlertDecision::NoAlert);
    }

    let event = AlertEvent {
        owner_id: owner_id.clone(),
        account_id,
        band,
        percent_used: display_percent(percent),
        spent,
        ceiling: budget.amount,
        period_start: period.start,
        period_end: period.end,
    };

    let delivered = delivered_band(owner_id, account_id, period.start, connection)?;

    if delivered.is_some_and(|delivered| delivered >= band) {
        Ok(AlertDecision::Suppressed(event))
    } else {
        Ok(AlertDecision::Notify(event))
    }
}

/// Evaluate an account and deliver the alert through `notifier` if it is due.
///
/// The band is claimed and committed before `notifier` runs, so no store lock
/// is held while the alert is delivered and a concurrent check sees the band
/// as already delivered. If delivery fails the claim is released, so the next
/// check tries again.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the account does not belong to `owner_id`,
/// - [Error::NotificationFailed] if `notifier` could not deliver the alert,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn evaluate_and_notify(
    owner_id: &OwnerId,
    account_id: AccountId,
    as_of: Date,
    notifier: &mut dyn Notifier,
    connection: &Connection,
) -> Result<AlertDecision, Error> {
    let transaction = begin_write(connection)?;
    let decision = evaluate(owner_id, account_id, as_of, &transaction)?;

    let event = match decision {
        AlertDecision::Notify(event) => event,
        AlertDecision::Suppressed(event) => {
            tracing::debug!(
                owner = %owner_id,
                account_id,
                band = %event.band,
                "budget alert already delivered this month"
            );
            return Ok(AlertDecision::Suppressed(event));
        }
        AlertDecision::NoAlert => return Ok(AlertDecision::NoAlert),
    };

    let claim = Claim {
        band: event.band,
        claimed_at: OffsetDateTime::now_utc(),
        previous: delivered_alert(owner_id, account_id, event.period_start, &transaction)?,
    };

    // Only a higher band may replace the one already delivered.
    let claimed = transaction.execute(
        "INSERT INTO budget_alert (owner_id, account_id, period_start, band, emitted_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(owner_id, account_id, period_start)
         DO UPDATE SET band = excluded.band, emitted_at = excluded.emitted_at
         WHERE budget_alert.band = 'WARNING' AND excluded.band = 'CRITICAL'",
        (
            owner_id,
            account_id,
            event.period_start,
            claim.band,
            claim.claimed_at,
        ),
    )?;
    transaction.commit()?;

    if claimed == 0 {
        return Ok(AlertDecision::Suppressed(event));
    }

    if let Err(error) = notifier.notify(&event) {
        if let Err(release_error) =
            release_claim(owner_id, account_id, event.period_start, claim, connection)
        {
            tracing::error!(
                owner = %owner_id,
                account_id,
                %release_error,
                "could not release budget alert after failed delivery"
            );
        }

        return Err(error);
    }

    tracing::info!(
        owner = %owner_id,
        account_id,
        band = %event.band,
        percent_used = %event.percent_used,
        "emitted budget alert"
    );

    Ok(AlertDecision::Notify(event))
}

/// A band recorded as delivered before the notifier has run.
struct Claim {
    band: AlertBand,
    claimed_at: OffsetDateTime,
    /// The band and timestamp the claim replaced.
    previous: Option<(AlertBand, String)>,
}

/// Put back what `claim` replaced, unless another check has since moved the
/// row on.
fn release_claim(
    owner_id: &OwnerId,
    account_id: AccountId,
    period_start: Date,
    claim: Claim,
    connection: &Connection,
) -> Result<(), Error> {
    let transaction = begin_write(connection)?;

    match claim.previous {
        Some((band, emitted_at)) => transaction.execute(
            "UPDATE budget_alert SET band = ?1, emitted_at = ?2
             WHERE owner_id = ?3 AND account_id = ?4 AND period_start = ?5
                AND band = ?6 AND emitted_at = ?7",
            (
                band,
                emitted_at,
                owner_id,
                account_id,
                period_start,
                claim.band,
                claim.claimed_at,
            ),
        )?,
        None => transaction.execute(
            "DELETE FROM budget_alert
             WHERE owner_id = ?1 AND account_id = ?2 AND period_start = ?3
                AND band = ?4 AND emitted_at = ?5",
            (
                owner_id,
                account_id,
                period_start,
                claim.band,
                claim.claimed_at,
            ),
        )?,
    };

    transaction.commit()?;

    Ok(())
}

fn delivered_band(
    owner_id: &OwnerId,
    account_id: AccountId,
    period_start: Date,
    connection: &Connection,
) -> Result<Option<AlertBand>, Error> {
    delivered_alert(owner_id, account_id, period_start, connection)
        .map(|delivered| delivered.map(|(band, _)| band))
}

fn delivered_alert(
    owner_id: &OwnerId,
    account_id: AccountId,
    period_start: Date,
    connection: &Connection,
) -> Result<Option<(AlertBand, String)>, Error> {
    let result = connection.query_row(
        "SELECT band, emitted_at FROM budget_alert
         WHERE owner_id = ?1 AND account_id = ?2 AND period_start = ?3",
        (owner_id, account_id, period_start),
        |row| Ok((row.get(0)?, row.get(1)?)),
    );

    match result {
        Ok(delivered) => Ok(Some(delivered)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// The decision reached for one owner during [check_budget_alerts].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCheck {
    /// The owner that was checked.
    pub owner_id: OwnerId,
    /// The owner's default account, which the spending was measured on.
    pub account_id: AccountId,
    /// What the monitor decided.
    pub decision: AlertDecision,
}

/// An owner whose alert could not be evaluated or delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertFailure {
    /// The owner that was checked.
    pub owner_id: OwnerId,
    /// Why the check failed.
    pub reason: String,
}

/// The result of a call to [check_budget_alerts].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertRun {
    /// The owners that were evaluated.
    pub checks: Vec<AlertCheck>,
    /// The owners that will be retried on the next run.
    pub failures: Vec<AlertFailure>,
}

/// Check the default account of every owner with a budget and deliver the
/// alerts that are due.
///
/// Owners without accounts are skipped. A failure for one owner is reported
/// and does not stop the others from being checked.
///
/// # Errors
/// Returns [Error::SqlError] if the owners with a budget cannot be read.
pub fn check_budget_alerts(
    as_of: Date,
    notifier: &mut dyn Notifier,
    connection: &Connection,
) -> Result<AlertRun, Error> {
    let mut run = AlertRun::default();

    for owner_id in owners_with_budget(connection)? {
        let result = match get_default_account(&owner_id, connection) {
            Ok(Some(account)) => {
                evaluate_and_notify(&owner_id, account.id, as_of, notifier, connection)
                    .map(|decision| Some((account.id, decision)))
            }
            Ok(None) => Ok(None),
            Err(error) => Err(error),
        };

        match result {
            Ok(Some((account_id, decision))) => run.checks.push(AlertCheck {
                owner_id,
                account_id,
                decision,
            }),
            Ok(None) => {
                tracing::debug!(owner = %owner_id, "owner has a budget but no accounts");
            }
            Err(error) => {
                tracing::warn!(owner = %owner_id, %error, "could not check budget alert");
                run.failures.push(AlertFailure {
                    owner_id,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(run)
}
