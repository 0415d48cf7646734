//! Recurrence intervals and the date-advance rule.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};

use crate::{Error, db::parse_text_column, period::last_day_of_month};

/// How often a recurring transaction happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurringInterval {
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// Every calendar month, on the anchor day or the last day of shorter months.
    Monthly,
    /// Every calendar year, with Feb 29 falling back to Feb 28 in common years.
    Yearly,
}

impl RecurringInterval {
    /// The name used for the interval in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    /// The occurrence that follows `date`.
    ///
    /// `anchor_day` is the day of the month the schedule started on. Monthly and
    /// yearly schedules return to it whenever the target month is long enough,
    /// so a schedule anchored on the 31st goes Jan 31, Feb 28, Mar 31, Apr 30.
    /// Daily and weekly schedules ignore it.
    ///
    /// # Errors
    /// Returns [Error::DateOutOfRange] if the next occurrence is past the last
    /// date [time] can represent.
    pub fn advance(self, date: Date, anchor_day: u8) -> Result<Date, Error> {
        match self {
            Self::Daily => add_days(date, 1),
            Self::Weekly => add_days(date, 7),
            Self::Monthly => {
                let (year, month) = if date.month() == Month::December {
                    (date.year() + 1, Month::January)
                } else {
                    (date.year(), date.month().next())
                };

                clamped_date(year, month, anchor_day)
            }
            Self::Yearly => clamped_date(date.year() + 1, date.month(), anchor_day),
        }
    }

    /// The occurrence that follows `date`, anchored on `date`'s own day of month.
    ///
    /// # Errors
    /// Returns [Error::DateOutOfRange] if the next occurrence cannot be represented.
    pub fn next_after(self, date: Date) -> Result<Date, Error> {
        self.advance(date, date.day())
    }
}

impl FromStr for RecurringInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            _ => Err(Error::InvalidVariant {
                kind: "recurring interval",
                value: s.to_owned(),
            }),
        }
    }
}

impl Display for RecurringInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for RecurringInterval {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RecurringInterval {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text_column(value)
    }
}

/// The schedule carried by a recurring transaction.
///
/// A transaction has a `Recurrence` exactly when it is recurring, so the
/// schedule fields can never be half set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Recurrence {
    /// How often the transaction repeats.
    pub interval: RecurringInterval,
    /// The next date a child transaction must be materialised for.
    pub next_date: Date,
    /// The date of the most recent occurrence, guarding against materialising
    /// the same occurrence twice.
    pub last_processed_date: Date,
}

impl Recurrence {
    /// The schedule of a template first recorded on `date`.
    ///
    /// The template itself is the first occurrence, so `date` counts as
    /// processed and the next occurrence is one interval later.
    ///
    /// # Errors
    /// Returns [Error::DateOutOfRange] if the next occurrence cannot be represented.
    pub fn starting(interval: RecurringInterval, date: Date) -> Result<Self, Error> {
        Ok(Self {
            interval,
            next_date: interval.next_after(date)?,
            last_processed_date: date,
        })
    }

    /// Whether an occurrence is waiting to be materialised on or before `as_of`.
    pub fn is_due(&self, as_of: Date) -> bool {
        self.next_date <= as_of && self.last_processed_date < self.next_date
    }
}

fn add_days(date: Date, days: i64) -> Result<Date, Error> {
    date.checked_add(Duration::days(days))
        .ok_or_else(|| Error::DateOutOfRange(format!("{date} plus {days} days")))
}

fn clamped_date(year: i32, month: Month, anchor_day: u8) -> Result<Date, Error> {
    let day = anchor_day.min(last_day_of_month(year, month));

    Date::from_calendar_date(year, month, day).map_err(Error::from)
}
