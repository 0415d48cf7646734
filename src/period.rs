//! Calendar periods used for aggregation and alert suppression.

use serde::Serialize;
use time::{Date, Month};

use crate::Error;

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    /// The first day in the range.
    pub start: Date,
    /// The last day in the range.
    pub end: Date,
}

impl DateRange {
    /// Whether `date` falls inside the range, inclusive of both ends.
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The calendar month containing `date`, from the first to the last day.
///
/// # Errors
/// Returns [Error::DateOutOfRange] if the month cannot be represented, which
/// only happens at the limits of [time]'s supported years.
pub fn month_bounds(date: Date) -> Result<DateRange, Error> {
    let year = date.year();
    let month = date.month();

    let start = Date::from_calendar_date(year, month, 1)?;
    let end = Date::from_calendar_date(year, month, last_day_of_month(year, month))?;

    Ok(DateRange { start, end })
}

/// The number of days in `month` of `year`.
pub fn last_day_of_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
mod tests {
    use time::{Month, macros::date};

    use super::{DateRange, last_day_of_month, month_bounds};

    #[test]
    fn month_bounds_cover_whole_month() {
        let got = month_bounds(date!(2024 - 03 - 15)).unwrap();

        assert_eq!(
            got,
            DateRange {
                start: date!(2024 - 03 - 01),
                end: date!(2024 - 03 - 31),
            }
        );
    }

    #[test]
    fn month_bounds_handle_leap_february() {
        assert_eq!(
            month_bounds(date!(2024 - 02 - 01)).unwrap().end,
            date!(2024 - 02 - 29)
        );
        assert_eq!(
            month_bounds(date!(2023 - 02 - 28)).unwrap().end,
            date!(2023 - 02 - 28)
        );
    }

    #[test]
    fn century_years_are_only_leap_when_divisible_by_400() {
        assert_eq!(last_day_of_month(1900, Month::February), 28);
        assert_eq!(last_day_of_month(2000, Month::February), 29);
    }

    #[test]
    fn range_contains_both_ends() {
        let range = month_bounds(date!(2025 - 04 - 10)).unwrap();

        assert!(range.contains(date!(2025 - 04 - 01)));
        assert!(range.contains(date!(2025 - 04 - 30)));
        assert!(!range.contains(date!(2025 - 05 - 01)));
        assert!(!range.contains(date!(2025 - 03 - 31)));
    }
}
