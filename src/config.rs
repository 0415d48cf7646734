//! Runtime settings shared by the library's callers.

use std::path::PathBuf;

use time::Date;

use crate::{Error, pagination::PaginationConfig, timezone::local_today};

/// The settings a caller of the engine runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// File path to the ledger's SQLite database.
    pub db_path: PathBuf,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    ///
    /// Decides which calendar day "today" is for scheduled runs.
    pub local_timezone: String,

    /// The config that controls how to page transaction lists.
    pub pagination: PaginationConfig,
}

impl Config {
    /// The timezone used when none is configured.
    pub const DEFAULT_TIMEZONE: &'static str = "Etc/UTC";

    /// Create a new [Config] with the default pagination settings.
    ///
    /// `local_timezone` should be a valid, canonical timezone name, e.g.
    /// "Pacific/Auckland".
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezone] if `local_timezone` is not a known
    /// timezone.
    pub fn new(db_path: impl Into<PathBuf>, local_timezone: &str) -> Result<Self, Error> {
        // Fail now rather than on the first scheduled run.
        local_today(local_timezone)?;

        Ok(Self {
            db_path: db_path.into(),
            local_timezone: local_timezone.to_owned(),
            pagination: PaginationConfig::default(),
        })
    }

    /// Today's date in the configured timezone.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezone] if the timezone is not known.
    pub fn today(&self) -> Result<Date, Error> {
        local_today(&self.local_timezone)
    }
}
