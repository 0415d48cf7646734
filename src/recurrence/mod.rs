//! Recurring transactions: the date-advance rule and the scheduler that turns
//! due occurrences into ledger entries.
//!
//! A recurring transaction moves through these states:
//!
//! - scheduled: its next date is in the future,
//! - due: its next date is on or before the run date,
//! - materialised: a child was recorded and the schedule advanced, which makes
//!   it scheduled again,
//! - cancelled: the schedule was cleared and it is never due again.

mod interval;
mod scheduler;

pub use interval::{Recurrence, RecurringInterval};
pub use scheduler::{FailedRun, RunReport, due_transactions, materialize, run_recurring};
