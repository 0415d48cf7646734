//! Accounts and the single-default-account rule.
//!
//! This module contains:
//! - The `Account` model and its database table
//! - The account manager operations that create accounts, swap the default
//!   account and reconcile balances

mod core;
mod manager;

pub use core::{Account, AccountId, AccountType, create_account_table, get_account, map_account_row};
pub use manager::{
    AccountBuilder, Reconciliation, create_account, delete_account, get_default_account,
    list_accounts, reconcile_account, set_default_account,
};

pub(crate) use core::adjust_balance;
