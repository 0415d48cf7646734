//! Transaction management for the ledger.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - The recorder, which keeps account balances in step with the ledger
//! - A stateless projection for searching, sorting and paging transaction lists

mod core;
pub mod query;
mod recorder;

pub use core::{
    Transaction, TransactionBuilder, TransactionId, TransactionType, create_transaction_table,
    get_transaction, list_transactions, map_transaction_row,
};
pub use recorder::{
    DeleteOutcome, DeleteResult, TransactionUpdate, cancel_recurrence, delete_transactions,
    record_transaction, update_transaction,
};

pub(crate) use core::TRANSACTION_COLUMNS;
pub(crate) use recorder::insert_transaction;
