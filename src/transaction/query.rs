//! Stateless filtering, sorting and paging over transactions that were
//! already read from the store.
//!
//! Nothing here touches the database, so the projection has no bearing on
//! the ledger itself.

use crate::pagination::{Page, PaginationConfig, paginate};

use super::core::{Transaction, TransactionType};

/// The field to sort transactions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    /// Sort by the transaction date.
    #[default]
    Date,
    /// Sort by the unsigned amount.
    Amount,
    /// Sort by category key.
    Category,
}

/// The order to sort transactions in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Sort in order of increasing value.
    Ascending,
    /// Sort in order of decreasing value.
    #[default]
    Descending,
}

/// Which transactions a [TransactionQuery] keeps, based on their schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecurringFilter {
    /// Keep every transaction.
    #[default]
    All,
    /// Keep only recurring templates.
    Recurring,
    /// Keep only transactions without a schedule.
    OneOff,
}

/// The filters, sort and page to apply to a list of transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Case-insensitive text the description must contain.
    pub search: Option<String>,
    /// Keep only income or only expenses.
    pub kind: Option<TransactionType>,
    /// Keep only recurring or only one-off transactions.
    pub recurring: RecurringFilter,
    /// The field to sort by.
    pub sort_field: SortField,
    /// The direction to sort in.
    pub sort_order: SortOrder,
    /// The 1-based page to return.
    pub page: u64,
    /// The number of transactions per page.
    pub page_size: u64,
}

impl TransactionQuery {
    /// A query with no filters, newest first, using the configured page size.
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            search: None,
            kind: None,
            recurring: RecurringFilter::All,
            sort_field: SortField::Date,
            sort_order: SortOrder::Descending,
            page: config.default_page,
            page_size: config.default_page_size,
        }
    }

    fn keeps(&self, transaction: &Transaction, needle: Option<&str>) -> bool {
        if self.kind.is_some_and(|kind| kind != transaction.kind) {
            return false;
        }

        let recurring_ok = match self.recurring {
            RecurringFilter::All => true,
            RecurringFilter::Recurring => transaction.is_recurring(),
            RecurringFilter::OneOff => !transaction.is_recurring(),
        };
        if !recurring_ok {
            return false;
        }

        match needle {
            Some(needle) => transaction
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(needle)),
            None => true,
        }
    }
}

/// Filter, sort and page `transactions` according to `query`.
///
/// Ties are broken by id so the order is stable across calls. The page count
/// is computed from the filtered list.
pub fn query(transactions: Vec<Transaction>, query: &TransactionQuery) -> Page<Transaction> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    let mut kept: Vec<Transaction> = transactions
        .into_iter()
        .filter(|transaction| query.keeps(transaction, needle.as_deref()))
        .collect();

    kept.sort_by(|a, b| {
        let ordering = match query.sort_field {
            SortField::Date => a.date.cmp(&b.date),
            SortField::Amount => a.amount.cmp(&b.amount),
            SortField::Category => a.category.cmp(&b.category),
        }
        .then(a.id.cmp(&b.id));

        match query.sort_order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });

    paginate(kept, query.page, query.page_size)
}
