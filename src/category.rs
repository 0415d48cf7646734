//! The catalog of category keys a transaction may be filed under.
//!
//! Categories belong to an external collaborator. The engine only asks
//! whether a key is valid for a transaction type and otherwise treats the key
//! as an opaque string.

use crate::{Error, transaction::TransactionType};

/// Supplies the valid category keys for each transaction type.
pub trait CategoryCatalog {
    /// Whether `key` is a valid category for transactions of type `kind`.
    fn is_valid(&self, kind: TransactionType, key: &str) -> bool;
}

/// The income categories in [DefaultCategories].
pub const INCOME_CATEGORIES: &[&str] = &[
    "salary",
    "freelance",
    "investments",
    "business",
    "rental",
    "other-income",
];

/// The expense categories in [DefaultCategories].
pub const EXPENSE_CATEGORIES: &[&str] = &[
    "housing",
    "transportation",
    "groceries",
    "utilities",
    "entertainment",
    "food",
    "shopping",
    "healthcare",
    "education",
    "personal",
    "travel",
    "insurance",
    "gifts",
    "bills",
    "other-expense",
];

/// The built-in category catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCategories;

impl CategoryCatalog for DefaultCategories {
    fn is_valid(&self, kind: TransactionType, key: &str) -> bool {
        match kind {
            TransactionType::Income => INCOME_CATEGORIES.contains(&key),
            TransactionType::Expense => EXPENSE_CATEGORIES.contains(&key),
        }
    }
}

/// Check `key` against `catalog`.
///
/// # Errors
/// Returns [Error::InvalidCategory] if the catalog does not accept the key for
/// transactions of type `kind`.
pub(crate) fn validate_category(
    catalog: &dyn CategoryCatalog,
    kind: TransactionType,
    key: &str,
) -> Result<(), Error> {
    if catalog.is_valid(kind, key) {
        Ok(())
    } else {
        Err(Error::InvalidCategory(key.to_owned()))
    }
}
