//! This modules defines the common functionality for paging data.

use serde::Serialize;

/// The config for pagination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    /// The page number to default to when not specified in a request.
    pub default_page: u64,
    /// The maximum items per page when not specified in a request.
    pub default_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_page_size: 20,
        }
    }
}

/// One page of a longer list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// The items on this page, empty if the page is past the end.
    pub items: Vec<T>,
    /// The 1-based page number that was returned.
    pub page: u64,
    /// The page size used to split the list.
    pub page_size: u64,
    /// The number of pages in the full list.
    pub page_count: u64,
    /// The number of items in the full list.
    pub total_items: u64,
}

/// The number of pages needed to show `total_items` items.
///
/// A page size of zero is treated as one.
pub fn page_count(total_items: u64, page_size: u64) -> u64 {
    total_items.div_ceil(page_size.max(1))
}

/// Cut page `page` out of `items`.
///
/// Pages are 1-based and page 0 is treated as page 1. A page past the end is
/// returned empty rather than as an error.
pub fn paginate<T>(items: Vec<T>, page: u64, page_size: u64) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total_items = items.len() as u64;
    let offset = (page - 1).saturating_mul(page_size);

    let items = items
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(page_size).unwrap_or(usize::MAX))
        .collect();

    Page {
        items,
        page,
        page_size,
        page_count: page_count(total_items, page_size),
        total_items,
    }
}

#[cfg(test)]
mod tests {
    use crate::pagination::{PaginationConfig, page_count, paginate};

    #[test]
    fn default_config() {
        let config = PaginationConfig::default();

        assert_eq!(config.default_page, 1);
        assert_eq!(config.default_page_size, 20);
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, 20), 0);
        assert_eq!(page_count(20, 20), 1);
        assert_eq!(page_count(21, 20), 2);
        assert_eq!(page_count(5, 0), 5);
    }

    #[test]
    fn returns_requested_page() {
        let got = paginate((1..=45).collect(), 3, 20);

        assert_eq!(got.items, vec![41, 42, 43, 44, 45]);
        assert_eq!(got.page_count, 3);
        assert_eq!(got.total_items, 45);
    }

    #[test]
    fn page_zero_is_first_page() {
        let got = paginate(vec!['a', 'b', 'c'], 0, 2);

        assert_eq!(got.page, 1);
        assert_eq!(got.items, vec!['a', 'b']);
    }

    #[test]
    fn page_past_end_is_empty() {
        let got = paginate(vec![1, 2, 3], 4, 2);

        assert!(got.items.is_empty());
        assert_eq!(got.page_count, 2);
    }
}
