//! List retrieval: filtering, sorting, and pagination of the item collection.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::Item;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// One list request as bound from the query string.
///
/// The wire names are PascalCase (`Filter`, `SortBy`, `IsDescending`,
/// `Page`, `PageSize`) to preserve the existing API contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort_by: Option<String>,
    pub is_descending: bool,
    pub page: i64,
    pub page_size: i64,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            filter: None,
            sort_by: None,
            is_descending: false,
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Item fields a list request may sort on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Quantity,
    Price,
}

impl SortField {
    /// Matches the public field name, ignoring case.
    /// Anything unrecognized means no sort is applied.
    pub fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("name") {
            Some(SortField::Name)
        } else if token.eq_ignore_ascii_case("quantity") {
            Some(SortField::Quantity)
        } else if token.eq_ignore_ascii_case("price") {
            Some(SortField::Price)
        } else {
            None
        }
    }
}

/// A page of results plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page_size: i64,
    pub current_page: i64,
    pub total_pages: i64,
}

impl ListQuery {
    /// Page number with non-positive input silently normalized to 1.
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    /// Page size with non-positive input silently normalized to 1.
    pub fn page_size(&self) -> i64 {
        self.page_size.max(1)
    }

    /// Filter text with surrounding whitespace stripped; None when blank.
    pub fn filter_text(&self) -> Option<&str> {
        self.filter
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn sort_field(&self) -> Option<SortField> {
        self.sort_by.as_deref().and_then(SortField::parse)
    }

    /// Runs the query against a fully materialized item collection.
    ///
    /// Filter, sort, count, then paginate, in that order. The filter is a
    /// case-sensitive substring match on the item name. Sorting is stable,
    /// so ties under the chosen key keep their incoming relative order in
    /// both directions. Items arrive in the source's natural order
    /// (ascending id for both repositories), which is also the order kept
    /// when no recognized sort field is given. A page past the end of the
    /// match set yields an empty page, never an error.
    pub fn execute(&self, items: Vec<Item>) -> PagedResult<Item> {
        let mut matched: Vec<Item> = match self.filter_text() {
            Some(filter) => items
                .into_iter()
                .filter(|item| item.name.contains(filter))
                .collect(),
            None => items,
        };

        if let Some(field) = self.sort_field() {
            let cmp: fn(&Item, &Item) -> Ordering = match field {
                SortField::Name => |a, b| a.name.cmp(&b.name),
                SortField::Quantity => |a, b| a.quantity.cmp(&b.quantity),
                SortField::Price => |a, b| a.price.cmp(&b.price),
            };
            if self.is_descending {
                matched.sort_by(move |a, b| cmp(b, a));
            } else {
                matched.sort_by(cmp);
            }
        }

        let total_count = matched.len() as i64;
        let page = self.page();
        let page_size = self.page_size();
        let skip = (page - 1).saturating_mul(page_size);

        let items: Vec<Item> = matched
            .into_iter()
            .skip(skip as usize)
            .take(page_size as usize)
            .collect();

        PagedResult {
            items,
            total_count,
            page_size,
            current_page: page,
            total_pages: total_pages(total_count, page_size),
        }
    }
}

/// ceil(total_count / page_size); zero only when nothing matched.
fn total_pages(total_count: i64, page_size: i64) -> i64 {
    (total_count + page_size - 1) / page_size
}
