//! Page requests and page results.
//!
//! # Invariants
//! - Page numbers are 1-based; page size is at least 1.
//! - `PagedResult::items().len() <= page_size()`.
//! - `total_count` always reports the unwindowed match count, also for pages
//!   past the end.

use crate::repo::error::{RepoError, RepoResult};
use serde::{Deserialize, Serialize};

/// Validated 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page_number: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page_number: u32, page_size: u32) -> RepoResult<Self> {
        if page_number == 0 || page_size == 0 {
            return Err(RepoError::InvalidPageRequest {
                page_number,
                page_size,
            });
        }
        Ok(Self {
            page_number,
            page_size,
        })
    }

    pub fn first(page_size: u32) -> RepoResult<Self> {
        Self::new(1, page_size)
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Rows skipped before this page: `(page_number - 1) * page_size`.
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    /// The following page; saturates at `u32::MAX`.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            page_number: self.page_number.saturating_add(1),
            page_size: self.page_size,
        }
    }
}

/// One page of entities plus the total match count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResult<T> {
    items: Vec<T>,
    page_number: u32,
    page_size: u32,
    total_count: u64,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_count: u64) -> Self {
        debug_assert!(items.len() <= request.page_size() as usize);
        Self {
            items,
            page_number: request.page_number(),
            page_size: request.page_size(),
            total_count,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// `ceil(total_count / page_size)`; zero when nothing matched.
    pub fn total_pages(&self) -> u64 {
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next_page(&self) -> bool {
        u64::from(self.page_number) < self.total_pages()
    }

    pub fn is_first_page(&self) -> bool {
        self.page_number == 1
    }

    pub fn is_last_page(&self) -> bool {
        u64::from(self.page_number) >= self.total_pages()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            total_count: self.total_count,
        }
    }
}

impl<T> IntoIterator for PagedResult<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
