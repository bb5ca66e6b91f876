//! Paging primitives for newest-first listings.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A validated 1-based page request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Both `page` and `page_size` must be positive.
    pub fn new(page: i64, page_size: i64) -> DomainResult<Self> {
        if page <= 0 {
            return Err(DomainError::validation("page must be greater than zero"));
        }
        if page_size <= 0 {
            return Err(DomainError::validation("page size must be greater than zero"));
        }
        let page = u32::try_from(page).map_err(|_| DomainError::validation("page is too large"))?;
        let page_size = u32::try_from(page_size)
            .map_err(|_| DomainError::validation("page size is too large"))?;
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of items to skip.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.page_size as usize)
    }

    /// Slice an already-ordered collection into a page.
    pub fn paginate<T>(&self, ordered: Vec<T>) -> Page<T> {
        let total_count = ordered.len();
        let items = ordered
            .into_iter()
            .skip(self.offset())
            .take(self.page_size as usize)
            .collect();

        Page {
            items,
            total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// One page of results plus the total count across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total_count.div_ceil(self.page_size as usize)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}
