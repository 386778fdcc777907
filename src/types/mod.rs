use serde::Serialize;

use crate::models::Paste;

pub mod api;

/// Per-request values the core needs from the request layer, passed in
/// explicitly instead of being looked up from ambient state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Pseudonymous fingerprint of the submitter.
    pub user_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, total: u64) -> Self {
        let pages = total.div_ceil(u64::from(per_page.max(1)));
        Pagination {
            page,
            per_page,
            total,
            pages,
        }
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// One page of a paste listing.
#[derive(Debug, Clone)]
pub struct PasteListing {
    pub pastes: Vec<Paste>,
    pub pagination: Pagination,
}
