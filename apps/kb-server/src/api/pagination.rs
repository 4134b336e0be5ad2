//! Shared pagination envelope. SPEC_FULL.md SS6: "All listings support `page`, `limit`,
//! `total`, `total_pages`, `has_next`, `has_previous`."

use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for PageQuery {
    fn default() -> Self {
        Self { page: default_page(), limit: default_limit() }
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Slices `all` down to one page. `page` is 1-indexed; `limit` is clamped to
/// `[1, MAX_LIMIT]` so a caller can't force an unbounded response.
pub fn paginate<T>(all: Vec<T>, query: PageQuery) -> Paginated<T> {
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let page = query.page.max(1);
    let total = all.len();
    let total_pages = total.div_ceil(limit).max(1);
    let start = (page - 1).saturating_mul(limit).min(total);
    let end = start.saturating_add(limit).min(total);
    let items = all[start..end].to_vec();

    Paginated {
        items,
        page,
        limit,
        total,
        total_pages,
        has_next: page < total_pages,
        has_previous: page > 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_middle_page() {
        let all: Vec<u32> = (0..25).collect();
        let result = paginate(all, PageQuery { page: 2, limit: 10 });
        assert_eq!(result.items, (10..20).collect::<Vec<_>>());
        assert!(result.has_next);
        assert!(result.has_previous);
        assert_eq!(result.total_pages, 3);
    }

    #[test]
    fn test_paginate_last_page_partial() {
        let all: Vec<u32> = (0..25).collect();
        let result = paginate(all, PageQuery { page: 3, limit: 10 });
        assert_eq!(result.items, (20..25).collect::<Vec<_>>());
        assert!(!result.has_next);
    }

    #[test]
    fn test_paginate_page_past_end_is_empty() {
        let all: Vec<u32> = (0..5).collect();
        let result = paginate(all, PageQuery { page: 9, limit: 10 });
        assert!(result.items.is_empty());
    }

    #[test]
    fn test_paginate_clamps_oversized_limit() {
        let all: Vec<u32> = (0..10).collect();
        let result = paginate(all, PageQuery { page: 1, limit: 100_000 });
        assert_eq!(result.limit, MAX_LIMIT);
    }
}
