use serde::Serialize;

/// Number of posts shown on one page of any listing.
pub const POSTS_ON_PAGE: u64 = 10;

/// One page of an already ordered result set. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Page arithmetic over `count` items. Requested numbers are clamped into
/// `1..=num_pages`; an empty set still has one (empty) page.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    count: u64,
    per_page: u64,
}

impl Paginator {
    pub fn new(count: u64, per_page: u64) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
        }
    }

    pub fn num_pages(&self) -> u64 {
        self.count.div_ceil(self.per_page).max(1)
    }

    pub fn clamp(&self, requested: u64) -> u64 {
        requested.clamp(1, self.num_pages())
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// Offset of the first item on (clamped) page `number`.
    pub fn offset(&self, number: u64) -> u64 {
        (self.clamp(number) - 1) * self.per_page
    }

    pub fn page<T>(&self, number: u64, items: Vec<T>) -> Page<T> {
        let number = self.clamp(number);
        let num_pages = self.num_pages();
        Page {
            items,
            number,
            num_pages,
            total_count: self.count,
            has_next: number < num_pages,
            has_previous: number > 1,
        }
    }
}

/// Lenient `?page=` parsing: anything that is not a positive integer means page 1.
pub fn parse_page_number(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}
