use serde::Serialize;

/// One page of an ordered listing.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub number: i64,
    pub num_pages: i64,
    pub per_page: i64,
    pub total: i64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

/// Page layout resolved for a requested page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: i64,
    pub num_pages: i64,
    pub per_page: i64,
    pub total: i64,
}

impl PageWindow {
    /// A missing or non-positive page resolves to 1, a page past the end to
    /// the last page. An empty listing still has one (empty) page.
    pub fn resolve(requested: Option<i64>, total: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        let num_pages = ((total + per_page - 1) / per_page).max(1);
        let number = match requested {
            Some(n) if n >= 1 => n.min(num_pages),
            _ => 1,
        };
        Self {
            number,
            num_pages,
            per_page,
            total,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn into_page<T>(self, items: Vec<T>) -> Page<T> {
        Page {
            number: self.number,
            num_pages: self.num_pages,
            per_page: self.per_page,
            total: self.total,
            items,
        }
    }
}

/// Page holding the item at 1-based `position`.
pub fn page_for_position(position: i64, per_page: i64) -> i64 {
    let per_page = per_page.max(1);
    ((position.max(1) + per_page - 1) / per_page).max(1)
}
