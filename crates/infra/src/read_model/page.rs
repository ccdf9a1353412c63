use serde::Serialize;

pub const MAX_PAGE_SIZE: usize = 100;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Clamp raw query values: page ≥ 1, 1 ≤ limit ≤ `MAX_PAGE_SIZE`.
    pub fn new(page: Option<usize>, limit: Option<usize>, default_limit: usize) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub pages: usize,
    pub current_page: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            pages: self.pages,
            current_page: self.current_page,
        }
    }
}

/// Slice an already filtered and sorted result set.
pub fn paginate<T>(all: Vec<T>, request: PageRequest) -> Page<T> {
    let total = all.len();
    let pages = total.div_ceil(request.limit);
    let items = all
        .into_iter()
        .skip((request.page - 1).saturating_mul(request.limit))
        .take(request.limit)
        .collect();

    Page {
        items,
        total,
        pages,
        current_page: request.page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_raw_values() {
        assert_eq!(PageRequest::new(Some(0), Some(0), 10), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(None, Some(10_000), 10).limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(None, None, 20), PageRequest { page: 1, limit: 20 });
    }

    #[test]
    fn reports_totals_and_slices() {
        let page = paginate((1..=25).collect::<Vec<_>>(), PageRequest::new(Some(3), Some(10), 10));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
        assert_eq!(page.pages, 3);
        assert_eq!(page.current_page, 3);
    }

    #[test]
    fn past_the_end_is_empty() {
        let page = paginate(vec![1, 2], PageRequest::new(Some(5), Some(10), 10));
        assert!(page.items.is_empty());
        assert_eq!(page.pages, 1);
    }
}
