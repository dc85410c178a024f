use serde::{Deserialize, Serialize};

/// Offset-based page wrapper shared by every paginated listing.
#[derive(Serialize, Deserialize, Debug)]
pub struct PageContext<T> {
    pub rows: Vec<T>,
    pub total_rows: i64,
    pub next_offset: Option<i64>,
    pub prev_offset: Option<i64>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page_size: i64, current_offset: i64) -> Self {
        if rows.is_empty() {
            return Self::no_rows();
        }

        let next_offset = current_offset + page_size;
        let next_offset = (next_offset < total_rows).then_some(next_offset);
        let prev_offset = (current_offset > 0).then_some((current_offset - page_size).max(0));

        Self {
            rows,
            total_rows,
            next_offset,
            prev_offset,
        }
    }

    pub fn no_rows() -> Self {
        Self {
            rows: vec![],
            total_rows: 0,
            next_offset: None,
            prev_offset: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageContext<U> {
        PageContext {
            rows: self.rows.into_iter().map(f).collect(),
            total_rows: self.total_rows,
            next_offset: self.next_offset,
            prev_offset: self.prev_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_has_no_prev() {
        let page = PageContext::from_rows(vec![1, 2, 3], 9, 3, 0);
        assert_eq!(page.prev_offset, None);
        assert_eq!(page.next_offset, Some(3));
        assert_eq!(page.total_rows, 9);
    }

    #[test]
    fn middle_page_links_both_ways() {
        let page = PageContext::from_rows(vec![4, 5, 6], 9, 3, 3);
        assert_eq!(page.prev_offset, Some(0));
        assert_eq!(page.next_offset, Some(6));
    }

    #[test]
    fn last_page_has_no_next() {
        let page = PageContext::from_rows(vec![7, 8, 9], 9, 3, 6);
        assert_eq!(page.prev_offset, Some(3));
        assert_eq!(page.next_offset, None);
    }

    #[test]
    fn empty_result_is_the_empty_page() {
        let page: PageContext<i32> = PageContext::from_rows(vec![], 0, 3, 0);
        assert!(page.rows.is_empty());
        assert_eq!(page.total_rows, 0);
        assert_eq!(page.next_offset, None);
    }

    #[test]
    fn map_preserves_offsets() {
        let page = PageContext::from_rows(vec![1, 2, 3], 9, 3, 3).map(|n| n * 10);
        assert_eq!(page.rows, vec![10, 20, 30]);
        assert_eq!(page.prev_offset, Some(0));
        assert_eq!(page.next_offset, Some(6));
    }
}
