use serde::{Deserialize, Serialize};

/// Position in a paged id listing.
///
/// `last_key` is opaque to callers: the source decides whether it is an
/// offset or the highest key seen so far. A sweep starts at `0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub last_key: u64,
    pub page_size: usize,
}

impl PageCursor {
    pub fn start(page_size: usize) -> Self {
        Self {
            last_key: 0,
            page_size,
        }
    }

    /// Skip a page without reading it.
    pub fn skip_page(self) -> Self {
        Self {
            last_key: self.last_key.saturating_add(self.page_size as u64),
            page_size: self.page_size,
        }
    }

    pub fn advance_to(self, last_key: u64) -> Self {
        Self {
            last_key,
            page_size: self.page_size,
        }
    }
}

/// One page of ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPage<K> {
    pub ids: Vec<K>,
    /// Cursor key to request the next page with.
    pub next_key: u64,
    /// Set when the source knows there is nothing after this page.
    #[serde(default)]
    pub is_last: bool,
}

impl<K> IdPage<K> {
    /// A page is the last one when the source says so or it came back short.
    pub fn is_final(&self, page_size: usize) -> bool {
        self.is_last || self.ids.len() < page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_page_advances_by_page_size() {
        let cursor = PageCursor::start(10).skip_page().skip_page();
        assert_eq!(cursor.last_key, 20);
        assert_eq!(cursor.page_size, 10);
    }

    #[test]
    fn short_page_is_final() {
        let page = IdPage {
            ids: vec![1u64, 2, 3],
            next_key: 3,
            is_last: false,
        };
        assert!(page.is_final(10));
        assert!(!page.is_final(3));
    }

    #[test]
    fn flagged_page_is_final() {
        let page = IdPage {
            ids: vec![1u64, 2],
            next_key: 2,
            is_last: true,
        };
        assert!(page.is_final(2));
    }

    #[test]
    fn empty_page_is_final() {
        let page: IdPage<u64> = IdPage {
            ids: vec![],
            next_key: 0,
            is_last: false,
        };
        assert!(page.is_final(1));
    }
}
