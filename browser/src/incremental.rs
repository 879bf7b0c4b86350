//! Incremental (paginated) listing responses.
//!
//! Backends paginate with opaque continuation tokens and may return fewer
//! usable items than requested once placeholder objects are filtered out. The
//! engine here hides both: it keeps fetching raw pages until it can hand back
//! `page_size` items or the backend runs out, and it carries any surplus over
//! to the next page.
//!
//! GCS and Azure share this loop. GCS pages are full except when the
//! directory's own placeholder object is dropped; Azure can also return short
//! or empty pages with a continuation marker.
//!
//! ```ignore
//! let mut response = provider.get_files_in_directory("reads/", &options).await?;
//! while response.has_next_page {
//!     response = response.get_next_page(&options).await?;
//! }
//! render(&response.items);
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FileBrowserError, Result};
use crate::http::RequestOptions;

/// One raw page as returned by a backend, already filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Fetches raw backend pages for one listing.
#[async_trait]
pub trait PageSource<T: Send + 'static>: Send + Sync {
    /// Fetch the page starting at `page_token`, or the first page when `None`.
    async fn fetch_page(&self, page_token: Option<String>, options: &RequestOptions)
    -> Result<Page<T>>;
}

/// Items fetched so far plus the state needed to fetch more.
///
/// `items` is cumulative: every response returned by
/// [`get_next_page`](Self::get_next_page) starts with all items of the
/// response it was called on. A response stays valid after it has been
/// advanced, so a cancelled `get_next_page` can simply be retried on it.
pub struct IncrementalResponse<T: Send + 'static> {
    pub items: Vec<T>,
    pub has_next_page: bool,
    cursor: Option<Cursor<T>>,
}

struct Cursor<T: Send + 'static> {
    source: Arc<dyn PageSource<T>>,
    page_size: usize,
    page_token: Option<String>,
    pending: Vec<T>,
}

impl<T: Send + 'static + Clone> Clone for Cursor<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            page_size: self.page_size,
            page_token: self.page_token.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<T: Send + Sync + Clone + 'static> IncrementalResponse<T> {
    /// Fetch the first page of a listing.
    pub async fn first_page(
        source: Arc<dyn PageSource<T>>,
        page_size: usize,
        options: &RequestOptions,
    ) -> Result<Self> {
        let cursor = Cursor {
            source,
            page_size: page_size.max(1),
            page_token: None,
            pending: Vec::new(),
        };
        cursor.advance(Vec::new(), true, options).await
    }

    /// Fetch one more page and return the grown response.
    pub async fn get_next_page(&self, options: &RequestOptions) -> Result<Self> {
        let Some(cursor) = self.cursor.as_ref().filter(|_| self.has_next_page) else {
            return Err(FileBrowserError::NoNextPage);
        };
        cursor
            .clone()
            .advance(self.items.clone(), false, options)
            .await
    }

    /// Keep fetching until the listing is exhausted.
    pub async fn collect_all(self, options: &RequestOptions) -> Result<Vec<T>> {
        let mut response = self;
        while response.has_next_page {
            response = response.get_next_page(options).await?;
        }
        Ok(response.items)
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T: Send + Sync + Clone + 'static> Cursor<T> {
    async fn advance(
        mut self,
        mut items: Vec<T>,
        first: bool,
        options: &RequestOptions,
    ) -> Result<IncrementalResponse<T>> {
        let mut exhausted = !first && self.page_token.is_none();
        while self.pending.len() < self.page_size && !exhausted {
            let page = self
                .source
                .fetch_page(self.page_token.take(), options)
                .await?;
            debug!(
                fetched = page.items.len(),
                buffered = self.pending.len(),
                more = page.next_page_token.is_some(),
                "fetched backend page"
            );
            self.pending.extend(page.items);
            self.page_token = page.next_page_token;
            exhausted = self.page_token.is_none();
        }

        let surplus = self.pending.split_off(self.pending.len().min(self.page_size));
        items.append(&mut self.pending);
        self.pending = surplus;

        let has_next_page = !self.pending.is_empty() || self.page_token.is_some();
        Ok(IncrementalResponse {
            items,
            has_next_page,
            cursor: has_next_page.then_some(self),
        })
    }
}

impl<T: Send + 'static + fmt::Debug> fmt::Debug for IncrementalResponse<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalResponse")
            .field("items", &self.items)
            .field("has_next_page", &self.has_next_page)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_util::sync::CancellationToken;

    use super::*;

    /// Serves fixed raw pages, dropping entries equal to `hidden` the way
    /// providers drop directory placeholders.
    struct FixedPages {
        pages: Vec<Vec<&'static str>>,
        hidden: &'static str,
        calls: AtomicUsize,
    }

    impl FixedPages {
        fn new(pages: Vec<Vec<&'static str>>) -> Arc<Self> {
            Self::hiding(pages, "")
        }

        fn hiding(pages: Vec<Vec<&'static str>>, hidden: &'static str) -> Arc<Self> {
            Arc::new(Self {
                pages,
                hidden,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource<String> for FixedPages {
        async fn fetch_page(
            &self,
            page_token: Option<String>,
            options: &RequestOptions,
        ) -> Result<Page<String>> {
            if options.is_aborted() {
                return Err(FileBrowserError::Aborted);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = page_token.map_or(0, |token| token.parse().unwrap());
            let items = self.pages[index]
                .iter()
                .filter(|item| **item != self.hidden)
                .map(|item| (*item).to_owned())
                .collect();
            let next_page_token = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
            Ok(Page {
                items,
                next_page_token,
            })
        }
    }

    fn names(items: &[String]) -> Vec<&str> {
        items.iter().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn test_pages_accumulate_until_exhausted() {
        let source = FixedPages::new(vec![vec!["a", "b", "c"], vec!["d", "e"]]);
        let options = RequestOptions::new();

        let first = IncrementalResponse::first_page(source.clone(), 3, &options)
            .await
            .unwrap();
        assert_eq!(names(&first.items), ["a", "b", "c"]);
        assert!(first.has_next_page);

        let second = first.get_next_page(&options).await.unwrap();
        assert_eq!(names(&second.items), ["a", "b", "c", "d", "e"]);
        assert!(!second.has_next_page);
        assert_eq!(source.calls(), 2);

        let err = second.get_next_page(&options).await.unwrap_err();
        assert!(matches!(err, FileBrowserError::NoNextPage));
    }

    #[tokio::test]
    async fn test_every_page_size_yields_full_listing_once() {
        let raw = vec![
            vec!["a", "b"],
            vec!["c"],
            vec![],
            vec!["d", "e", "f", "g"],
            vec!["h"],
        ];
        let expected = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let options = RequestOptions::new();

        for page_size in 1..=10 {
            let source = FixedPages::new(raw.clone());
            let mut response = IncrementalResponse::first_page(source, page_size, &options)
                .await
                .unwrap();
            let mut previous_len = response.items.len();
            while response.has_next_page {
                assert_eq!(response.items.len() % page_size, 0, "page_size {page_size}");
                response = response.get_next_page(&options).await.unwrap();
                assert!(response.items.len() > previous_len);
                previous_len = response.items.len();
            }
            assert_eq!(names(&response.items), expected, "page_size {page_size}");
        }
    }

    #[tokio::test]
    async fn test_short_raw_page_is_filled_from_next_raw_page() {
        let source = FixedPages::hiding(vec![vec!["dir/", "a", "b"], vec!["c", "d", "e"]], "dir/");
        let options = RequestOptions::new();

        let first = IncrementalResponse::first_page(source.clone(), 3, &options)
            .await
            .unwrap();
        assert_eq!(names(&first.items), ["a", "b", "c"]);
        assert!(first.has_next_page);
        assert_eq!(source.calls(), 2);

        // "d" and "e" were buffered; no further backend call is needed.
        let second = first.get_next_page(&options).await.unwrap();
        assert_eq!(names(&second.items), ["a", "b", "c", "d", "e"]);
        assert!(!second.has_next_page);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let source = FixedPages::new(vec![vec![]]);
        let response = IncrementalResponse::first_page(source, 5, &RequestOptions::new())
            .await
            .unwrap();
        assert!(response.items.is_empty());
        assert!(!response.has_next_page);
    }

    #[tokio::test]
    async fn test_aborted_next_page_leaves_response_usable() {
        let source = FixedPages::new(vec![vec!["a"], vec!["b"]]);
        let first = IncrementalResponse::first_page(source, 1, &RequestOptions::new())
            .await
            .unwrap();

        let signal = CancellationToken::new();
        signal.cancel();
        let err = first
            .get_next_page(&RequestOptions::with_signal(signal))
            .await
            .unwrap_err();
        assert!(err.is_abort());

        let second = first.get_next_page(&RequestOptions::new()).await.unwrap();
        assert_eq!(names(&second.items), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_collect_all() {
        let source = FixedPages::new(vec![vec!["a", "b"], vec!["c"]]);
        let options = RequestOptions::new();
        let first = IncrementalResponse::first_page(source, 1, &options)
            .await
            .unwrap();
        assert_eq!(
            names(&first.collect_all(&options).await.unwrap()),
            ["a", "b", "c"]
        );
    }
}
