//! Lazy walk over multi-page result listings.

use crate::error::Result;
use crate::navigator::Navigator;
use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Scholar serves at most this many result pages per query
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Rows and affordances extracted from one page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage<T> {
    pub rows: Vec<T>,
    /// Target of the "next page" control
    pub next: Option<String>,
    pub total_results: u64,
}

/// Turns a page body into item rows.
///
/// Parsing is synchronous so the `!Send` document tree never lives across
/// an await point.
pub trait Listing {
    type Item: Send;

    fn parse_page(&self, html: &str) -> Result<ParsedPage<Self::Item>>;
}

/// Unread rows of the current page and its "next" target.
#[derive(Debug)]
pub struct PageCursor<T> {
    rows: VecDeque<T>,
    next: Option<String>,
}

impl<T> PageCursor<T> {
    pub fn new(rows: Vec<T>, next: Option<String>) -> Self {
        Self {
            rows: rows.into(),
            next,
        }
    }

    /// Rows not yet handed out
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn next_target(&self) -> Option<&str> {
        self.next.as_deref()
    }

    fn take(&mut self) -> Option<T> {
        self.rows.pop_front()
    }
}

/// Resumable sequence of items spread over linked pages.
///
/// Nothing is fetched until the first [`next`](PageIterator::next) call.
pub struct PageIterator<L: Listing> {
    nav: Arc<Navigator>,
    listing: L,
    start: String,
    cursor: Option<PageCursor<L::Item>>,
    pages_loaded: usize,
    page_limit: usize,
    total_results: Option<u64>,
    finished: bool,
}

impl<L: Listing> PageIterator<L> {
    pub fn new(nav: Arc<Navigator>, target: impl Into<String>, listing: L) -> Self {
        Self {
            nav,
            listing,
            start: target.into(),
            cursor: None,
            pages_loaded: 0,
            page_limit: DEFAULT_PAGE_LIMIT,
            total_results: None,
            finished: false,
        }
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    /// Result count reported by the first page
    pub fn total_results(&self) -> Option<u64> {
        self.total_results
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    pub fn listing(&self) -> &L {
        &self.listing
    }

    /// Next item, fetching further pages as needed.
    ///
    /// A fetch error is returned once and ends the sequence.
    pub async fn next(&mut self) -> Result<Option<L::Item>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            let target = match &mut self.cursor {
                None => self.start.clone(),
                Some(cursor) => {
                    if let Some(item) = cursor.take() {
                        return Ok(Some(item));
                    }
                    match cursor.next.take() {
                        Some(target) => target,
                        None => {
                            debug!(pages = self.pages_loaded, "No next page");
                            self.finished = true;
                            return Ok(None);
                        }
                    }
                }
            };

            if self.pages_loaded >= self.page_limit {
                info!(limit = self.page_limit, "Page limit reached");
                self.finished = true;
                return Ok(None);
            }

            if let Err(e) = self.load(&target).await {
                self.finished = true;
                return Err(e);
            }
        }
    }

    async fn load(&mut self, target: &str) -> Result<()> {
        let body = self.nav.fetch(target).await?;
        let page = self.listing.parse_page(&body)?;
        self.pages_loaded += 1;
        if self.total_results.is_none() {
            self.total_results = Some(page.total_results);
        }
        debug!(
            page = self.pages_loaded,
            rows = page.rows.len(),
            has_next = page.next.is_some(),
            "Loaded result page"
        );
        self.cursor = Some(PageCursor::new(page.rows, page.next));
        Ok(())
    }

    /// Items as a stream over the same cursor as [`next`](PageIterator::next)
    pub fn stream(&mut self) -> impl Stream<Item = Result<L::Item>> + '_ {
        futures::stream::unfold(self, |iter| async move {
            match iter.next().await {
                Ok(Some(item)) => Some((Ok(item), iter)),
                Ok(None) => None,
                Err(e) => Some((Err(e), iter)),
            }
        })
    }
}
