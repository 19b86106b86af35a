//! Offset pagination over a page source
//!
//! A [`PageCursor`] walks one cycle lazily. [`PaginatedFetcher`] drains a
//! cursor and keeps whatever arrived before a failure.

use std::time::Duration;

use crate::ports::{FetchError, PageRequest, PageSource};

/// Lazy walk over the pages of one fetch cycle
pub struct PageCursor<'a, S: PageSource + ?Sized> {
    source: &'a S,
    base: PageRequest,
    page_size: usize,
    max_pages: usize,
    page_delay: Duration,
    offset: usize,
    pages: usize,
    done: bool,
}

impl<'a, S: PageSource + ?Sized> PageCursor<'a, S> {
    pub fn new(source: &'a S, base: PageRequest, page_size: usize, max_pages: usize) -> Self {
        Self {
            source,
            base,
            page_size,
            max_pages,
            page_delay: Duration::ZERO,
            offset: 0,
            pages: 0,
            done: false,
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Rewind to the first page for a fresh cycle
    pub fn restart(&mut self) {
        self.offset = 0;
        self.pages = 0;
        self.done = false;
    }

    /// Fetch the next page; None once the cycle is over
    pub async fn next_page(&mut self) -> Option<Result<Vec<S::Record>, FetchError>> {
        if self.done || self.page_size == 0 || self.max_pages == 0 {
            self.done = true;
            return None;
        }

        if self.pages > 0 && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        let request = self.base.at(self.offset, self.page_size);
        let result = self.source.fetch_page(&request).await;
        self.pages += 1;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        tracing::debug!(
            "{} page {} at offset {}: {} records",
            self.source.name(),
            self.pages,
            self.offset,
            page.len()
        );

        let short = page.len() < self.page_size;
        let exhausted = page.has_more == Some(false);
        if !self.source.paginated() || short || exhausted || self.pages >= self.max_pages {
            self.done = true;
        } else {
            self.offset += self.page_size;
        }

        Some(Ok(page.records))
    }
}

/// Result of one full pagination cycle
#[derive(Debug)]
pub struct FetchOutcome<R> {
    /// Records from every page that succeeded
    pub records: Vec<R>,
    pub pages: usize,
    /// The failure that cut the cycle short, if any
    pub error: Option<FetchError>,
}

impl<R> FetchOutcome<R> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaginatedFetcher {
    page_delay: Duration,
}

impl PaginatedFetcher {
    pub fn new(page_delay: Duration) -> Self {
        Self { page_delay }
    }

    pub fn cursor<'a, S: PageSource + ?Sized>(
        &self,
        source: &'a S,
        base: PageRequest,
        page_size: usize,
        max_pages: usize,
    ) -> PageCursor<'a, S> {
        PageCursor::new(source, base, page_size, max_pages).with_page_delay(self.page_delay)
    }

    pub async fn fetch_all<S: PageSource + ?Sized>(
        &self,
        source: &S,
        base: PageRequest,
        page_size: usize,
        max_pages: usize,
    ) -> FetchOutcome<S::Record> {
        let mut cursor = self.cursor(source, base, page_size, max_pages);
        let mut records = Vec::new();
        let mut error = None;

        while let Some(result) = cursor.next_page().await {
            match result {
                Ok(page) => records.extend(page),
                Err(e) => error = Some(e),
            }
        }

        FetchOutcome {
            records,
            pages: cursor.pages_fetched(),
            error,
        }
    }
}
