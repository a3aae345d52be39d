//! Restartable paged scan over one index: a lazy, finite sequence of
//! documents driven by the service's continuation tokens.

use crate::document::Document;
use crate::service::{IndexService, PageQuery, ServiceError};
use std::collections::VecDeque;

/// Iterator over every document a scan query matches. Each call to
/// [`DocScan::open`] re-scans from the beginning; there is no mid-sequence
/// restart. Per-page errors surface as `Err` items and end the sequence;
/// an absent index yields `IndexNotFound` on the first pull, which callers
/// use to mark the whole operation failed.
pub struct DocScan<'a> {
    service: &'a dyn IndexService,
    query: PageQuery,
    token: Option<String>,
    page: VecDeque<Document>,
    started: bool,
    done: bool,
}

impl<'a> DocScan<'a> {
    pub fn open(service: &'a dyn IndexService, query: PageQuery) -> Self {
        Self {
            service,
            query,
            token: None,
            page: VecDeque::new(),
            started: false,
            done: false,
        }
    }

    fn fetch_next_page(&mut self) -> Result<(), ServiceError> {
        let page = self.service.scan_page(&self.query, self.token.as_deref())?;
        self.token = page.token;
        self.page = page.documents.into();
        self.started = true;
        // Exhaustion: an empty page, or no token to continue with.
        if self.page.is_empty() || self.token.is_none() {
            self.done = true;
            self.release_context();
        }
        Ok(())
    }

    /// Hand the continuation token back to the service so the scan context
    /// does not linger for the full scroll timeout. Best effort; a failed
    /// release must not mask the scan's own result.
    fn release_context(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.service.release_scan(&token) {
                tracing::debug!(error = %e, "failed to release scan context");
            }
        }
    }
}

impl Drop for DocScan<'_> {
    fn drop(&mut self) {
        // Covers a scan abandoned mid-sequence, e.g. when the consumer hits
        // a write error and stops pulling.
        self.release_context();
    }
}

impl Iterator for DocScan<'_> {
    type Item = Result<Document, ServiceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.page.pop_front() {
                return Some(Ok(doc));
            }
            if self.done {
                return None;
            }
            // No page buffered: fetch the first page, or follow the token.
            if self.started && self.token.is_none() {
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                self.done = true;
                self.release_context();
                return Some(Err(e));
            }
        }
    }
}
