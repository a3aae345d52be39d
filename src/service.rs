//! Capability-typed boundary to the remote search cluster: paged scans,
//! bulk writes, shard topology, and index deletion. Network retry and
//! connection pooling live behind this trait, not in front of it.

use crate::document::{Document, WriteOutcome};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy at the service boundary. Callers classify on this;
/// everything above the boundary uses `anyhow`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("index not found: {0}")]
    IndexNotFound(String),
    #[error("{op} timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },
    #[error("transport error: {0}")]
    Transport(String),
}

impl ServiceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout { .. })
    }
}

/// Parameters for one paged scan over an index.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub index: String,
    /// Optional query-DSL filter; `None` scans everything.
    pub filter: Option<Value>,
    pub page_size: usize,
    pub scroll_timeout: Duration,
    /// `(slice_id, slice_count)`: restrict the scan to one routing slice.
    /// The union of all slices for a fixed count covers the index exactly.
    pub slice: Option<(u32, u32)>,
    /// Stable document order (sort by internal id); used by copy so repeated
    /// runs over a large index walk it in the same order. Implementations
    /// whose natural scan order is already stable may treat every scan as
    /// ordered and ignore this flag.
    pub ordered: bool,
}

impl PageQuery {
    pub fn full_scan(index: impl Into<String>, page_size: usize, scroll_timeout: Duration) -> Self {
        Self {
            index: index.into(),
            filter: None,
            page_size,
            scroll_timeout,
            slice: None,
            ordered: false,
        }
    }
}

/// One page of scan results plus the continuation token for the next page.
/// An empty `documents` vector signals exhaustion.
#[derive(Debug, Clone)]
pub struct ScanPage {
    pub documents: Vec<Document>,
    pub token: Option<String>,
}

/// The four remote capabilities the migration core depends on.
///
/// Implementations own their transport concerns (pooling, per-request retry
/// of transient transport errors). They must NOT retry `IndexNotFound`.
pub trait IndexService {
    /// Fetch one page. `token == None` starts a fresh scan; otherwise it is
    /// the opaque continuation token from the previous page.
    fn scan_page(&self, query: &PageQuery, token: Option<&str>) -> Result<ScanPage, ServiceError>;

    /// Write one batch, returning exactly one outcome per document, in
    /// order. Individual rejects come back as failed outcomes; only
    /// connection-level problems are errors.
    fn bulk_write(
        &self,
        documents: Vec<Document>,
        timeout: Option<Duration>,
    ) -> Result<Vec<WriteOutcome>, ServiceError>;

    /// Primary-shard topology: shard number -> node address. Exactly one
    /// entry per primary shard.
    fn shard_topology(&self, index: &str) -> Result<BTreeMap<u32, String>, ServiceError>;

    /// Which shard the documents of routing slice `slice_id` (out of
    /// `slice_count`) land on. The mapping is service-defined and
    /// many-to-one; the planner probes it, never assumes it.
    fn shard_for_slice(
        &self,
        index: &str,
        slice_id: u32,
        slice_count: u32,
    ) -> Result<u32, ServiceError>;

    fn delete_index(&self, index: &str, timeout: Duration) -> Result<(), ServiceError>;

    /// Release server-side scan state held by `token`. The scan iterator
    /// calls this once when a scan ends, fails, or is abandoned, so paged
    /// contexts do not linger for the full scroll timeout. Implementations
    /// without server-side scan state keep the default no-op.
    fn release_scan(&self, _token: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Connection factory. Parallel dump workers each open their own service
/// connection through this, so nothing is shared across workers.
pub trait ServiceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn IndexService>, ServiceError>;
}
