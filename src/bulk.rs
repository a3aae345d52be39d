//! Byte-bounded bulk writing: batch a lazy document stream into chunks no
//! larger than a serialized-size bound, submit each chunk, and drain every
//! per-document outcome so callers see all failures, not just the first.

use crate::document::{Document, WriteOutcome};
use crate::service::IndexService;
use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Upper bound on a single bulk request's cumulative serialized bytes.
    /// A lone document larger than the bound is submitted by itself.
    pub max_chunk_bytes: usize,
    /// Per-request timeout override; `None` uses the connection default.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BulkTotals {
    pub written: u64,
    pub failed: u64,
}

/// Stream `documents` through the service's bulk capability.
///
/// `on_outcome` fires once per document, in submission order, including
/// rejects; a reject never stops the stream. Stream-level errors (an absent
/// index mid-scan, a whole-request timeout) propagate and fail the call.
pub fn write_stream<I, E>(
    service: &dyn IndexService,
    documents: I,
    cfg: &BulkConfig,
    mut on_outcome: impl FnMut(&WriteOutcome),
) -> Result<BulkTotals>
where
    I: IntoIterator<Item = Result<Document, E>>,
    E: Into<anyhow::Error>,
{
    let mut totals = BulkTotals::default();
    let mut chunk: Vec<Document> = Vec::new();
    let mut chunk_bytes = 0usize;

    let mut flush = |chunk: &mut Vec<Document>,
                     chunk_bytes: &mut usize,
                     totals: &mut BulkTotals,
                     on_outcome: &mut dyn FnMut(&WriteOutcome)|
     -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let outcomes = service.bulk_write(std::mem::take(chunk), cfg.timeout)?;
        *chunk_bytes = 0;
        for outcome in &outcomes {
            if outcome.succeeded {
                totals.written += 1;
            } else {
                totals.failed += 1;
            }
            on_outcome(outcome);
        }
        Ok(())
    };

    for item in documents {
        let doc = item.map_err(Into::into)?;
        let size = doc.serialized_len();
        if !chunk.is_empty() && chunk_bytes + size > cfg.max_chunk_bytes {
            flush(&mut chunk, &mut chunk_bytes, &mut totals, &mut on_outcome)?;
        }
        chunk_bytes += size;
        chunk.push(doc);
    }
    flush(&mut chunk, &mut chunk_bytes, &mut totals, &mut on_outcome)?;

    Ok(totals)
}
