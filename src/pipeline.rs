//! The four migration primitives. Each composes the scan/transform/bulk
//! building blocks into one named operation and reports success as a bool
//! to the script runner; details land in the log, never in a panic.

use crate::bulk::{self, BulkConfig, BulkTotals};
use crate::config::MigrateOptions;
use crate::document::WriteOutcome;
use crate::gzip_jsonl::{DumpWriter, RecordReader};
use crate::progress::{make_bytes_bar, make_doc_spinner};
use crate::scan::DocScan;
use crate::service::{IndexService, PageQuery, ServiceOpener};
use crate::shards;
use crate::transform::TransformPipeline;
use crate::util::{dump_file_name, init_tracing_once};
use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub struct Migration {
    opts: MigrateOptions,
    source: Arc<dyn ServiceOpener>,
    target: Arc<dyn ServiceOpener>,
}

impl Migration {
    /// `source` serves scans/topology/deletes, `target` serves bulk writes.
    /// For intra-cluster work, pass the same opener twice.
    pub fn new(source: Arc<dyn ServiceOpener>, target: Arc<dyn ServiceOpener>) -> Self {
        Self { opts: MigrateOptions::default(), source, target }
    }

    // -------- Builder methods --------
    pub fn options(mut self, opts: MigrateOptions) -> Self { self.opts = opts; self }
    pub fn page_size(mut self, n: usize) -> Self { self.opts = self.opts.with_page_size(n); self }
    pub fn parallel(mut self, yes: bool) -> Self { self.opts = self.opts.with_parallel(yes); self }
    pub fn preserve_ids(mut self, yes: bool) -> Self { self.opts = self.opts.with_preserve_ids(yes); self }
    pub fn transforms<I, S>(mut self, names: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_transforms(names); self }
    pub fn dump_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_dump_dir(dir); self }
    pub fn abort_on_failure(mut self, yes: bool) -> Self { self.opts = self.opts.with_abort_on_failure(yes); self }
    pub fn error_on_timeout(mut self, yes: bool) -> Self { self.opts = self.opts.with_error_on_timeout(yes); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }

    pub fn opts(&self) -> &MigrateOptions {
        &self.opts
    }

    fn bulk_config(&self) -> BulkConfig {
        BulkConfig {
            max_chunk_bytes: self.opts.bulk_max_bytes,
            timeout: self.opts.bulk_timeout,
        }
    }

    fn doc_spinner(&self, label: &str) -> Option<ProgressBar> {
        if self.opts.progress {
            Some(make_doc_spinner(Some(
                self.opts.progress_label.as_deref().unwrap_or(label),
            )))
        } else {
            None
        }
    }

    // -------- dump --------

    /// Extract every document of `index` into gzip NDJSON dump files under
    /// the configured dump directory. Sharded indices fan out to one worker
    /// and one file per primary shard; partial files from successful
    /// workers stay on disk even when a sibling fails.
    pub fn dump(&self, index: &str) -> bool {
        init_tracing_once();
        match self.dump_inner(index) {
            Ok(n) => {
                tracing::info!(index, docs = n, "dump complete");
                true
            }
            Err(e) => {
                tracing::error!(index, error = %e, "dump failed");
                false
            }
        }
    }

    fn dump_inner(&self, index: &str) -> Result<u64> {
        fs::create_dir_all(&self.opts.dump_dir)
            .with_context(|| format!("create dump dir {}", self.opts.dump_dir.display()))?;
        let svc = self.source.open()?;
        let pb = self.doc_spinner(&format!("Dumping {index}"));

        if !self.opts.parallel {
            let out = self.opts.dump_dir.join(dump_file_name(index, None));
            let n = self.dump_slice(&*svc, index, None, &out, pb.clone())?;
            if let Some(pb) = pb { pb.finish_with_message("done"); }
            return Ok(n);
        }

        let plan = shards::plan(&*svc, index)?;
        let shard_count = plan.shard_count();
        if shard_count <= 1 {
            // One primary shard: slicing would only add overhead.
            let out = self.opts.dump_dir.join(dump_file_name(index, None));
            let n = self.dump_slice(&*svc, index, None, &out, pb.clone())?;
            if let Some(pb) = pb { pb.finish_with_message("done"); }
            return Ok(n);
        }
        drop(svc);

        // One fully independent worker per shard: own connection, own slice,
        // own output file. Workers are never cancelled; all results are
        // collected after every worker has finished, then the first error
        // (if any) fails the operation.
        let results: Vec<(u32, Result<u64>)> = plan
            .assignments()
            .par_iter()
            .map(|&(shard, slice)| {
                let res = (|| -> Result<u64> {
                    let svc = self.source.open()?;
                    let out = self.opts.dump_dir.join(dump_file_name(index, Some(slice)));
                    self.dump_slice(&*svc, index, Some((slice, shard_count)), &out, pb.clone())
                })();
                (shard, res)
            })
            .collect();
        if let Some(pb) = pb { pb.finish_with_message("done"); }

        let mut total = 0u64;
        let mut first_err = None;
        for (shard, res) in results {
            match res {
                Ok(n) => total += n,
                Err(e) => {
                    tracing::error!(index, shard, error = %e, "shard dump worker failed");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    fn dump_slice(
        &self,
        svc: &dyn IndexService,
        index: &str,
        slice: Option<(u32, u32)>,
        out: &Path,
        pb: Option<ProgressBar>,
    ) -> Result<u64> {
        let mut query =
            PageQuery::full_scan(index, self.opts.page_size, self.opts.scroll_timeout);
        query.slice = slice;

        let mut writer = DumpWriter::create(out, self.opts.write_buffer_bytes)?;
        for item in DocScan::open(svc, query) {
            // On error the records written so far remain on disk.
            let doc = item?;
            writer.write_record(&doc)?;
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        let n = writer.written();
        writer.finish()?;
        Ok(n)
    }

    // -------- ingest --------

    /// Load dump records from `path` (a single file, or a directory holding
    /// the slice files of a sharded dump) into the target cluster.
    /// Per-document rejects are logged and counted but never fail the
    /// operation; only an unreadable file or a connection-level error does.
    pub fn ingest(&self, path: &Path, target_index: Option<&str>) -> bool {
        init_tracing_once();
        match self.ingest_inner(path, target_index) {
            Ok(totals) => {
                tracing::info!(
                    path = %path.display(),
                    written = totals.written,
                    rejected = totals.failed,
                    "ingest complete"
                );
                true
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "ingest failed");
                false
            }
        }
    }

    fn ingest_inner(&self, path: &Path, target_index: Option<&str>) -> Result<BulkTotals> {
        if target_index.is_none() && !self.opts.preserve_index {
            bail!("no target index given and index preservation is disabled");
        }
        let pipeline = TransformPipeline::build(&self.opts.transforms)?;
        let files = collect_dump_files(path)?;
        if files.is_empty() {
            bail!("no dump files under {}", path.display());
        }

        let svc = self.target.open()?;
        let cfg = self.bulk_config();
        let mut totals = BulkTotals::default();

        for file in &files {
            let pb = if self.opts.progress {
                let len = fs::metadata(file).map(|m| m.len()).unwrap_or(0);
                Some(make_bytes_bar(len, Some(&format!("Ingesting {}", file.display()))))
            } else {
                None
            };

            let reader = RecordReader::open(file, self.opts.read_buffer_bytes, pb.clone())?;
            let docs = reader.map(|item| {
                item.map(|mut doc| {
                    if let Some(t) = target_index {
                        doc.index = t.to_string();
                    }
                    if !self.opts.preserve_ids {
                        doc.id.clear();
                    }
                    pipeline.apply(&mut doc);
                    doc
                })
            });

            let part = bulk::write_stream(&*svc, docs, &cfg, log_rejected_outcome)?;
            totals.written += part.written;
            totals.failed += part.failed;
            if let Some(pb) = pb {
                pb.finish_with_message("done");
            }
        }
        Ok(totals)
    }

    // -------- copy --------

    /// Stream `index` from the source cluster straight into the target
    /// cluster without touching disk. The scan runs in stable internal-id
    /// order, so repeated copies of a large index walk it identically.
    pub fn copy(&self, index: &str) -> bool {
        init_tracing_once();
        match self.copy_inner(index) {
            Ok(totals) => {
                tracing::info!(
                    index,
                    written = totals.written,
                    rejected = totals.failed,
                    "copy complete"
                );
                true
            }
            Err(e) => {
                tracing::error!(index, error = %e, "copy failed");
                false
            }
        }
    }

    fn copy_inner(&self, index: &str) -> Result<BulkTotals> {
        let pipeline = TransformPipeline::build(&self.opts.transforms)?;
        let src = self.source.open()?;
        let dst = self.target.open()?;

        let mut query =
            PageQuery::full_scan(index, self.opts.page_size, self.opts.scroll_timeout);
        query.ordered = true;

        let pb = self.doc_spinner(&format!("Copying {index}"));
        let preserve_ids = self.opts.preserve_ids;
        let docs = DocScan::open(&*src, query).map(|item| {
            item.map(|mut doc| {
                if !preserve_ids {
                    doc.id.clear();
                }
                pipeline.apply(&mut doc);
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
                doc
            })
        });

        let totals = bulk::write_stream(&*dst, docs, &self.bulk_config(), log_rejected_outcome)?;
        if let Some(pb) = &pb {
            pb.finish_with_message("done");
        }
        Ok(totals)
    }

    // -------- delete --------

    /// Drop an index on the source cluster. An absent index is a failure; a
    /// timed-out delete is policy-controlled, because on a large cluster the
    /// delete may legitimately outlive the client's wait without failing.
    pub fn delete(&self, index: &str) -> bool {
        init_tracing_once();
        let svc = match self.source.open() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(index, error = %e, "delete failed: cannot connect");
                return false;
            }
        };
        match svc.delete_index(index, self.opts.delete_timeout) {
            Ok(()) => {
                tracing::info!(index, "index deleted");
                true
            }
            Err(e) if e.is_timeout() && !self.opts.error_on_timeout => {
                tracing::warn!(index, error = %e, "delete timed out; treating as success");
                true
            }
            Err(e) => {
                tracing::error!(index, error = %e, "delete failed");
                false
            }
        }
    }
}

fn log_rejected_outcome(outcome: &WriteOutcome) {
    if !outcome.succeeded {
        tracing::warn!(
            index = %outcome.document.index,
            id = %outcome.document.id,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "bulk item rejected"
        );
    }
}

/// A directory ingests every dump file inside it (a sharded dump writes one
/// file per slice); a plain path ingests just that file.
fn collect_dump_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().ends_with(".jsonl.gz"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}
