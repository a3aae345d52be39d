//! Dump file IO: gzip-compressed, newline-delimited JSON records, one per
//! document. Reading reports compressed-byte progress and tolerates
//! malformed records (log + skip) so one bad line never sinks an ingest.

use crate::document::Document;
use crate::util::{create_with_backoff, open_with_backoff};
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Writer side: one gzip NDJSON file per dump (or per shard slice).
pub struct DumpWriter {
    path: PathBuf,
    w: BufWriter<GzEncoder<File>>,
    written: u64,
}

impl DumpWriter {
    pub fn create(path: &Path, write_buf_bytes: usize) -> Result<Self> {
        let file = create_with_backoff(path, 16, 50)
            .with_context(|| format!("create {}", path.display()))?;
        let enc = GzEncoder::new(file, Compression::default());
        Ok(Self {
            path: path.to_path_buf(),
            w: BufWriter::with_capacity(write_buf_bytes.max(8 * 1024), enc),
            written: 0,
        })
    }

    pub fn write_record(&mut self, doc: &Document) -> Result<()> {
        serde_json::to_writer(&mut self.w, doc)?;
        self.w.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(self) -> Result<()> {
        let enc = self
            .w
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        enc.finish()
            .with_context(|| format!("finish gzip stream {}", self.path.display()))?;
        Ok(())
    }
}

/// A `Read` wrapper that counts compressed bytes read, for progress bars.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Reader side: lazy record iterator over one dump file.
///
/// Malformed JSON lines are logged with their line number and skipped; IO
/// and gzip errors end the iteration with an `Err` item.
pub struct RecordReader {
    path: PathBuf,
    rdr: BufReader<MultiGzDecoder<CountingReader<File>>>,
    counter: Arc<AtomicU64>,
    last_count: u64,
    pb: Option<ProgressBar>,
    buf: String,
    line_no: u64,
    done: bool,
}

impl RecordReader {
    pub fn open(path: &Path, read_buf_bytes: usize, pb: Option<ProgressBar>) -> Result<Self> {
        let file = open_with_backoff(path, 16, 50)
            .with_context(|| format!("open {}", path.display()))?;
        let counter = Arc::new(AtomicU64::new(0));
        let counting = CountingReader { inner: file, counter: counter.clone() };
        let dec = MultiGzDecoder::new(counting);
        Ok(Self {
            path: path.to_path_buf(),
            rdr: BufReader::with_capacity(read_buf_bytes.max(8 * 1024), dec),
            counter,
            last_count: 0,
            pb,
            buf: String::with_capacity(16 * 1024),
            line_no: 0,
            done: false,
        })
    }

    fn tick_progress(&mut self) {
        if let Some(pb) = &self.pb {
            let cur = self.counter.load(Ordering::Relaxed);
            if cur > self.last_count {
                pb.inc(cur - self.last_count);
                self.last_count = cur;
            }
        }
    }
}

impl Iterator for RecordReader {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            self.buf.clear();
            match self.rdr.read_line(&mut self.buf) {
                Ok(0) => {
                    self.tick_progress();
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e).with_context(|| format!("read {}", self.path.display())));
                }
            }
            self.line_no += 1;
            self.tick_progress();
            if self.buf.ends_with('\n') {
                self.buf.pop();
                if self.buf.ends_with('\r') {
                    self.buf.pop();
                }
            }
            if self.buf.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Document>(&self.buf) {
                Ok(doc) => return Some(Ok(doc)),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = self.line_no,
                        error = %e,
                        "skipping malformed dump record"
                    );
                    continue;
                }
            }
        }
    }
}
