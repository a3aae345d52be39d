use std::path::{Path, PathBuf};
use std::time::Duration;

/// User-facing options with sensible defaults and builder chaining.
/// Constructed once per invocation and passed down explicitly; there is no
/// ambient global configuration.
#[derive(Clone, Debug)]
pub struct MigrateOptions {
    pub page_size: usize,             // documents per scan page
    pub scroll_timeout: Duration,     // continuation-token keepalive per page
    pub bulk_max_bytes: usize,        // upper bound on one bulk request's serialized size
    pub bulk_timeout: Option<Duration>, // per-request override for bulk writes
    pub delete_timeout: Duration,
    pub error_on_timeout: bool,       // whether a timed-out delete counts as failure
    pub parallel: bool,               // shard-parallel dump on/off
    pub preserve_ids: bool,           // keep document ids on write; else cluster-assigned
    pub preserve_index: bool,         // ingest: fall back to the stored _index when no target given
    pub transforms: Vec<String>,      // names into the transform registry, applied in order
    pub dump_dir: PathBuf,            // where dump files land / are read from
    pub abort_on_failure: bool,       // script policy: halt on first failed row

    // IO tuning
    pub read_buffer_bytes: usize,     // BufReader capacity
    pub write_buffer_bytes: usize,    // BufWriter capacity

    pub progress: bool,               // show progress bars
    pub progress_label: Option<String>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            scroll_timeout: Duration::from_secs(60),
            bulk_max_bytes: 10 * 1024 * 1024,
            bulk_timeout: None,
            delete_timeout: Duration::from_secs(30),
            error_on_timeout: false,
            parallel: true,
            preserve_ids: true,
            preserve_index: true,
            transforms: Vec::new(),
            dump_dir: PathBuf::from("."),
            abort_on_failure: true,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,

            progress: true,
            progress_label: None,
        }
    }
}

impl MigrateOptions {
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }
    pub fn with_scroll_timeout(mut self, d: Duration) -> Self {
        self.scroll_timeout = d;
        self
    }
    pub fn with_bulk_max_bytes(mut self, bytes: usize) -> Self {
        self.bulk_max_bytes = bytes.max(1024);
        self
    }
    pub fn with_bulk_timeout(mut self, d: Option<Duration>) -> Self {
        self.bulk_timeout = d;
        self
    }
    pub fn with_delete_timeout(mut self, d: Duration) -> Self {
        self.delete_timeout = d;
        self
    }
    pub fn with_error_on_timeout(mut self, yes: bool) -> Self {
        self.error_on_timeout = yes;
        self
    }
    pub fn with_parallel(mut self, yes: bool) -> Self {
        self.parallel = yes;
        self
    }
    pub fn with_preserve_ids(mut self, yes: bool) -> Self {
        self.preserve_ids = yes;
        self
    }
    pub fn with_preserve_index(mut self, yes: bool) -> Self {
        self.preserve_index = yes;
        self
    }
    pub fn with_transforms<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transforms = names.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_dump_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dump_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_abort_on_failure(mut self, yes: bool) -> Self {
        self.abort_on_failure = yes;
        self
    }

    // IO buffers tuning
    pub fn with_io_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }
    pub fn with_io_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }

    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
}
