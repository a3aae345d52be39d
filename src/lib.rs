mod bulk;
mod config;
mod document;
mod es;
mod gzip_jsonl;
mod pipeline;
mod progress;
mod scan;
mod script;
mod service;
mod shards;
mod transform;
mod util;

pub use crate::config::MigrateOptions;
pub use crate::document::{Document, WriteOutcome};
pub use crate::pipeline::Migration;
pub use crate::script::{parse_script, run_script_file, OperationRow, RunState, ScriptOp, ScriptRunner};
pub use crate::service::{IndexService, PageQuery, ScanPage, ServiceError, ServiceOpener};

// Pipeline building blocks, exposed for callers composing their own flows.
pub use crate::bulk::{write_stream, BulkConfig, BulkTotals};
pub use crate::scan::DocScan;
pub use crate::shards::{plan, ShardMap, MAX_SLICE_PROBES_PER_SHARD};
pub use crate::transform::{Transform, TransformPipeline};

// Concrete Elasticsearch REST transport.
pub use crate::es::{EsConfig, EsOpener};

// Dump-file helpers so binaries and tests can read/write the on-disk format.
pub use crate::gzip_jsonl::{DumpWriter, RecordReader};
pub use crate::util::{dump_file_name, init_tracing_once, sanitize_index_name};
