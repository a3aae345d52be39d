//! Migration scripts: an ordered, comma-separated row format chaining
//! dump/copy/ingest/delete operations, and the runner that executes rows
//! strictly in file order with an abort-or-annotate failure policy.
//!
//! The result script mirrors the input rows, each optionally suffixed with
//! a status column (`failed` | `delete failed`), and is written one row at
//! a time so a crash mid-script leaves a valid prefix.

use crate::pipeline::Migration;
use crate::util::{create_with_backoff, init_tracing_once, open_with_backoff};
use anyhow::{bail, Context, Result};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOp {
    Dump,
    Copy,
    Ingest,
    Delete,
}

impl ScriptOp {
    fn name(&self) -> &'static str {
        match self {
            ScriptOp::Dump => "dump",
            ScriptOp::Copy => "copy",
            ScriptOp::Ingest => "ingest",
            ScriptOp::Delete => "delete",
        }
    }
}

/// One script row. `primary` is an index name (dump/copy/delete) or a file
/// path (ingest); `secondary` is ingest's optional target index.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRow {
    pub op: ScriptOp,
    pub primary: String,
    pub secondary: Option<String>,
    pub delete_after: bool,
}

impl OperationRow {
    fn render(&self, status: Option<&str>) -> String {
        let mut cols = vec![self.op.name().to_string(), self.primary.clone()];
        if self.delete_after {
            cols.push("X".to_string());
        }
        if let Some(s) = &self.secondary {
            cols.push(s.clone());
        }
        if let Some(s) = status {
            cols.push(s.to_string());
        }
        cols.join(",")
    }
}

/// Parse one row. Blank lines and `#` comments are handled by the caller.
fn parse_row(line: &str, line_no: usize) -> Result<OperationRow> {
    let cols: Vec<&str> = line.split(',').map(str::trim).collect();
    let op = match cols[0] {
        "dump" => ScriptOp::Dump,
        "copy" => ScriptOp::Copy,
        "ingest" => ScriptOp::Ingest,
        "delete" => ScriptOp::Delete,
        other => bail!("line {line_no}: unknown operation {other:?}"),
    };
    let arity_err = || format!("line {line_no}: wrong column count for {}", cols[0]);
    match op {
        ScriptOp::Dump | ScriptOp::Copy => {
            if cols.len() < 2 || cols.len() > 3 || cols[1].is_empty() {
                bail!(arity_err());
            }
            let delete_after = match cols.get(2) {
                None => false,
                Some(&"X") | Some(&"x") => true,
                Some(other) => bail!("line {line_no}: expected X, got {other:?}"),
            };
            Ok(OperationRow {
                op,
                primary: cols[1].to_string(),
                secondary: None,
                delete_after,
            })
        }
        ScriptOp::Ingest => {
            if cols.len() < 2 || cols.len() > 3 || cols[1].is_empty() {
                bail!(arity_err());
            }
            Ok(OperationRow {
                op,
                primary: cols[1].to_string(),
                secondary: cols.get(2).filter(|s| !s.is_empty()).map(|s| s.to_string()),
                delete_after: false,
            })
        }
        ScriptOp::Delete => {
            if cols.len() != 2 || cols[1].is_empty() {
                bail!(arity_err());
            }
            Ok(OperationRow {
                op,
                primary: cols[1].to_string(),
                secondary: None,
                delete_after: false,
            })
        }
    }
}

/// Parse a whole script. A malformed row rejects the entire script before
/// anything executes, since that row's intent cannot be determined. Blank
/// lines and lines starting with `#` are skipped.
pub fn parse_script(text: &str) -> Result<Vec<OperationRow>> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        rows.push(parse_row(line, i + 1)?);
    }
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Executes rows strictly sequentially: a later row may depend on an
/// earlier row's side effect, so there is no scheduling freedom here.
pub struct ScriptRunner<'a> {
    migration: &'a Migration,
    state: RunState,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(migration: &'a Migration) -> Self {
        Self { migration, state: RunState::Idle }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run every row in order, writing one annotated result row (plus
    /// flush) per processed row. Returns the final state: `Completed`, or
    /// `Aborted` when abort-on-failure stopped the script early.
    pub fn run(&mut self, rows: &[OperationRow], out: &mut dyn Write) -> Result<RunState> {
        init_tracing_once();
        let abort_on_failure = self.migration.opts().abort_on_failure;
        self.state = RunState::Running;

        for row in rows {
            let ok = self.dispatch(row);

            let mut status = if ok { None } else { Some("failed") };
            if ok && row.delete_after && row.op != ScriptOp::Delete {
                // Recorded on the row, but never escalated to abort.
                if !self.migration.delete(&row.primary) {
                    status = Some("delete failed");
                }
            }

            writeln!(out, "{}", row.render(status)).context("write result row")?;
            out.flush().context("flush result script")?;

            if !ok && abort_on_failure {
                self.state = RunState::Aborted;
                tracing::error!(row = %row.render(None), "aborting script on failed row");
                return Ok(self.state);
            }
        }

        self.state = RunState::Completed;
        Ok(self.state)
    }

    fn dispatch(&self, row: &OperationRow) -> bool {
        match row.op {
            ScriptOp::Dump => self.migration.dump(&row.primary),
            ScriptOp::Copy => self.migration.copy(&row.primary),
            ScriptOp::Ingest => self
                .migration
                .ingest(Path::new(&row.primary), row.secondary.as_deref()),
            ScriptOp::Delete => self.migration.delete(&row.primary),
        }
    }
}

/// Convenience wrapper: parse `script_path`, run it, write the result
/// script to `result_path`. Syntax errors reject the whole run before any
/// row executes and before the result file is created.
pub fn run_script_file(
    migration: &Migration,
    script_path: &Path,
    result_path: &Path,
) -> Result<RunState> {
    let file = open_with_backoff(script_path, 16, 50)
        .with_context(|| format!("open script {}", script_path.display()))?;
    let mut text = String::new();
    BufReader::new(file)
        .read_to_string(&mut text)
        .with_context(|| format!("read script {}", script_path.display()))?;
    let rows = parse_script(&text)?;

    let out_file = create_with_backoff(result_path, 16, 50)
        .with_context(|| format!("create result script {}", result_path.display()))?;
    let mut out = BufWriter::new(out_file);

    let mut runner = ScriptRunner::new(migration);
    runner.run(&rows, &mut out)
}
