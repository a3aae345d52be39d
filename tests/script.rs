#[path = "common/mod.rs"]
mod common;

use common::*;
use esmig::{dump_file_name, parse_script, run_script_file, Migration, RunState, ScriptOp};
use std::fs;
use std::path::{Path, PathBuf};

fn write_script(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("migration.csv");
    fs::write(&path, text).unwrap();
    path
}

fn result_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn parse_accepts_all_row_forms() {
    let rows = parse_script(
        "# comment\n\
         dump,idx-a\n\
         dump,idx-b,X\n\
         copy,idx-c,x\n\
         ingest,/tmp/idx_a_dump.jsonl.gz,target-idx\n\
         ingest,/tmp/idx_b_dump.jsonl.gz\n\
         delete,idx-d\n",
    )
    .unwrap();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0].op, ScriptOp::Dump);
    assert!(!rows[0].delete_after);
    assert!(rows[1].delete_after);
    assert!(rows[2].delete_after);
    assert_eq!(rows[3].secondary.as_deref(), Some("target-idx"));
    assert_eq!(rows[4].secondary, None);
    assert_eq!(rows[5].op, ScriptOp::Delete);
}

#[test]
fn parse_rejects_malformed_rows() {
    assert!(parse_script("frobnicate,idx").is_err());
    assert!(parse_script("dump").is_err());
    assert!(parse_script("dump,idx,Y").is_err());
    assert!(parse_script("delete,idx,extra").is_err());
    assert!(parse_script("dump,idx,X,extra").is_err());
}

/// With abort-on-failure, the failing row is the last row processed: the
/// result script holds exactly the rows up to and including it, and later
/// rows never run.
#[test]
fn abort_on_failure_stops_at_failing_row() {
    let cluster = FakeCluster::new();
    cluster.add_index("idx-a", 1, make_docs("idx-a", 3));
    cluster.add_index("idx-c", 1, make_docs("idx-c", 3));

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "dump,idx-a\ndump,idx-b\ndump,idx-c\n");
    let result = dir.path().join("out.csv");

    let m = Migration::new(cluster.opener(), cluster.opener())
        .dump_dir(dir.path())
        .abort_on_failure(true)
        .progress(false);
    let state = run_script_file(&m, &script, &result).unwrap();

    assert_eq!(state, RunState::Aborted);
    assert_eq!(result_lines(&result), vec!["dump,idx-a", "dump,idx-b,failed"]);
    assert!(
        !dir.path().join(dump_file_name("idx-c", None)).exists(),
        "rows after the abort must never run"
    );
}

/// Without abort-on-failure, the failed row is annotated and the script
/// keeps going.
#[test]
fn annotate_and_continue_without_abort() {
    let cluster = FakeCluster::new();
    cluster.add_index("idx-a", 1, make_docs("idx-a", 3));
    cluster.add_index("idx-c", 1, make_docs("idx-c", 3));

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "dump,idx-a\ndump,idx-b\ndump,idx-c\n");
    let result = dir.path().join("out.csv");

    let m = Migration::new(cluster.opener(), cluster.opener())
        .dump_dir(dir.path())
        .abort_on_failure(false)
        .progress(false);
    let state = run_script_file(&m, &script, &result).unwrap();

    assert_eq!(state, RunState::Completed);
    assert_eq!(
        result_lines(&result),
        vec!["dump,idx-a", "dump,idx-b,failed", "dump,idx-c"]
    );
    assert!(dir.path().join(dump_file_name("idx-c", None)).exists());
}

/// A successful row with the delete-after marker drops the source index.
#[test]
fn delete_after_drops_source_index() {
    let source = FakeCluster::new();
    source.add_index("old-logs", 1, make_docs("old-logs", 5));
    let target = FakeCluster::new();

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "copy,old-logs,X\n");
    let result = dir.path().join("out.csv");

    let m = Migration::new(source.opener(), target.opener()).progress(false);
    let state = run_script_file(&m, &script, &result).unwrap();

    assert_eq!(state, RunState::Completed);
    assert_eq!(result_lines(&result), vec!["copy,old-logs,X"]);
    assert!(source.docs("old-logs").is_empty());
    assert_eq!(source.lock().deleted, vec!["old-logs".to_string()]);
    assert_eq!(target.docs("old-logs").len(), 5);
}

/// A failed post-op delete is recorded on the row but never escalates to
/// abort, even with abort-on-failure set.
#[test]
fn failed_delete_after_is_annotated_not_escalated() {
    let source = FakeCluster::new();
    source.add_index("old-logs", 1, make_docs("old-logs", 4));
    source.add_index("idx-a", 1, make_docs("idx-a", 2));
    source.lock().timeout_deletes = true;
    let target = FakeCluster::new();

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "copy,old-logs,X\ndump,idx-a\n");
    let result = dir.path().join("out.csv");

    let m = Migration::new(source.opener(), target.opener())
        .dump_dir(dir.path())
        .abort_on_failure(true)
        .error_on_timeout(true)
        .progress(false);
    let state = run_script_file(&m, &script, &result).unwrap();

    assert_eq!(state, RunState::Completed);
    assert_eq!(
        result_lines(&result),
        vec!["copy,old-logs,X,delete failed", "dump,idx-a"]
    );
}

/// With the timeout policy relaxed, a timed-out delete counts as success
/// and the row stays unannotated.
#[test]
fn delete_timeout_policy_can_tolerate_timeouts() {
    let source = FakeCluster::new();
    source.add_index("old-logs", 1, make_docs("old-logs", 4));
    source.lock().timeout_deletes = true;
    let target = FakeCluster::new();

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "copy,old-logs,X\n");
    let result = dir.path().join("out.csv");

    let m = Migration::new(source.opener(), target.opener())
        .error_on_timeout(false)
        .progress(false);
    let state = run_script_file(&m, &script, &result).unwrap();

    assert_eq!(state, RunState::Completed);
    assert_eq!(result_lines(&result), vec!["copy,old-logs,X"]);
}

/// Deleting an absent index is a hard failure for that row.
#[test]
fn delete_row_missing_index_fails() {
    let cluster = FakeCluster::new();
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "delete,ghost\n");
    let result = dir.path().join("out.csv");

    let m = Migration::new(cluster.opener(), cluster.opener())
        .abort_on_failure(false)
        .progress(false);
    let state = run_script_file(&m, &script, &result).unwrap();

    assert_eq!(state, RunState::Completed);
    assert_eq!(result_lines(&result), vec!["delete,ghost,failed"]);
}

/// A malformed row rejects the whole script before anything executes: no
/// operation runs and no result script is produced.
#[test]
fn syntax_error_rejects_whole_script() {
    let cluster = FakeCluster::new();
    cluster.add_index("idx-a", 1, make_docs("idx-a", 3));

    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "dump,idx-a\nfrobnicate,idx-b\n");
    let result = dir.path().join("out.csv");

    let m = Migration::new(cluster.opener(), cluster.opener())
        .dump_dir(dir.path())
        .progress(false);
    assert!(run_script_file(&m, &script, &result).is_err());

    assert!(!result.exists(), "no result script for a rejected run");
    assert!(
        !dir.path().join(dump_file_name("idx-a", None)).exists(),
        "no row may execute when the script is malformed"
    );
}

/// Ingest rows route through the runner end to end.
#[test]
fn script_chains_dump_and_ingest() {
    let source = FakeCluster::new();
    source.add_index("sessions", 1, make_docs("sessions", 6));
    let target = FakeCluster::new();

    let dir = tempfile::tempdir().unwrap();
    let dump_path = dir.path().join(dump_file_name("sessions", None));
    let script = write_script(
        dir.path(),
        &format!("dump,sessions\ningest,{},sessions-v2\n", dump_path.display()),
    );
    let result = dir.path().join("out.csv");

    let m = Migration::new(source.opener(), target.opener())
        .dump_dir(dir.path())
        .progress(false);
    let state = run_script_file(&m, &script, &result).unwrap();

    assert_eq!(state, RunState::Completed);
    assert_eq!(target.docs("sessions-v2").len(), 6);
    assert_eq!(result_lines(&result).len(), 2);
}
