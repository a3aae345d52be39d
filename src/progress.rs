//! Progress reporting utilities: document-count spinners for scans and a
//! byte-based bar for dump-file ingest.

use indicatif::{ProgressBar, ProgressStyle};

/// Unbounded document counter for scan-driven operations (dump/copy), where
/// the total is not known up front.
pub fn make_doc_spinner(label: Option<&str>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos} docs  it/s: {per_sec}  elapsed: {elapsed_precise}",
    )
    .unwrap();
    pb.set_style(style);
    if let Some(msg) = label {
        pb.set_message(msg.to_string());
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Byte-based bar for reading a dump file whose compressed size is known.
pub fn make_bytes_bar(total_bytes: u64, label: Option<&str>) -> ProgressBar {
    let pb = ProgressBar::new(total_bytes);
    let style = ProgressStyle::with_template(
        "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
         {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    )
    .unwrap()
    .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    if let Some(msg) = label {
        pb.set_message(msg.to_string());
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
