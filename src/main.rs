use anyhow::{bail, Result};
use esmig::{run_script_file, EsConfig, EsOpener, MigrateOptions, Migration, RunState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn hosts_from_env(var: &str, fallback: &str) -> Vec<String> {
    let raw = std::env::var(var).unwrap_or_else(|_| fallback.to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_flag(var: &str, default: bool) -> bool {
    match std::env::var(var) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn opener_from_env(hosts_var: &str) -> Arc<EsOpener> {
    let mut cfg = EsConfig::from_hosts(hosts_from_env(hosts_var, "localhost:9200"));
    cfg.username = std::env::var("ES_USERNAME").ok();
    cfg.password = std::env::var("ES_PASSWORD").ok();
    cfg.api_key = std::env::var("ES_API_KEY").ok();
    cfg.insecure_tls = env_flag("ES_INSECURE_TLS", false);
    Arc::new(EsOpener::new(cfg))
}

fn main() -> Result<()> {
    esmig::init_tracing_once();

    let mut args = std::env::args().skip(1);
    let script = match args.next() {
        Some(p) => PathBuf::from(p),
        None => bail!("usage: esmig <script.csv> [result.csv]"),
    };
    let result = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| script.with_extension("result.csv"));

    // Source and target clusters; with only ES_HOSTS set, both point at the
    // same cluster.
    let source = opener_from_env("ES_HOSTS");
    let target = if std::env::var("ES_TARGET_HOSTS").is_ok() {
        opener_from_env("ES_TARGET_HOSTS")
    } else {
        source.clone()
    };

    let mut opts = MigrateOptions::default()
        .with_parallel(env_flag("ESMIG_PARALLEL", true))
        .with_preserve_ids(env_flag("ESMIG_PRESERVE_IDS", true))
        .with_abort_on_failure(env_flag("ESMIG_ABORT_ON_FAILURE", true))
        .with_error_on_timeout(env_flag("ESMIG_ERROR_ON_TIMEOUT", false));
    if let Ok(dir) = std::env::var("ESMIG_DUMP_DIR") {
        opts = opts.with_dump_dir(dir);
    }
    if let Ok(names) = std::env::var("ESMIG_TRANSFORMS") {
        opts = opts.with_transforms(names.split(',').map(str::trim).filter(|s| !s.is_empty()));
    }
    if let Ok(n) = std::env::var("ESMIG_PAGE_SIZE") {
        opts = opts.with_page_size(n.parse()?);
    }
    if let Ok(secs) = std::env::var("ESMIG_SCROLL_TIMEOUT_SECS") {
        opts = opts.with_scroll_timeout(Duration::from_secs(secs.parse()?));
    }

    let migration = Migration::new(source, target).options(opts);
    match run_script_file(&migration, &script, &result)? {
        RunState::Completed => Ok(()),
        state => bail!(
            "script {} ended in state {state:?}; partial results in {}",
            script.display(),
            result.display()
        ),
    }
}
