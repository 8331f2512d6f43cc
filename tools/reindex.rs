use std::env;
use std::path::PathBuf;

use library::{synchronize, SyncConfig, SyncContext};
use metadata::ReaderRegistry;
use tracing_subscriber::EnvFilter;

/// One blocking sync pass. Arguments are library paths to register; a path
/// prefixed with `-` is unregistered instead.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let library_root = PathBuf::from(env::var("LIBRARY_ROOT").unwrap_or_else(|_| "data".to_string()));
    let index_path = env::var("INDEX_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| library_root.join("library.db"));
    std::fs::create_dir_all(&library_root)?;

    let ctx = SyncContext::new(&library_root, ReaderRegistry::with_defaults(), SyncConfig::default());
    for arg in env::args().skip(1) {
        match arg.strip_prefix('-') {
            Some(path) => ctx.queue.remove(path),
            None => ctx.queue.add(&arg),
        };
    }

    let outcome = synchronize(&index_path, &ctx)?;
    let report = serde_json::json!({
        "outcome": outcome,
        "status": ctx.status.snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
