mod config;
mod watch;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use config::{config_path_from_env, load_or_create_config, resolve_path};
use library::{Indexer, SyncSnapshot};
use metadata::ReaderRegistry;
use tracing::{debug, info, warn};
use watch::start_watcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let library_root = resolve_path(&config_path, &config.library_root);
    std::fs::create_dir_all(&library_root)?;
    let db_path = resolve_path(&config_path, &config.database_path);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let registry = ReaderRegistry::with_defaults();
    let indexer = Arc::new(Indexer::startup(
        &library_root,
        &db_path,
        registry,
        config.sync.clone(),
    )?);

    let last_phase = AtomicI32::new(0);
    indexer.subscribe(Arc::new(move |snapshot: &SyncSnapshot| {
        if last_phase.swap(snapshot.code, Ordering::Relaxed) != snapshot.code {
            debug!("sync phase {:?}", snapshot.status);
        }
    }));

    let roots: Vec<_> = config
        .paths
        .iter()
        .map(|path| resolve_path(&config_path, path))
        .collect();
    for root in &roots {
        indexer.add_path(&root.to_string_lossy());
    }
    if roots.is_empty() {
        info!("No library paths configured; add some under `paths` in {:?}", config_path);
    }

    let watcher = if config.watch_paths && !roots.is_empty() {
        start_watcher(
            Arc::clone(&indexer),
            &roots,
            vec![library_root.clone(), db_path.clone()],
            Duration::from_secs(config.watch_debounce_secs),
        )
    } else {
        info!("Watcher disabled");
        None
    };

    if config.status_interval_secs > 0 {
        let reporter = Arc::clone(&indexer);
        let every = Duration::from_secs(config.status_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let snapshot = reporter.snapshot();
                if snapshot.code != 0 {
                    info!(
                        "{} ({} of {} files, {} saved)",
                        snapshot.text,
                        snapshot.files_processed,
                        snapshot.files_discovered,
                        snapshot.files_saved
                    );
                }
            }
        });
    }

    shutdown_signal().await;
    drop(watcher);

    let stopping = Arc::clone(&indexer);
    if let Err(err) = tokio::task::spawn_blocking(move || stopping.shutdown()).await {
        warn!("Indexer shutdown join error: {}", err);
    }
    match indexer.paths() {
        Ok(paths) => info!("Indexed paths at exit: {:?}", paths),
        Err(err) => warn!("Can't read indexed paths: {}", err),
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
