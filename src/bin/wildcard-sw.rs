use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wildcard_worker::event::{EventKind, PERIODIC_SYNC_TAG};
use wildcard_worker::{
    AppConfig, CacheStorage, DiskCacheStorage, HttpNetwork, LoggingClients,
    MemoryCacheStorage, NotificationCenter, ServiceWorker, SyncOutcome,
};

fn print_usage() {
    eprintln!("Usage: wildcard-sw [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <PATH>     Config file (default: <config dir>/wildcard-worker/config.toml)");
    eprintln!("  --host <HOST>       Bind address (default: 127.0.0.1)");
    eprintln!("  --port <PORT>       Bind port (default: 8787)");
    eprintln!("  --origin <URL>      Upstream origin serving the app");
    eprintln!("  --sync-every <SECS> Emit a periodic sync every SECS seconds (0 = off)");
    eprintln!("  --memory            Keep the cache in memory only");
    eprintln!("  -h, --help          Show this help");
}

/// Command-line overrides applied on top of the config file.
#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    origin: Option<String>,
    sync_every: Option<u64>,
    memory: bool,
}

fn parse_args() -> Args {
    fn value(args: &[String], i: usize, flag: &str) -> String {
        args.get(i).cloned().unwrap_or_else(|| {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(1);
        })
    }

    fn number<T: std::str::FromStr>(raw: &str, flag: &str) -> T {
        raw.parse().unwrap_or_else(|_| {
            eprintln!("Error: {flag} expects a number, got {raw:?}");
            std::process::exit(1);
        })
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let mut parsed = Args::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                parsed.config = Some(PathBuf::from(value(&args, i, "--config")));
            }
            "--host" => {
                i += 1;
                parsed.host = Some(value(&args, i, "--host"));
            }
            "--port" => {
                i += 1;
                parsed.port = Some(number(&value(&args, i, "--port"), "--port"));
            }
            "--origin" => {
                i += 1;
                parsed.origin = Some(value(&args, i, "--origin"));
            }
            "--sync-every" => {
                i += 1;
                parsed.sync_every = Some(number(&value(&args, i, "--sync-every"), "--sync-every"));
            }
            "--memory" => parsed.memory = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Error: unknown argument {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }
    parsed
}

/// Cancels `token` on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                        _ = sigterm.recv() => log::info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    log::warn!("Cannot listen for SIGTERM: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    log::info!("Received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Received SIGINT");
        }
        token.cancel();
    });
}

/// Emits a `daily-update` periodic sync every `every` until cancelled.
fn spawn_periodic_sync(worker: ServiceWorker, every: Duration, token: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately; install has just cached the data.
        interval.tick().await;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    if let SyncOutcome::Completed(report) = worker.periodic_sync(PERIODIC_SYNC_TAG).await {
                        log::info!(
                            "Periodic sync refreshed {} (daily notification: {})",
                            report.data_path,
                            report.daily_notification
                        );
                    }
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> wildcard_worker::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_create(&config_path)?;
    log::info!("Loaded config from {}", config_path.display());

    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(origin) = args.origin {
        config.network.origin = origin;
    }
    if let Some(secs) = args.sync_every {
        config.api.periodic_sync_secs = secs;
    }
    if args.memory {
        config.cache.persistent = false;
    }

    let caches: Arc<dyn CacheStorage> = if config.cache.persistent {
        let disk = DiskCacheStorage::new(&config.cache.dir);
        log::info!("Cache directory: {}", disk.root().display());
        Arc::new(disk)
    } else {
        Arc::new(MemoryCacheStorage::new())
    };
    let notifications = Arc::new(NotificationCenter::new());
    let worker = ServiceWorker::new(
        config.worker.clone(),
        caches,
        Arc::new(HttpNetwork::new(&config.network)?),
        notifications.clone(),
        Arc::new(LoggingClients::new()),
    );

    log::info!(
        "Installing: caching {} resources from {}",
        config.worker.precache.len(),
        config.network.origin
    );
    if let Err(e) = worker.install().await {
        log::error!("Install failed, not activating: {e}");
        return Err(e);
    }

    let handled: Vec<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
    log::info!("Activated; handling {}", handled.join(", "));

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());
    if config.api.periodic_sync_secs > 0 {
        spawn_periodic_sync(
            worker.clone(),
            Duration::from_secs(config.api.periodic_sync_secs),
            token.clone(),
        );
    }

    wildcard_worker::api::run_server(&config.api, worker, notifications, token)
        .await
        .inspect_err(|e| log::error!("Server error: {e}"))?;

    log::info!("Shutdown complete");
    Ok(())
}
