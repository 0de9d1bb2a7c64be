//! herakles-mem-health binary: HTTP server around the memory-health monitor
//! plus maintenance subcommands.

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use herakles_mem_health::{
    collector::collector_from_config,
    config::{load_config, validate_effective_config, DEFAULT_BIND_ADDR, DEFAULT_PORT},
    Config, MemoryMonitor, ReplaySampler,
};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, level_filters::LevelFilter, warn};

mod cli;
mod commands;
mod handlers;
mod metrics;
mod state;

use cli::{Args, Commands, ConfigFormat, LogLevel};
use handlers::{
    cleanup_handler, config_handler, doc_handler, gc_handler, health_handler, metrics_handler,
    snapshot_handler, status_handler,
};
use metrics::HealthMetrics;
use state::{AppState, SharedState};

/// Loads the config file (unless disabled) and applies CLI overrides.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(interval) = args.interval {
        config.interval_secs = Some(interval);
    }
    if let Some(level) = args.log_level {
        config.log_level = Some(log_level_name(level).to_string());
    }
    if args.enable_snapshots {
        config.enable_heap_snapshots = Some(true);
    }
    if args.disable_admin {
        config.enable_admin = Some(false);
    }

    Ok(config)
}

fn log_level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Off => "off",
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// Shows configuration in requested format
fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    println!("{}", commands::render(config, format)?);
    Ok(())
}

fn setup_logging(config: &Config) {
    let requested = config.log_level.as_deref().unwrap_or("info");
    let level = requested.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {}", level);
}

/// Builds the monitor, replaying `--test-data-file` when given.
fn build_monitor(config: &Config, args: &Args) -> anyhow::Result<MemoryMonitor> {
    match &args.test_data_file {
        Some(path) => {
            let data = commands::load_test_data_from_file(path)?;
            info!(
                "Replaying {} samples from {}",
                data.samples.len(),
                path.display()
            );
            Ok(MemoryMonitor::new(
                config.monitor_settings(),
                Arc::new(ReplaySampler::new(data.samples)),
                collector_from_config(config.collector.as_deref()),
            ))
        }
        None => Ok(MemoryMonitor::from_config(config)?),
    }
}

/// Routes enabled by the configuration.
fn build_router(state: SharedState) -> Router {
    let config = state.config.clone();
    let mut app = Router::new()
        .route("/config", get(config_handler))
        .route("/doc", get(doc_handler));

    if config.enable_health.unwrap_or(true) {
        app = app
            .route("/health", get(health_handler))
            .route("/status", get(status_handler));
    }
    if config.enable_telemetry.unwrap_or(true) {
        app = app.route("/metrics", get(metrics_handler));
    }
    if config.enable_admin.unwrap_or(true) {
        debug!("Admin endpoints enabled at /admin");
        app = app
            .route("/admin/gc", post(gc_handler))
            .route("/admin/cleanup", post(cleanup_handler))
            .route("/admin/snapshot", post(snapshot_handler));
    }

    app.with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    let config = resolve_config(&args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    if let Some(command) = &args.command {
        return match command {
            Commands::Check => {
                if !commands::command_check(&config) {
                    std::process::exit(1);
                }
                Ok(())
            }
            Commands::Config {
                output,
                format,
                commented,
            } => commands::command_config(output.clone(), *format, *commented),
            Commands::Sample {
                count,
                delay_ms,
                format,
            } => {
                let monitor = build_monitor(&config, &args)?;
                commands::command_sample(&monitor, *count, Duration::from_millis(*delay_ms), *format)
            }
            Commands::GenerateTestdata {
                output,
                samples,
                heap_total_mb,
                start_percent,
                growth_percent,
                jitter_percent,
                step_secs,
            } => commands::command_generate_testdata(
                output.clone(),
                commands::SeriesParams {
                    samples: *samples,
                    heap_total: heap_total_mb.saturating_mul(1024 * 1024),
                    start_percent: *start_percent,
                    growth_percent: *growth_percent,
                    jitter_percent: *jitter_percent,
                    step_secs: i64::from(*step_secs),
                },
            ),
        };
    }

    setup_logging(&config);
    info!("Starting herakles-mem-health");

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let monitor = build_monitor(&config, &args)?;
    let monitor = MemoryMonitor::install_global(monitor)?.clone();
    monitor.start()?;

    let registry = Registry::new();
    let metrics = HealthMetrics::new(&registry).context("Failed to register metrics")?;
    debug!("Prometheus registry initialized");

    let state = Arc::new(AppState {
        monitor: monitor.clone(),
        registry,
        metrics,
        config: Arc::new(config.clone()),
    });

    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", bind_ip_str, port))?;
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("herakles-mem-health listening on http://{}:{}", bind_ip_str, port);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    monitor.stop();
    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }
    if monitor.is_running() {
        warn!("Memory monitor still running after stop");
    }

    info!("herakles-mem-health stopped gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["herakles-mem-health", "--no-config"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = resolve_config(&args(&[
            "--port",
            "9300",
            "--bind",
            "127.0.0.1",
            "--interval",
            "5",
            "--log-level",
            "debug",
            "--enable-snapshots",
            "--disable-admin",
        ]))
        .unwrap();
        assert_eq!(config.port, Some(9300));
        assert_eq!(config.bind.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.interval_secs, Some(5));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.enable_heap_snapshots, Some(true));
        assert_eq!(config.enable_admin, Some(false));
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = resolve_config(&args(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_file_then_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem.yaml");
        std::fs::write(&path, "port: 9400\ninterval_secs: 10\n").unwrap();

        let argv = vec![
            "herakles-mem-health",
            "-c",
            path.to_str().unwrap(),
            "--interval",
            "3",
        ];
        let config = resolve_config(&Args::parse_from(argv)).unwrap();
        assert_eq!(config.port, Some(9400));
        assert_eq!(config.interval_secs, Some(3));
    }

    #[test]
    fn test_subcommands_parse() {
        let parsed = Args::parse_from(["herakles-mem-health", "sample", "-n", "2"]);
        assert!(matches!(
            parsed.command,
            Some(Commands::Sample { count: 2, .. })
        ));
        let parsed = Args::parse_from([
            "herakles-mem-health",
            "generate-testdata",
            "--growth-percent",
            "5",
        ]);
        assert!(matches!(
            parsed.command,
            Some(Commands::GenerateTestdata { .. })
        ));
    }

    #[test]
    fn test_build_monitor_replays_test_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        commands::command_generate_testdata(
            path.clone(),
            commands::SeriesParams {
                samples: 4,
                heap_total: 1 << 30,
                start_percent: 85.0,
                growth_percent: 0.0,
                jitter_percent: 0.0,
                step_secs: 60,
            },
        )
        .unwrap();

        let args = args(&["-t", path.to_str().unwrap()]);
        let config = resolve_config(&args).unwrap();
        let monitor = build_monitor(&config, &args).unwrap();
        monitor.tick();
        assert_eq!(monitor.report().status, herakles_mem_health::HealthTier::Warning);
    }
}
