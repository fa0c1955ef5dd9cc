use crate::config::GatewayConfig;
use crate::gateway::{Gateway, GatewayLimits};
use crate::metrics::GatewayMetrics;
use crate::server;
use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub admin_listen: String,
}

/// Gateway lifecycle: init tracing/metrics → load config → build the gateway
/// singleton → serve the admin endpoint until a shutdown signal arrives.
/// Dropping the returned `Gateway` (when `run` returns) tears down the
/// reactor thread.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();
    let metrics = GatewayMetrics::install();

    let config = GatewayConfig::load(&args.config_path)?;
    let gateway = Gateway::make(GatewayLimits {
        max_in_flight_count: config.max_in_flight_count,
        max_simultaneous_bytes: config.max_simultaneous_downloads_size,
    });

    tracing::info!(
        admin_listen = %args.admin_listen,
        max_in_flight_count = config.max_in_flight_count,
        max_simultaneous_downloads_size = config.max_simultaneous_downloads_size,
        "gateway: starting"
    );

    let admin = tokio::spawn({
        let listen = args.admin_listen.clone();
        let metrics = metrics.clone();
        async move { server::run_admin_server(&listen, metrics).await }
    });

    wait_for_shutdown_signal().await;
    tracing::info!("gateway: shutdown signal received");

    admin.abort();
    drop(gateway);

    tracing::info!("gateway: shutdown complete");
    Ok(())
}

fn init_tracing() {
    let (non_blocking, _guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    std::mem::forget(_guard);
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
