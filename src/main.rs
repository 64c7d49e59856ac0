use std::net::SocketAddr;

use axum::extract::Extension;
use axum::routing::get;
use axum::{middleware, Json, Router};
use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::rate_limit_middleware;
use turnstile::ratelimit::RateLimitInfo;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Demo HTTP server guarded by the Turnstile rate limiter.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }

    if args.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    match args.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        max = config.rate_limiting.max,
        reset_interval_ms = config.rate_limiting.reset_interval_ms,
        "Configuration loaded"
    );

    let rate_limit = config.rate_limiting.to_options()?.build()?;

    let app = Router::new()
        .route("/", get(quota))
        .layer(middleware::from_fn_with_state(
            rate_limit.clone(),
            rate_limit_middleware,
        ));

    let listener = TcpListener::bind(config.server.listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    // Serve until Ctrl+C or SIGTERM, then drain in-flight requests
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    rate_limit.shutdown();
    info!("Turnstile stopped");
    Ok(())
}

/// Echo the caller's quota state.
async fn quota(Extension(info): Extension<RateLimitInfo>) -> Json<RateLimitInfo> {
    Json(info)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
