use std::net::SocketAddr;

use clap::Parser;
use flowpilot_delegation::AppConfig;
use tracing::info;

/// `--config` is accepted for parity with the other FlowPilot services but
/// this service has nothing to hot-reload, so `--reload` is a no-op flag.
#[derive(Debug, Parser)]
struct Cli {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    reload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let (Some(host), Some(port)) = (&cli.host, cli.port) {
        config.listen_addr = format!("{host}:{port}");
    } else if let Some(host) = &cli.host {
        config.listen_addr = format!("{host}:8081");
    }

    let state = config.build_state()?;
    let app = flowpilot_delegation::build_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    info!(%actual_addr, "starting flowpilot-delegation server");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
