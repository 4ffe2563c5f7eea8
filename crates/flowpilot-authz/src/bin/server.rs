use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use flowpilot_authz::AppConfig;
use flowpilot_policy::ManifestRegistry;
use tracing::info;

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
        config.listen_addr = format!("{host}:8083");
    }

    let state = config.build_state()?;
    if cli.reload {
        spawn_sighup_reload(state.evaluator.clone(), state.manifest_dir.clone());
    }
    let app = flowpilot_authz::build_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    info!(%actual_addr, "starting flowpilot-authz server");
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

/// `--reload`: on `SIGHUP`, reparses the manifest directory and swaps it
/// into the evaluator. A bad directory logs a warning and keeps serving
/// with the previous registry.
#[cfg(unix)]
fn spawn_sighup_reload(evaluator: Arc<flowpilot_authz::Evaluator>, manifest_dir: std::path::PathBuf) {
    tokio::spawn(async move {
        let Ok(mut sighup) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) else {
            tracing::warn!("failed to install SIGHUP handler, --reload is inert");
            return;
        };
        loop {
            sighup.recv().await;
            match ManifestRegistry::load(&manifest_dir) {
                Ok(registry) => {
                    info!(dir = %manifest_dir.display(), "reloaded policy manifests on SIGHUP");
                    evaluator.reload_manifests(Arc::new(registry));
                }
                Err(err) => tracing::warn!(error = %err, "manifest reload on SIGHUP failed, keeping previous registry"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_sighup_reload(_evaluator: Arc<flowpilot_authz::Evaluator>, _manifest_dir: std::path::PathBuf) {}
