use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memories::{
    config::{Config, Settings},
    console,
    repositories::layout::BlobLayout,
    routes,
    state::AppState,
};

/// How long in-flight requests get after a shutdown request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Args {
    root: Option<PathBuf>,
    verbosity: Option<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--root" => {
                    parsed.root = Some(args.next().context("--root needs a directory")?.into());
                }
                "--verbosity" => {
                    parsed.verbosity = Some(args.next().context("--verbosity needs a directive")?);
                }
                other => anyhow::bail!("Unknown argument: {}", other),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse(std::env::args().skip(1))?;

    let directive = args
        .verbosity
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(directive))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root = args
        .root
        .or_else(|| std::env::var("MEMORIES_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let layout = BlobLayout::new(root);

    let mut settings = Settings::load_or_create(&layout.settings_path())?;
    if settings.get("version").is_none_or(str::is_empty) {
        settings.set("version", env!("CARGO_PKG_VERSION"));
        settings.save(&layout.settings_path())?;
    }
    let config = Config::from_settings(&settings)?;
    tracing::info!("✅ Configuration loaded successfully");

    let addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.http_host, config.http_port))?;
    let console_enabled = config.enable_console_commands;

    let (state, _worker) = AppState::new(config, layout)
        .await
        .context("loading the data root")?;
    tracing::info!("✅ AppState initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if console_enabled {
        tokio::spawn(console::run(state.clone(), shutdown_tx.clone()));
    }

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received");
                let _ = ctrl_c_tx.send(true);
            }
            Err(e) => tracing::error!("❌ Failed to listen for ctrl-c: {}", e),
        }
    });

    let app = routes::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let mut server_rx = shutdown_rx.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    let mut main_rx = shutdown_rx;
    let clean = tokio::select! {
        outcome = &mut server => report_server_exit(outcome),
        _ = main_rx.wait_for(|stop| *stop) => {
            tracing::info!("🛑 Shutting down, waiting up to {:?} for requests", SHUTDOWN_GRACE);
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(outcome) => report_server_exit(outcome),
                Err(_) => {
                    tracing::warn!("In-flight requests did not finish in time");
                    server.abort();
                    true
                }
            }
        }
    };

    state.serialize().await.context("serializing catalogs")?;
    if !clean {
        anyhow::bail!("server stopped with an error; catalogs were saved");
    }
    tracing::info!("✅ Shutdown complete");
    Ok(())
}

/// Logs how the server task ended. False when it failed.
fn report_server_exit(outcome: Result<std::io::Result<()>, tokio::task::JoinError>) -> bool {
    match outcome {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!("❌ Server error: {}", e);
            false
        }
        Err(e) => {
            tracing::error!("❌ Server task failed: {}", e);
            false
        }
    }
}
