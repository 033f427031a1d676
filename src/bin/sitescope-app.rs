use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use sitescope::app::manager::{ManagerOptions, TaskManager};
use sitescope::app::task_store::{LocalFsTaskStore, TaskStore};
use sitescope::config::Settings;
use sitescope::fetch::HttpPageFetcher;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Overrides SITESCOPE_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Pipelines allowed to run at once; overrides SITESCOPE_MAX_CONCURRENT_TASKS.
    #[arg(long)]
    max_concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    sitescope::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting sitescope-app");

    let mut settings = Settings::from_env();
    if let Some(data_dir) = args.data_dir {
        settings.data_dir = data_dir;
    }
    if let Some(max_concurrency) = args.max_concurrency {
        settings.max_concurrent_tasks = max_concurrency.max(1);
    }

    let store: Arc<dyn TaskStore> = Arc::new(LocalFsTaskStore::new(&settings.data_dir));
    let fetcher = HttpPageFetcher::new(settings.fetch_attempt_timeout, settings.fetch_retries)
        .context("build page fetcher")?;
    let llm = sitescope::llm::client_from_settings(settings.openai.as_ref())?;

    let manager = TaskManager::start(
        ManagerOptions::from(&settings),
        store,
        Arc::new(fetcher),
        llm,
    )
    .await;
    manager.spawn_sweeper(settings.sweep_interval);
    tracing::info!(
        data_dir = %settings.data_dir.display(),
        max_concurrent_tasks = settings.max_concurrent_tasks,
        retention_secs = settings.retention.as_secs(),
        "task manager ready"
    );

    let app = sitescope::app::api::router(Arc::clone(&manager));

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
