use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use crate::app::manager::{ManagerOptions, TaskManager};
use crate::app::model::{AnalysisRequest, TaskStatus};
use crate::app::task_store::{LocalFsTaskStore, NoopTaskStore, TaskStore};
use crate::config::{AiMode, AnalysisMode, Settings};
use crate::fetch::HttpPageFetcher;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl a site, aggregate keywords and optionally run AI enhancement.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Site to analyze (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Sitemap whose URLs are crawled ahead of discovered links.
    #[arg(long)]
    pub sitemap_url: Option<String>,

    #[arg(long, value_enum, default_value_t = AnalysisMode::Fast)]
    pub mode: AnalysisMode,

    #[arg(long, value_enum, default_value_t = AiMode::Lightweight)]
    pub ai_mode: AiMode,

    /// Page budget including the seed page (1-100).
    #[arg(long, default_value_t = 20)]
    pub max_pages: u32,

    /// Run the AI enhancement stage.
    #[arg(long)]
    pub llm: bool,

    /// Collect h1-h3 headings.
    #[arg(long)]
    pub headings: bool,

    /// Collect og:/twitter:/robots/canonical tags.
    #[arg(long)]
    pub extra_tags: bool,

    /// Do not follow links found on the seed page.
    #[arg(long)]
    pub no_follow_links: bool,

    /// Persist task snapshots under this directory.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Write the result JSON here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl AnalyzeArgs {
    pub fn to_request(&self) -> AnalysisRequest {
        AnalysisRequest {
            url: self.url.clone(),
            sitemap_url: self.sitemap_url.clone(),
            analyze_headings: self.headings,
            analyze_extra_tags: self.extra_tags,
            follow_links: !self.no_follow_links,
            run_llm_analysis: self.llm,
            analysis_mode: self.mode,
            ai_mode: self.ai_mode,
            max_pages: self.max_pages,
        }
    }
}

pub async fn analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let settings = Settings::from_env();

    let store: Arc<dyn TaskStore> = match &args.data_dir {
        Some(dir) => Arc::new(LocalFsTaskStore::new(dir)),
        None => Arc::new(NoopTaskStore),
    };
    let fetcher = HttpPageFetcher::new(settings.fetch_attempt_timeout, settings.fetch_retries)
        .context("build page fetcher")?;
    let llm = crate::llm::client_from_settings(settings.openai.as_ref())?;

    let manager = TaskManager::start(
        ManagerOptions::from(&settings),
        store,
        Arc::new(fetcher),
        llm,
    )
    .await;

    let task_id = manager
        .create(args.to_request())
        .await
        .context("invalid analysis request")?;
    manager.join(&task_id).await;

    let task = manager
        .get_status(&task_id)
        .ok_or_else(|| anyhow::anyhow!("task disappeared: {task_id}"))?;
    match task.status {
        TaskStatus::Completed => {
            let result = task
                .result
                .ok_or_else(|| anyhow::anyhow!("completed task has no result: {task_id}"))?;
            let json = serde_json::to_string_pretty(&result).context("serialize result")?;
            write_output(args.out.as_deref(), &json)?;
            Ok(())
        }
        TaskStatus::Failed => anyhow::bail!(
            "analysis failed: {}",
            task.error.unwrap_or_else(|| task.message.clone())
        ),
        status => anyhow::bail!("task ended in unexpected state: {status}"),
    }
}

fn write_output(out: Option<&std::path::Path>, json: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir: {}", parent.display()))?;
            }
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("write output: {}", path.display()))?;
        }
        None => println!("{json}"),
    }
    Ok(())
}
