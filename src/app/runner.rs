use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;

use crate::app::task_table::TaskTable;
use crate::crawl::CrawlCoordinator;
use crate::enhance::EnhancementCoordinator;

/// Executes one task's pipeline: crawl, then optional enhancement. Every
/// stage boundary is written back through the task table.
pub struct PipelineRunner {
    table: Arc<TaskTable>,
    crawler: CrawlCoordinator,
    enhancer: Arc<EnhancementCoordinator>,
}

impl PipelineRunner {
    pub fn new(
        table: Arc<TaskTable>,
        crawler: CrawlCoordinator,
        enhancer: Arc<EnhancementCoordinator>,
    ) -> Self {
        Self {
            table,
            crawler,
            enhancer,
        }
    }

    pub async fn run_task(&self, task_id: &str) {
        if let Err(err) = self.try_run_task(task_id).await {
            tracing::error!(task_id, ?err, "task failed");
            let error = format!("{err:#}");
            if let Err(err) = self
                .table
                .update(task_id, |task| task.fail("analysis failed", error, Utc::now()))
                .await
            {
                tracing::warn!(task_id, ?err, "could not record task failure");
            }
        }
    }

    async fn try_run_task(&self, task_id: &str) -> anyhow::Result<()> {
        let task = self
            .table
            .update(task_id, |task| task.mark_running(Utc::now()))
            .await
            .context("mark running")?;
        let request = task.request;
        tracing::info!(
            task_id,
            url = %request.url,
            mode = request.analysis_mode.as_str(),
            "task started"
        );

        self.update_progress(task_id, 10, "crawling site").await?;
        let mut result = self.crawler.crawl(&request).await.context("crawl")?;
        self.update_progress(
            task_id,
            70,
            &format!("crawled {} pages", result.pages.len()),
        )
        .await?;

        if request.run_llm_analysis {
            self.update_progress(task_id, 80, "running AI enhancement")
                .await?;
            let enhanced = self.enhancer.enhance(&result, request.ai_mode).await;
            result.ai_enhanced = enhanced.analyses_computed();
            result.ai_analysis = Some(enhanced);
        }

        self.update_progress(task_id, 90, "finalizing results").await?;
        let pages = result.pages.len();
        let ai_enhanced = result.ai_enhanced;
        self.table
            .update(task_id, |task| task.complete(result, Utc::now()))
            .await
            .context("mark completed")?;

        tracing::info!(task_id, pages, ai_enhanced, "task completed");
        Ok(())
    }

    async fn update_progress(
        &self,
        task_id: &str,
        percent: u32,
        message: &str,
    ) -> anyhow::Result<()> {
        self.table
            .update(task_id, |task| task.set_progress(percent, message))
            .await
            .context("save progress")?;
        Ok(())
    }
}

