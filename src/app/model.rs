use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{AiMode, AnalysisMode};
use crate::fetch::FetchOptions;
use crate::formats::AnalysisResult;

pub const MAX_PAGES_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported url scheme {0:?}; expected http or https")]
    UnsupportedScheme(String),
    #[error("max_pages must be between 1 and 100, got {0}")]
    MaxPagesOutOfRange(u32),
    #[error("unknown analysis mode {0:?}; expected lightning, super_fast, fast or standard")]
    UnknownAnalysisMode(String),
    #[error("unknown ai mode {0:?}; expected lightweight or full")]
    UnknownAiMode(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap_url: Option<String>,

    #[serde(default)]
    pub analyze_headings: bool,
    #[serde(default)]
    pub analyze_extra_tags: bool,
    #[serde(default = "AnalysisRequest::default_follow_links")]
    pub follow_links: bool,
    #[serde(default)]
    pub run_llm_analysis: bool,

    #[serde(default)]
    pub analysis_mode: AnalysisMode,
    #[serde(default)]
    pub ai_mode: AiMode,
    #[serde(default = "AnalysisRequest::default_max_pages")]
    pub max_pages: u32,
}

impl AnalysisRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sitemap_url: None,
            analyze_headings: false,
            analyze_extra_tags: false,
            follow_links: Self::default_follow_links(),
            run_llm_analysis: false,
            analysis_mode: AnalysisMode::default(),
            ai_mode: AiMode::default(),
            max_pages: Self::default_max_pages(),
        }
    }

    pub fn default_follow_links() -> bool {
        true
    }

    pub fn default_max_pages() -> u32 {
        20
    }

    /// Rejects out-of-range values instead of clamping them.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.target_url()?;
        self.sitemap()?;
        if !(1..=MAX_PAGES_LIMIT).contains(&self.max_pages) {
            return Err(ValidationError::MaxPagesOutOfRange(self.max_pages));
        }
        Ok(())
    }

    pub fn target_url(&self) -> Result<Url, ValidationError> {
        parse_http_url(&self.url)
    }

    pub fn sitemap(&self) -> Result<Option<Url>, ValidationError> {
        self.sitemap_url
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(parse_http_url)
            .transpose()
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            analyze_headings: self.analyze_headings,
            analyze_extra_tags: self.analyze_extra_tags,
        }
    }
}

fn parse_http_url(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw.trim()).map_err(|err| ValidationError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ValidationError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u32,
    pub message: String,
    pub request: AnalysisRequest,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(request: AnalysisRequest, now: DateTime<Utc>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            progress: 0,
            message: "queued".to_string(),
            request,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.guard(&[TaskStatus::Pending], TaskStatus::Running)?;
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.message = "starting".to_string();
        Ok(())
    }

    /// Progress only moves forward; a lower value keeps the current one.
    pub fn set_progress(&mut self, percent: u32, message: &str) -> Result<(), InvalidTransition> {
        self.guard(&[TaskStatus::Running], TaskStatus::Running)?;
        self.progress = self.progress.max(percent.min(100));
        self.message = message.to_string();
        Ok(())
    }

    pub fn complete(
        &mut self,
        result: AnalysisResult,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.guard(&[TaskStatus::Running], TaskStatus::Completed)?;
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.message = "analysis complete".to_string();
        self.result = Some(result);
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn fail(
        &mut self,
        message: &str,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.guard(
            &[TaskStatus::Pending, TaskStatus::Running],
            TaskStatus::Failed,
        )?;
        self.status = TaskStatus::Failed;
        self.message = message.to_string();
        self.error = Some(error);
        self.result = None;
        self.finished_at = Some(now);
        Ok(())
    }

    fn guard(&self, allowed: &[TaskStatus], to: TaskStatus) -> Result<(), InvalidTransition> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}
