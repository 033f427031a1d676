use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::model::ValidationError;

/// Crawl depth/speed trade-off selected per request.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Lightning,
    #[value(name = "super_fast", alias = "super-fast")]
    SuperFast,
    #[default]
    Fast,
    #[serde(alias = "full")]
    #[value(alias = "full")]
    Standard,
}

impl AnalysisMode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lightning" => Ok(Self::Lightning),
            "super_fast" | "super-fast" => Ok(Self::SuperFast),
            "fast" => Ok(Self::Fast),
            "standard" | "full" => Ok(Self::Standard),
            other => Err(ValidationError::UnknownAnalysisMode(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lightning => "lightning",
            Self::SuperFast => "super_fast",
            Self::Fast => "fast",
            Self::Standard => "standard",
        }
    }

    /// The one place mode-dependent limits are defined. Both the crawl and the
    /// enhancement coordinators read from here.
    pub fn profile(self) -> ModeProfile {
        match self {
            Self::Lightning => ModeProfile {
                page_concurrency: 2,
                crawl_timeout: Duration::from_secs(15),
                fetch_timeout: Duration::from_secs(10),
                body_keywords: false,
                digest_sample_pages: 1,
                digest_top_keywords: 5,
            },
            Self::SuperFast => ModeProfile {
                page_concurrency: 5,
                crawl_timeout: Duration::from_secs(30),
                fetch_timeout: Duration::from_secs(10),
                body_keywords: false,
                digest_sample_pages: 2,
                digest_top_keywords: 5,
            },
            Self::Fast => ModeProfile {
                page_concurrency: 10,
                crawl_timeout: Duration::from_secs(60),
                fetch_timeout: Duration::from_secs(10),
                body_keywords: false,
                digest_sample_pages: 2,
                digest_top_keywords: 5,
            },
            Self::Standard => ModeProfile {
                page_concurrency: 12,
                crawl_timeout: Duration::from_secs(120),
                fetch_timeout: Duration::from_secs(10),
                body_keywords: true,
                digest_sample_pages: 3,
                digest_top_keywords: 10,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    /// Admission gate size for page fetches after the seed.
    pub page_concurrency: usize,
    /// Deadline for the whole candidate fan-out.
    pub crawl_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Count body text (not only titles) towards the keyword table.
    pub body_keywords: bool,
    pub digest_sample_pages: usize,
    pub digest_top_keywords: usize,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum AiMode {
    #[default]
    Lightweight,
    Full,
}

impl AiMode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lightweight" => Ok(Self::Lightweight),
            "full" => Ok(Self::Full),
            other => Err(ValidationError::UnknownAiMode(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lightweight => "lightweight",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnhanceConfig {
    pub branch_timeout: Duration,
    pub synthesis_timeout: Duration,
    /// Hard ceiling over the four branches plus synthesis.
    pub stage_timeout: Duration,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl EnhanceConfig {
    pub fn for_mode(mode: AiMode) -> Self {
        match mode {
            AiMode::Lightweight => Self {
                branch_timeout: Duration::from_secs(15),
                synthesis_timeout: Duration::from_secs(30),
                stage_timeout: Duration::from_secs(60),
                max_output_tokens: 1000,
                temperature: 0.3,
            },
            AiMode::Full => Self {
                branch_timeout: Duration::from_secs(20),
                synthesis_timeout: Duration::from_secs(30),
                stage_timeout: Duration::from_secs(60),
                max_output_tokens: 2048,
                temperature: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub max_concurrent_tasks: usize,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub fetch_retries: u32,
    pub fetch_attempt_timeout: Duration,
    pub cache_capacity: usize,
    pub openai: Option<OpenAiSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("workspace-app"),
            max_concurrent_tasks: 4,
            retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            fetch_retries: 1,
            fetch_attempt_timeout: Duration::from_secs(5),
            cache_capacity: 20,
            openai: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = env_string("SITESCOPE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let max_concurrent_tasks = env_parse::<usize>("SITESCOPE_MAX_CONCURRENT_TASKS")
            .filter(|v| *v >= 1)
            .unwrap_or(defaults.max_concurrent_tasks);
        let retention = env_parse::<u64>("SITESCOPE_TASK_RETENTION_SECS")
            .filter(|v| *v >= 1)
            .map(Duration::from_secs)
            .unwrap_or(defaults.retention);
        let sweep_interval = env_parse::<u64>("SITESCOPE_SWEEP_INTERVAL_SECS")
            .filter(|v| *v >= 1)
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);
        let fetch_retries =
            env_parse::<u32>("SITESCOPE_FETCH_RETRIES").unwrap_or(defaults.fetch_retries);

        let openai = env_string("OPENAI_API_KEY").map(|api_key| OpenAiSettings {
            api_key,
            base_url: env_string("SITESCOPE_OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: env_string("SITESCOPE_OPENAI_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        });

        Self {
            data_dir,
            max_concurrent_tasks,
            retention,
            sweep_interval,
            fetch_retries,
            fetch_attempt_timeout: defaults.fetch_attempt_timeout,
            cache_capacity: defaults.cache_capacity,
            openai,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse::<T>().ok())
}
