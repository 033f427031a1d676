use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisMode;
use crate::enhance::EnhancementResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Headings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
}

/// One fetched page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    pub headings: Headings,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_tags: BTreeMap<String, String>,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub word_count: usize,
    pub content_hash: String,

    /// Visible text, kept only for the lifetime of the crawl.
    #[serde(skip)]
    pub body_text: String,
    /// Where the fetch landed after redirects; empty when unknown.
    #[serde(skip)]
    pub final_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeywordKind {
    Word,
    Bigram,
    Trigram,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keyword {
    pub term: String,
    pub kind: KeywordKind,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrawlFailure {
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkSummary {
    pub total_internal_links: usize,
    pub unique_internal_links: usize,
    pub most_linked: Vec<LinkCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkCount {
    pub url: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    pub concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_per_second: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub analyzed_url: String,
    pub analysis_mode: AnalysisMode,
    /// Seed page first; the rest in completion order.
    pub pages: Vec<Page>,
    pub duplicate_pages: Vec<DuplicateGroup>,
    pub keywords: Vec<Keyword>,
    pub internal_links: LinkSummary,
    pub errors: Vec<CrawlFailure>,
    pub total_time_secs: f64,
    pub performance: PerformanceMetrics,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<EnhancementResult>,
    #[serde(default)]
    pub ai_enhanced: bool,
}
