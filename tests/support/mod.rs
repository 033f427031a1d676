#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sitescope::fetch::{FetchError, FetchOptions, PageFetcher};
use sitescope::formats::Page;
use sitescope::llm::{LlmClient, LlmError, LlmRequest};
use url::Url;

/// Serves pages from memory. Unknown URLs answer like a 404.
#[derive(Default)]
pub struct StubSite {
    pages: HashMap<String, Page>,
    sitemap: Vec<Url>,
    pub fetches: AtomicUsize,
}

impl StubSite {
    pub fn page(mut self, url: &str, title: &str, text: &str, links: &[&str]) -> Self {
        let page = Page {
            url: url.to_string(),
            title: title.to_string(),
            internal_links: links.iter().map(|l| l.to_string()).collect(),
            word_count: text.split_whitespace().count(),
            content_hash: sitescope::fetch::content_hash(text),
            body_text: text.to_string(),
            ..Page::default()
        };
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn sitemap(mut self, urls: &[&str]) -> Self {
        self.sitemap = urls.iter().filter_map(|u| Url::parse(u).ok()).collect();
        self
    }

    /// A seed page linking to `count` subpages, each with distinct text.
    pub fn wide(count: usize) -> Self {
        let links: Vec<String> = (0..count)
            .map(|i| format!("https://example.com/p{i}"))
            .collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let mut site = Self::default().page(
            "https://example.com/",
            "Example widgets",
            "widgets for every workshop",
            &refs,
        );
        for (i, link) in links.iter().enumerate() {
            site = site.page(link, &format!("Page {i}"), &format!("page {i} text"), &[]);
        }
        site
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StubSite {
    async fn fetch(&self, url: &Url, _options: FetchOptions) -> Result<Page, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Unreachable("HTTP 404".to_string()))
    }

    async fn sitemap_urls(&self, _sitemap: &Url) -> Result<Vec<Url>, FetchError> {
        Ok(self.sitemap.clone())
    }
}

/// Answers every branch with a well-formed payload, except the branches
/// told to hang.
#[derive(Default)]
pub struct CountingLlm {
    hanging: HashSet<&'static str>,
    calls: AtomicUsize,
    branches: Mutex<Vec<&'static str>>,
}

impl CountingLlm {
    pub fn hanging_on(branch: &'static str) -> Self {
        let mut llm = Self::default();
        llm.hanging.insert(branch);
        llm
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn branches(&self) -> Vec<&'static str> {
        self.branches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmClient for CountingLlm {
    async fn run(&self, request: LlmRequest) -> Result<serde_json::Value, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.branches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.branch);

        if self.hanging.contains(request.branch) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Err(LlmError::Timeout);
        }

        Ok(reply_for(request.branch))
    }
}

pub fn reply_for(branch: &str) -> serde_json::Value {
    match branch {
        "entity" => serde_json::json!({
            "entity_assessment": "clear brand entity",
            "knowledge_panel_readiness": 70,
            "key_improvements": ["add organization schema"],
        }),
        "credibility" => serde_json::json!({
            "credibility_assessment": "credible",
            "neeat_scores": { "expertise": 80, "trust": 60 },
            "trust_signals": ["contact page"],
        }),
        "conversation" => serde_json::json!({
            "conversation_readiness": "good",
            "query_patterns": ["best widgets"],
            "engagement_score": 65,
            "gaps": ["faq"],
        }),
        "platform" => serde_json::json!({
            "platform_coverage": { "search": "present" },
            "visibility_scores": { "search": 75 },
            "optimization_opportunities": ["video"],
        }),
        _ => serde_json::json!({
            "strategic_recommendations": ["publish guides"],
            "quick_wins": ["fix titles"],
            "long_term_strategy": ["topical authority"],
            "priority_matrix": {},
        }),
    }
}
