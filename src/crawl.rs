use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use url::Url;

use crate::app::model::{AnalysisRequest, ValidationError};
use crate::config::ModeProfile;
use crate::fetch::{FetchError, FetchOptions, PageFetcher};
use crate::formats::{
    AnalysisResult, CrawlFailure, DuplicateGroup, LinkCount, LinkSummary, Page, PerformanceMetrics,
};
use crate::keywords;

/// Probed when the seed page links to too few same-site pages.
const CONVENTIONAL_PATHS: &[&str] = &["/about", "/contact", "/services", "/products", "/blog"];
const MOST_LINKED_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    InvalidRequest(#[from] ValidationError),
    #[error("site unreachable: {url}")]
    SiteUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },
}

#[derive(Clone)]
pub struct CrawlCoordinator {
    fetcher: Arc<dyn PageFetcher>,
}

impl CrawlCoordinator {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn crawl(&self, request: &AnalysisRequest) -> Result<AnalysisResult, CrawlError> {
        let started_at = Instant::now();
        let profile = request.analysis_mode.profile();
        let options = request.fetch_options();
        let seed_url = request.target_url()?;

        let seed = fetch_bounded(self.fetcher.as_ref(), &seed_url, options, profile.fetch_timeout)
            .await
            .map_err(|source| CrawlError::SiteUnreachable {
                url: seed_url.to_string(),
                source,
            })?;
        tracing::info!(url = %seed_url, "seed page fetched");

        let candidates = self
            .discover_candidates(request, &seed_url, &seed, &profile)
            .await?;
        tracing::debug!(count = candidates.len(), ?candidates, "crawl candidates");

        let deadline = started_at + profile.crawl_timeout;
        let (fetched, errors) = self
            .fetch_candidates(candidates, options, &profile, deadline)
            .await;

        let mut pages = Vec::with_capacity(fetched.len() + 1);
        pages.push(seed);
        pages.extend(fetched);

        let keywords = keywords::aggregate(&pages, profile.body_keywords);
        for page in &mut pages {
            page.body_text = String::new();
        }

        let duplicate_pages = duplicate_groups(&pages);
        let internal_links = link_summary(&pages);

        let elapsed = started_at.elapsed().as_secs_f64();
        let pages_per_second = (elapsed > 0.0).then(|| pages.len() as f64 / elapsed);

        tracing::info!(
            url = %seed_url,
            pages = pages.len(),
            failed = errors.len(),
            elapsed_ms = (elapsed * 1000.0) as u64,
            "crawl finished"
        );

        Ok(AnalysisResult {
            analyzed_url: seed_url.to_string(),
            analysis_mode: request.analysis_mode,
            pages,
            duplicate_pages,
            keywords,
            internal_links,
            errors,
            total_time_secs: elapsed,
            performance: PerformanceMetrics {
                concurrency: profile.page_concurrency,
                pages_per_second,
            },
            ai_analysis: None,
            ai_enhanced: false,
        })
    }

    async fn discover_candidates(
        &self,
        request: &AnalysisRequest,
        seed_url: &Url,
        seed: &Page,
        profile: &ModeProfile,
    ) -> Result<Vec<Url>, CrawlError> {
        let cap = request.max_pages.saturating_sub(1) as usize;
        // A redirected seed (apex to www, http to https) defines the site.
        let site_url = Url::parse(&seed.final_url).unwrap_or_else(|_| seed_url.clone());
        let mut candidates = CandidateSet::new(&site_url, cap);
        candidates.exclude(seed_url);
        if candidates.is_full() {
            return Ok(Vec::new());
        }

        if let Some(sitemap) = request.sitemap()? {
            let listed = tokio::time::timeout(
                profile.fetch_timeout,
                self.fetcher.sitemap_urls(&sitemap),
            )
            .await
            .unwrap_or(Err(FetchError::Timeout));
            match listed {
                Ok(urls) => {
                    for url in urls {
                        candidates.offer(url);
                    }
                }
                Err(err) => {
                    tracing::warn!(sitemap = %sitemap, error = %err, "sitemap unavailable");
                }
            }
        }

        if request.follow_links {
            for link in &seed.internal_links {
                if let Ok(url) = Url::parse(link) {
                    candidates.offer(url);
                }
            }
            for path in CONVENTIONAL_PATHS {
                if candidates.is_full() {
                    break;
                }
                if let Ok(url) = site_url.join(path) {
                    candidates.offer(url);
                }
            }
        }

        Ok(candidates.into_urls())
    }

    /// Fetches every candidate with at most `page_concurrency` requests in
    /// flight. Failures are recorded and dropped; whatever is still running at
    /// `deadline` is aborted.
    async fn fetch_candidates(
        &self,
        candidates: Vec<Url>,
        options: FetchOptions,
        profile: &ModeProfile,
        deadline: Instant,
    ) -> (Vec<Page>, Vec<CrawlFailure>) {
        let mut pages = Vec::new();
        let mut errors = Vec::new();
        if candidates.is_empty() {
            return (pages, errors);
        }

        let gate = Arc::new(Semaphore::new(profile.page_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let mut task_urls: HashMap<Id, String> = HashMap::new();
        for url in candidates {
            let task_url = url.to_string();
            let gate = Arc::clone(&gate);
            let fetcher = Arc::clone(&self.fetcher);
            let fetch_timeout = profile.fetch_timeout;
            let handle = join_set.spawn(async move {
                let outcome = match gate.acquire_owned().await {
                    Ok(_permit) => {
                        fetch_bounded(fetcher.as_ref(), &url, options, fetch_timeout).await
                    }
                    Err(_) => Err(FetchError::Unreachable("admission gate closed".to_string())),
                };
                (url, outcome)
            });
            task_urls.insert(handle.id(), task_url);
        }

        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((_, Ok(page))))) => pages.push(page),
                Ok(Some(Ok((url, Err(err))))) => {
                    tracing::warn!(%url, error = %err, "page dropped");
                    errors.push(CrawlFailure {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                }
                Ok(Some(Err(err))) => {
                    let url = task_urls.remove(&err.id()).unwrap_or_default();
                    tracing::warn!(%url, error = %err, "page fetch task failed");
                    errors.push(CrawlFailure {
                        url,
                        message: err.to_string(),
                    });
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        pending = join_set.len(),
                        timeout_secs = profile.crawl_timeout.as_secs(),
                        "crawl deadline reached; dropping unfinished pages"
                    );
                    join_set.abort_all();
                    break;
                }
            }
        }

        (pages, errors)
    }
}

async fn fetch_bounded(
    fetcher: &dyn PageFetcher,
    url: &Url,
    options: FetchOptions,
    timeout: Duration,
) -> Result<Page, FetchError> {
    tokio::time::timeout(timeout, fetcher.fetch(url, options))
        .await
        .unwrap_or(Err(FetchError::Timeout))
}

/// Same-host candidate URLs, deduplicated on their canonical form.
struct CandidateSet {
    host: Option<String>,
    cap: usize,
    seen: HashSet<String>,
    urls: Vec<Url>,
}

impl CandidateSet {
    fn new(seed_url: &Url, cap: usize) -> Self {
        let mut seen = HashSet::new();
        seen.insert(canonical_url(seed_url).to_string());
        Self {
            host: seed_url.host_str().map(str::to_ascii_lowercase),
            cap,
            seen,
            urls: Vec::new(),
        }
    }

    /// Marks `url` as already covered without queueing it.
    fn exclude(&mut self, url: &Url) {
        self.seen.insert(canonical_url(url).to_string());
    }

    fn is_full(&self) -> bool {
        self.urls.len() >= self.cap
    }

    fn offer(&mut self, url: Url) {
        if self.is_full() {
            return;
        }
        if url.scheme() != "http" && url.scheme() != "https" {
            return;
        }
        if url.host_str().map(str::to_ascii_lowercase) != self.host {
            return;
        }
        if self.seen.insert(canonical_url(&url).to_string()) {
            let mut url = url;
            url.set_fragment(None);
            self.urls.push(url);
        }
    }

    fn into_urls(self) -> Vec<Url> {
        self.urls
    }
}

fn canonical_url(url: &Url) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    let mut path = canonical.path().to_owned();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    canonical.set_path(&path);
    canonical
}

fn duplicate_groups(pages: &[Page]) -> Vec<DuplicateGroup> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_hash: HashMap<&str, Vec<String>> = HashMap::new();
    for page in pages {
        let urls = by_hash.entry(page.content_hash.as_str()).or_insert_with(|| {
            order.push(page.content_hash.as_str());
            Vec::new()
        });
        urls.push(page.url.clone());
    }

    order
        .into_iter()
        .filter_map(|hash| {
            let urls = by_hash.remove(hash)?;
            (urls.len() > 1).then(|| DuplicateGroup {
                content_hash: hash.to_string(),
                urls,
            })
        })
        .collect()
}

fn link_summary(pages: &[Page]) -> LinkSummary {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut total = 0usize;
    for link in pages.iter().flat_map(|p| p.internal_links.iter()) {
        total += 1;
        let first_seen = counts.len();
        counts.entry(link.as_str()).or_insert((0, first_seen)).0 += 1;
    }

    let unique = counts.len();
    let mut ranked = counts.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|(_, (ca, fa)), (_, (cb, fb))| cb.cmp(ca).then_with(|| fa.cmp(fb)));

    LinkSummary {
        total_internal_links: total,
        unique_internal_links: unique,
        most_linked: ranked
            .into_iter()
            .take(MOST_LINKED_LIMIT)
            .map(|(url, (count, _))| LinkCount {
                url: url.to_string(),
                count,
            })
            .collect(),
    }
}
