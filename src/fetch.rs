use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use sha2::{Digest as _, Sha256};
use url::Url;

use crate::formats::{Headings, Page};
use crate::html::{self, Document};

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const MAX_SUB_SITEMAPS: usize = 5;
const USER_AGENT_VALUE: &str = "sitescope/0.1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("timed out")]
    Timeout,
    #[error("parse failure: {0}")]
    ParseFailure(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub analyze_headings: bool,
    pub analyze_extra_tags: bool,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, options: FetchOptions) -> Result<Page, FetchError>;

    /// Page URLs listed by a sitemap (or by the child sitemaps of an index).
    async fn sitemap_urls(&self, _sitemap: &Url) -> Result<Vec<Url>, FetchError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    retries: u32,
    backoff: Duration,
}

impl HttpPageFetcher {
    pub fn new(attempt_timeout: Duration, retries: u32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(attempt_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("build page fetch http client")?;
        Ok(Self {
            client,
            retries,
            backoff: Duration::from_millis(250),
        })
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn get_text(&self, url: &Url, accept: &str) -> Result<Fetched, Attempt> {
        let resp = self
            .client
            .get(url.clone())
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(Attempt::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Attempt::Status(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        let final_url = resp.url().clone();
        let text = read_text_limited(resp, MAX_BODY_BYTES)
            .await
            .map_err(Attempt::from_reqwest)?;

        Ok(Fetched {
            final_url,
            content_type,
            text,
        })
    }

    async fn get_with_retries(&self, url: &Url, accept: &str) -> Result<Fetched, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.get_text(url, accept).await {
                Ok(fetched) => return Ok(fetched),
                Err(err) if attempt < self.retries && err.is_retryable() => {
                    attempt += 1;
                    tracing::debug!(%url, attempt, error = ?err, "retrying fetch");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) => return Err(err.into_fetch_error()),
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url, options: FetchOptions) -> Result<Page, FetchError> {
        let fetched = self
            .get_with_retries(url, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .await?;

        if let Some(content_type) = fetched.content_type.as_deref()
            && !(content_type.starts_with("text/html")
                || content_type.starts_with("application/xhtml+xml"))
        {
            return Err(FetchError::ParseFailure(format!(
                "not an html document ({content_type})"
            )));
        }

        Ok(build_page(url, &fetched.final_url, &fetched.text, options))
    }

    async fn sitemap_urls(&self, sitemap: &Url) -> Result<Vec<Url>, FetchError> {
        let accept = "application/xml,text/xml;q=0.9,*/*;q=0.8";
        let fetched = self.get_with_retries(sitemap, accept).await?;

        let locs = html::extract_xml_locs(&fetched.text);
        if !fetched.text.to_ascii_lowercase().contains("<sitemapindex") {
            return Ok(parse_urls(locs));
        }

        let mut out = Vec::new();
        for child in parse_urls(locs).into_iter().take(MAX_SUB_SITEMAPS) {
            match self.get_with_retries(&child, accept).await {
                Ok(child_text) => out.extend(parse_urls(html::extract_xml_locs(&child_text.text))),
                Err(err) => {
                    tracing::debug!(sitemap = %child, error = %err, "child sitemap skipped");
                }
            }
        }
        Ok(out)
    }
}

struct Fetched {
    final_url: Url,
    content_type: Option<String>,
    text: String,
}

#[derive(Debug)]
enum Attempt {
    Transport(String),
    Timeout,
    Status(u16),
}

impl Attempt {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status(status) => *status >= 500,
        }
    }

    fn into_fetch_error(self) -> FetchError {
        match self {
            Self::Transport(message) => FetchError::Unreachable(message),
            Self::Timeout => FetchError::Timeout,
            Self::Status(status) => FetchError::Unreachable(format!("HTTP {status}")),
        }
    }
}

async fn read_text_limited(
    mut resp: reqwest::Response,
    limit: usize,
) -> Result<String, reqwest::Error> {
    let mut out: Vec<u8> = Vec::new();

    while let Some(chunk) = resp.chunk().await? {
        if out.len() + chunk.len() > limit {
            let remaining = limit.saturating_sub(out.len());
            out.extend_from_slice(&chunk[..remaining]);
            break;
        }
        out.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn parse_urls(locs: Vec<String>) -> Vec<Url> {
    locs.into_iter()
        .filter_map(|loc| Url::parse(&loc).ok())
        .collect()
}

/// Turns a fetched HTML body into a `Page`. `requested` stays the page's
/// identity; links resolve against `final_url` (after redirects).
pub fn build_page(requested: &Url, final_url: &Url, body: &str, options: FetchOptions) -> Page {
    let doc = Document::parse(body);

    let mut internal_links = Vec::new();
    let mut external_links = Vec::new();
    let mut seen = HashSet::new();
    for href in &doc.hrefs {
        let Ok(mut link) = final_url.join(href) else {
            continue;
        };
        if link.scheme() != "http" && link.scheme() != "https" {
            continue;
        }
        link.set_fragment(None);
        let link_str = link.to_string();
        if !seen.insert(link_str.clone()) {
            continue;
        }
        if link.host_str() == final_url.host_str() {
            internal_links.push(link_str);
        } else {
            external_links.push(link_str);
        }
    }

    let headings = if options.analyze_headings {
        doc.headings.clone()
    } else {
        Headings::default()
    };

    let mut extra_tags = BTreeMap::new();
    if options.analyze_extra_tags {
        for tag in &doc.meta {
            if tag.key.starts_with("og:") || tag.key.starts_with("twitter:") || tag.key == "robots"
            {
                extra_tags
                    .entry(tag.key.clone())
                    .or_insert_with(|| tag.content.clone());
            }
        }
        if let Some(canonical) = &doc.canonical {
            extra_tags.insert("canonical".to_string(), canonical.clone());
        }
    }

    Page {
        url: requested.to_string(),
        title: doc.title.clone().unwrap_or_default(),
        meta_description: doc.meta_content("description").map(str::to_string),
        headings,
        extra_tags,
        internal_links,
        external_links,
        word_count: doc.text.split_whitespace().count(),
        content_hash: content_hash(&doc.text),
        body_text: doc.text,
        final_url: final_url.to_string(),
    }
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
