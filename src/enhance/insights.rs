use serde::{Deserialize, Serialize};

use super::{Digest, PageSample};

const MAX_RECOMMENDATIONS: usize = 8;
const ATTENTION_BELOW: u32 = 70;

/// Deterministic on-page scoring of the seed page, computed locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuickInsights {
    pub title_score: u32,
    pub meta_score: u32,
    pub content_score: u32,
    pub overall_score: f64,
    pub summary: String,
    pub recommendations: Vec<String>,
    /// Areas ordered from weakest to strongest.
    pub priority: Vec<String>,
}

#[derive(Debug, Default)]
struct Check {
    score: i32,
    suggestions: Vec<&'static str>,
}

impl Check {
    fn clamped(&self) -> u32 {
        self.score.clamp(0, 100) as u32
    }
}

impl QuickInsights {
    pub fn from_digest(digest: &Digest) -> Option<Self> {
        let seed = digest.sample_pages.first()?;
        let keywords = digest
            .top_keywords
            .iter()
            .map(|k| k.term.as_str())
            .collect::<Vec<_>>();

        let title = check_title(&seed.title, &keywords);
        let meta = check_meta(seed.meta_description.as_deref().unwrap_or_default());
        let content = check_content(seed);

        let scores = [title.clamped(), meta.clamped(), content.clamped()];
        let overall_score = f64::from(scores.iter().sum::<u32>()) / 3.0;

        let mut recommendations = Vec::new();
        let areas = [
            ("title", &title),
            ("meta description", &meta),
            ("content", &content),
        ];
        for (area, check) in areas {
            if check.clamped() < ATTENTION_BELOW && !check.suggestions.is_empty() {
                let suggestions = check.suggestions.join("; ");
                recommendations.push(format!("Improve the {area}: {suggestions}"));
            }
        }
        if recommendations.len() < 5 {
            recommendations.extend(
                [
                    "Improve page load speed",
                    "Make sure the layout works on mobile devices",
                    "Study the keywords competitors rank for",
                    "Track results with an analytics tool",
                    "Refresh content regularly",
                ]
                .map(str::to_string),
            );
        }
        recommendations.truncate(MAX_RECOMMENDATIONS);

        let mut areas = vec![
            ("title", scores[0]),
            ("meta description", scores[1]),
            ("content", scores[2]),
        ];
        areas.sort_by_key(|(_, score)| *score);

        Some(Self {
            title_score: scores[0],
            meta_score: scores[1],
            content_score: scores[2],
            overall_score,
            summary: summary_for(overall_score).to_string(),
            recommendations,
            priority: areas.into_iter().map(|(name, _)| name.to_string()).collect(),
        })
    }
}

fn check_title(title: &str, keywords: &[&str]) -> Check {
    if title.trim().is_empty() {
        return Check {
            score: 0,
            suggestions: vec!["add a page title"],
        };
    }

    let mut check = Check {
        score: 50,
        ..Check::default()
    };
    match title.chars().count() {
        0..30 => check.suggestions.push("lengthen the title to 30-60 characters"),
        30..=60 => check.score += 30,
        _ => {
            check.score -= 20;
            check.suggestions.push("shorten the title to 60 characters or fewer");
        }
    }

    let lower = title.to_lowercase();
    if keywords.iter().any(|k| lower.contains(k)) {
        check.score += 20;
    } else {
        check.suggestions.push("include a frequent site keyword in the title");
    }
    check
}

fn check_meta(description: &str) -> Check {
    if description.trim().is_empty() {
        return Check {
            score: 0,
            suggestions: vec!["add a 120-160 character meta description"],
        };
    }

    let mut check = Check {
        score: 50,
        ..Check::default()
    };
    match description.chars().count() {
        0..120 => check.suggestions.push("lengthen the meta description to 120-160 characters"),
        120..=160 => check.score += 40,
        _ => {
            check.score -= 15;
            check.suggestions.push("shorten the meta description to 160 characters or fewer");
        }
    }
    check
}

fn check_content(page: &PageSample) -> Check {
    let mut check = Check {
        score: 50,
        ..Check::default()
    };
    match page.h1.len() {
        0 => {
            check.score -= 20;
            check.suggestions.push("add one main H1 heading");
        }
        1 => check.score += 20,
        _ => {
            check.score -= 10;
            check.suggestions.push("use a single H1 heading per page");
        }
    }
    if page.word_count < 300 {
        check.score -= 15;
        check.suggestions.push("expand the page to at least 300 words");
    } else {
        check.score += 20;
    }
    check
}

fn summary_for(overall: f64) -> &'static str {
    if overall >= 80.0 {
        "On-page SEO is in good shape; only fine-tuning is needed."
    } else if overall >= 60.0 {
        "On-page SEO has room to improve, mainly titles and content."
    } else if overall >= 40.0 {
        "On-page SEO needs significant work on tags and content structure."
    } else {
        "On-page SEO needs a full overhaul starting from the basics."
    }
}
