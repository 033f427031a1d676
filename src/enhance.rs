//! AI enhancement stage: four analysis branches in parallel, one synthesis
//! branch over their output, every slot degrading to a fixed fallback.

mod cache;
mod insights;
mod payloads;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

pub use cache::EnhancementCache;
pub use insights::QuickInsights;
pub use payloads::{
    BranchPayload, ConversationAnalysis, CredibilityAnalysis, EntityAnalysis, PlatformPresence,
    Recommendations,
};

use crate::config::{AiMode, EnhanceConfig};
use crate::formats::AnalysisResult;
use crate::llm::{LlmClient, LlmError, LlmRequest};

/// Size-bounded reduction of an `AnalysisResult`: the LLM input and the
/// cache key. Timing is left out so identical sites share a fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Digest {
    pub pages_count: usize,
    pub sample_pages: Vec<PageSample>,
    pub top_keywords: Vec<KeywordSample>,
    pub errors_count: usize,
    pub duplicate_groups: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageSample {
    pub url: String,
    pub title: String,
    pub meta_description: Option<String>,
    pub h1: Vec<String>,
    pub word_count: usize,
    pub internal_links: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordSample {
    pub term: String,
    pub count: usize,
}

impl Digest {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let profile = result.analysis_mode.profile();
        Self {
            pages_count: result.pages.len(),
            sample_pages: result
                .pages
                .iter()
                .take(profile.digest_sample_pages)
                .map(|page| PageSample {
                    url: page.url.clone(),
                    title: page.title.clone(),
                    meta_description: page.meta_description.clone(),
                    h1: page.headings.h1.clone(),
                    word_count: page.word_count,
                    internal_links: page.internal_links.len(),
                })
                .collect(),
            top_keywords: result
                .keywords
                .iter()
                .take(profile.digest_top_keywords)
                .map(|k| KeywordSample {
                    term: k.term.clone(),
                    count: k.count,
                })
                .collect(),
            errors_count: result.errors.len(),
            duplicate_groups: result.duplicate_pages.len(),
        }
    }

    pub fn to_prompt_input(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn fingerprint(&self, ai_mode: AiMode) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ai_mode.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        hex::encode(hasher.finalize())
    }
}

/// Where a slot's payload came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provenance", rename_all = "snake_case")]
pub enum BranchOutcome<T> {
    Computed { payload: T },
    Fallback { payload: T, reason: String },
}

impl<T> BranchOutcome<T> {
    pub fn payload(&self) -> &T {
        match self {
            Self::Computed { payload } | Self::Fallback { payload, .. } => payload,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

impl<T: BranchPayload> BranchOutcome<T> {
    fn fallback(reason: impl Into<String>) -> Self {
        Self::Fallback {
            payload: T::fallback(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreSummary {
    pub entity_score: f64,
    pub credibility_score: f64,
    pub conversation_score: f64,
    pub platform_score: f64,
}

/// Always carries all five slots; only provenance varies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnhancementResult {
    pub entity: BranchOutcome<EntityAnalysis>,
    pub credibility: BranchOutcome<CredibilityAnalysis>,
    pub conversation: BranchOutcome<ConversationAnalysis>,
    pub platform: BranchOutcome<PlatformPresence>,
    pub recommendations: BranchOutcome<Recommendations>,
    pub summary: ScoreSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_insights: Option<QuickInsights>,
}

impl EnhancementResult {
    fn assemble(
        entity: BranchOutcome<EntityAnalysis>,
        credibility: BranchOutcome<CredibilityAnalysis>,
        conversation: BranchOutcome<ConversationAnalysis>,
        platform: BranchOutcome<PlatformPresence>,
        recommendations: BranchOutcome<Recommendations>,
    ) -> Self {
        let summary = ScoreSummary {
            entity_score: score(entity.payload().knowledge_panel_readiness),
            credibility_score: mean_score(credibility.payload().neeat_scores.values()),
            conversation_score: score(conversation.payload().engagement_score),
            platform_score: mean_score(platform.payload().visibility_scores.values()),
        };
        Self {
            entity,
            credibility,
            conversation,
            platform,
            recommendations,
            summary,
            quick_insights: None,
        }
    }

    pub fn all_fallback(reason: &str) -> Self {
        Self::assemble(
            BranchOutcome::fallback(reason),
            BranchOutcome::fallback(reason),
            BranchOutcome::fallback(reason),
            BranchOutcome::fallback(reason),
            BranchOutcome::fallback(reason),
        )
    }

    /// True when none of the four analysis branches fell back.
    pub fn analyses_computed(&self) -> bool {
        !(self.entity.is_fallback()
            || self.credibility.is_fallback()
            || self.conversation.is_fallback()
            || self.platform.is_fallback())
    }

    pub fn fallback_count(&self) -> usize {
        [
            self.entity.is_fallback(),
            self.credibility.is_fallback(),
            self.conversation.is_fallback(),
            self.platform.is_fallback(),
            self.recommendations.is_fallback(),
        ]
        .into_iter()
        .filter(|f| *f)
        .count()
    }
}

fn score(value: u32) -> f64 {
    f64::from(value.min(100))
}

fn mean_score<'a>(values: impl Iterator<Item = &'a u32>) -> f64 {
    let (sum, n) = values.fold((0.0, 0u32), |(sum, n), v| (sum + score(*v), n + 1));
    if n == 0 { 50.0 } else { sum / f64::from(n) }
}

pub struct EnhancementCoordinator {
    llm: Arc<dyn LlmClient>,
    cache: Mutex<EnhancementCache>,
    config_override: Option<EnhanceConfig>,
}

impl EnhancementCoordinator {
    pub fn new(llm: Arc<dyn LlmClient>, cache_capacity: usize) -> Self {
        Self {
            llm,
            cache: Mutex::new(EnhancementCache::new(cache_capacity)),
            config_override: None,
        }
    }

    /// Replaces the per-`AiMode` timeouts and budgets.
    pub fn with_config(mut self, config: EnhanceConfig) -> Self {
        self.config_override = Some(config);
        self
    }

    pub async fn enhance(&self, result: &AnalysisResult, ai_mode: AiMode) -> EnhancementResult {
        let digest = Digest::from_result(result);
        let fingerprint = digest.fingerprint(ai_mode);

        if let Some(cached) = self.cached(&fingerprint) {
            tracing::debug!(%fingerprint, "enhancement cache hit");
            return cached;
        }

        let config = self
            .config_override
            .unwrap_or_else(|| EnhanceConfig::for_mode(ai_mode));
        let input = digest.to_prompt_input();

        let staged = self.run_stages(&input, &config);
        let mut enhanced = match tokio::time::timeout(config.stage_timeout, staged).await {
            Ok(enhanced) => enhanced,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = config.stage_timeout.as_secs(),
                    "enhancement stage timed out; using full fallback"
                );
                let mut fallback = EnhancementResult::all_fallback("enhancement stage timed out");
                if ai_mode == AiMode::Lightweight {
                    fallback.quick_insights = QuickInsights::from_digest(&digest);
                }
                return fallback;
            }
        };

        if ai_mode == AiMode::Lightweight {
            enhanced.quick_insights = QuickInsights::from_digest(&digest);
        }

        tracing::info!(
            fallbacks = enhanced.fallback_count(),
            analyses_computed = enhanced.analyses_computed(),
            "enhancement finished"
        );
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint, enhanced.clone());
        enhanced
    }

    fn cached(&self, fingerprint: &str) -> Option<EnhancementResult> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned()
    }

    async fn run_stages(&self, input: &str, config: &EnhanceConfig) -> EnhancementResult {
        let llm = self.llm.as_ref();
        let (entity, credibility, conversation, platform) = tokio::join!(
            run_branch::<EntityAnalysis>(llm, input, config, config.branch_timeout),
            run_branch::<CredibilityAnalysis>(llm, input, config, config.branch_timeout),
            run_branch::<ConversationAnalysis>(llm, input, config, config.branch_timeout),
            run_branch::<PlatformPresence>(llm, input, config, config.branch_timeout),
        );

        let combined = serde_json::json!({
            "entity_analysis": entity.payload(),
            "credibility_analysis": credibility.payload(),
            "conversation_analysis": conversation.payload(),
            "cross_platform_presence": platform.payload(),
        })
        .to_string();
        let recommendations =
            run_branch::<Recommendations>(llm, &combined, config, config.synthesis_timeout).await;

        EnhancementResult::assemble(entity, credibility, conversation, platform, recommendations)
    }
}

async fn run_branch<T: BranchPayload>(
    llm: &dyn LlmClient,
    input: &str,
    config: &EnhanceConfig,
    timeout: Duration,
) -> BranchOutcome<T> {
    let request = LlmRequest {
        branch: T::BRANCH,
        instructions: T::instructions().to_string(),
        input: input.to_string(),
        max_output_tokens: config.max_output_tokens,
        temperature: config.temperature,
    };

    let outcome = match tokio::time::timeout(timeout, llm.run(request)).await {
        Ok(Ok(value)) => serde_json::from_value::<T>(value)
            .map_err(|err| LlmError::ParseFailure(err.to_string())),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(LlmError::Timeout),
    };

    match outcome {
        Ok(payload) => BranchOutcome::Computed { payload },
        Err(err) => {
            tracing::warn!(branch = T::BRANCH, error = %err, "branch fell back");
            BranchOutcome::fallback(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::AnalysisMode;
    use crate::formats::{Keyword, KeywordKind, LinkSummary, Page, PerformanceMetrics};

    enum Reply {
        Json(serde_json::Value),
        Hang,
    }

    #[derive(Default)]
    struct ScriptedLlm {
        replies: HashMap<&'static str, Reply>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn computing_everything() -> Self {
            let mut llm = Self::default();
            llm.replies.insert(
                EntityAnalysis::BRANCH,
                Reply::Json(serde_json::json!({
                    "entity_assessment": "strong",
                    "knowledge_panel_readiness": 80,
                    "key_improvements": ["a", "b", "c"],
                })),
            );
            llm.replies.insert(
                CredibilityAnalysis::BRANCH,
                Reply::Json(serde_json::json!({
                    "credibility_assessment": "fine",
                    "neeat_scores": { "expertise": 90, "authority": 70 },
                    "trust_signals": ["https"],
                })),
            );
            llm.replies.insert(
                ConversationAnalysis::BRANCH,
                Reply::Json(serde_json::json!({
                    "conversation_readiness": "ok",
                    "query_patterns": ["how to"],
                    "engagement_score": 55,
                    "gaps": [],
                })),
            );
            llm.replies.insert(
                PlatformPresence::BRANCH,
                Reply::Json(serde_json::json!({
                    "platform_coverage": {},
                    "visibility_scores": {},
                    "optimization_opportunities": [],
                })),
            );
            llm.replies.insert(
                Recommendations::BRANCH,
                Reply::Json(serde_json::to_value(Recommendations::fallback()).unwrap()),
            );
            llm
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn run(&self, request: LlmRequest) -> Result<serde_json::Value, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(request.branch) {
                Some(Reply::Json(value)) => Ok(value.clone()),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(LlmError::Timeout)
                }
                None => Err(LlmError::Provider("no reply scripted".to_string())),
            }
        }
    }

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            analyzed_url: "https://example.com/".to_string(),
            analysis_mode: AnalysisMode::Fast,
            pages: vec![Page {
                url: "https://example.com/".to_string(),
                title: "Example widgets".to_string(),
                ..Page::default()
            }],
            duplicate_pages: Vec::new(),
            keywords: vec![Keyword {
                term: "widgets".to_string(),
                kind: KeywordKind::Word,
                count: 5,
            }],
            internal_links: LinkSummary::default(),
            errors: Vec::new(),
            total_time_secs: 1.5,
            performance: PerformanceMetrics {
                concurrency: 10,
                pages_per_second: Some(0.7),
            },
            ai_analysis: None,
            ai_enhanced: false,
        }
    }

    #[tokio::test]
    async fn computed_branches_feed_the_summary() {
        let llm = Arc::new(ScriptedLlm::computing_everything());
        let coordinator = EnhancementCoordinator::new(llm.clone(), 20);

        let enhanced = coordinator.enhance(&analysis(), AiMode::Full).await;

        assert!(enhanced.analyses_computed());
        assert_eq!(enhanced.fallback_count(), 0);
        assert_eq!(enhanced.summary.entity_score, 80.0);
        assert_eq!(enhanced.summary.credibility_score, 80.0);
        assert_eq!(enhanced.summary.platform_score, 50.0);
        assert!(enhanced.quick_insights.is_none());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back_for_that_branch_only() {
        let mut llm = ScriptedLlm::computing_everything();
        llm.replies.insert(
            ConversationAnalysis::BRANCH,
            Reply::Json(serde_json::json!({ "conversation_readiness": "partial" })),
        );
        let coordinator = EnhancementCoordinator::new(Arc::new(llm), 20);

        let enhanced = coordinator.enhance(&analysis(), AiMode::Lightweight).await;

        assert!(enhanced.conversation.is_fallback());
        assert_eq!(enhanced.fallback_count(), 1);
        assert!(!enhanced.analyses_computed());
        assert_eq!(
            enhanced.conversation.payload(),
            &ConversationAnalysis::fallback()
        );
        assert!(enhanced.quick_insights.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stage_timeout_collapses_everything_to_fallback() {
        let mut llm = ScriptedLlm::computing_everything();
        llm.replies.insert(Recommendations::BRANCH, Reply::Hang);
        let coordinator = EnhancementCoordinator::new(Arc::new(llm), 20).with_config(EnhanceConfig {
            branch_timeout: Duration::from_secs(5),
            synthesis_timeout: Duration::from_secs(30),
            stage_timeout: Duration::from_secs(10),
            max_output_tokens: 100,
            temperature: 0.0,
        });

        let enhanced = coordinator.enhance(&analysis(), AiMode::Full).await;

        assert_eq!(enhanced.fallback_count(), 5);
        match &enhanced.entity {
            BranchOutcome::Fallback { reason, .. } => {
                assert_eq!(reason, "enhancement stage timed out")
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stage_timeout_result_is_not_cached() {
        let llm = Arc::new(ScriptedLlm {
            replies: HashMap::from([(EntityAnalysis::BRANCH, Reply::Hang)]),
            ..ScriptedLlm::default()
        });
        let coordinator = EnhancementCoordinator::new(llm.clone(), 20).with_config(EnhanceConfig {
            branch_timeout: Duration::from_secs(50),
            synthesis_timeout: Duration::from_secs(30),
            stage_timeout: Duration::from_secs(10),
            max_output_tokens: 100,
            temperature: 0.0,
        });

        coordinator.enhance(&analysis(), AiMode::Full).await;
        coordinator.enhance(&analysis(), AiMode::Full).await;

        assert_eq!(llm.calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn fingerprint_ignores_timing_but_not_content() {
        let a = analysis();
        let mut slower = analysis();
        slower.total_time_secs = 99.0;
        slower.performance.pages_per_second = None;
        let mut other = analysis();
        other.pages[0].title = "Different".to_string();

        let fp = |r: &AnalysisResult| Digest::from_result(r).fingerprint(AiMode::Full);
        assert_eq!(fp(&a), fp(&slower));
        assert_ne!(fp(&a), fp(&other));
        assert_ne!(
            fp(&a),
            Digest::from_result(&a).fingerprint(AiMode::Lightweight)
        );
    }

    #[test]
    fn digest_is_bounded_by_mode() {
        let mut result = analysis();
        result.pages = (0..10)
            .map(|i| Page {
                url: format!("https://example.com/{i}"),
                ..Page::default()
            })
            .collect();
        result.analysis_mode = AnalysisMode::Lightning;

        let digest = Digest::from_result(&result);
        assert_eq!(digest.pages_count, 10);
        assert_eq!(digest.sample_pages.len(), 1);
    }

    #[test]
    fn outcome_serializes_provenance() {
        let outcome: BranchOutcome<EntityAnalysis> = BranchOutcome::fallback("timed out");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["provenance"], "fallback");
        assert_eq!(value["reason"], "timed out");
        assert_eq!(value["payload"]["knowledge_panel_readiness"], 65);
    }
}
