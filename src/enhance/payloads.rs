//! Structured replies of the five enhancement branches and the fixed
//! fallback each one degrades to.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A payload one branch asks the model for.
pub trait BranchPayload: Serialize + DeserializeOwned + Send + 'static {
    const BRANCH: &'static str;

    fn instructions() -> &'static str;

    fn fallback() -> Self;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityAnalysis {
    pub entity_assessment: String,
    /// 0-100.
    pub knowledge_panel_readiness: u32,
    pub key_improvements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredibilityAnalysis {
    pub credibility_assessment: String,
    /// naturalness, entity, expertise, authority, trustworthiness, transparency.
    pub neeat_scores: BTreeMap<String, u32>,
    pub trust_signals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationAnalysis {
    pub conversation_readiness: String,
    pub query_patterns: Vec<String>,
    pub engagement_score: u32,
    pub gaps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformPresence {
    pub platform_coverage: BTreeMap<String, String>,
    pub visibility_scores: BTreeMap<String, u32>,
    pub optimization_opportunities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recommendations {
    pub strategic_recommendations: Vec<String>,
    pub quick_wins: Vec<String>,
    pub long_term_strategy: Vec<String>,
    pub priority_matrix: BTreeMap<String, String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn map<V: Clone>(items: &[(&str, V)]) -> BTreeMap<String, V> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl BranchPayload for EntityAnalysis {
    const BRANCH: &'static str = "entity";

    fn instructions() -> &'static str {
        "You assess SEO entity optimization for the site summarized in the input. Be concise.\n\
Reply with one JSON object only:\n\
{\"entity_assessment\": string, \"knowledge_panel_readiness\": integer 0-100, \
\"key_improvements\": [three strings]}"
    }

    fn fallback() -> Self {
        Self {
            entity_assessment: "Baseline entity review: brand entity signals need strengthening \
to improve knowledge-graph presence. Complete the organization pages, add structured data \
and keep the brand name consistent."
                .to_string(),
            knowledge_panel_readiness: 65,
            key_improvements: strings(&[
                "Add complete Schema.org structured data",
                "Keep the brand name consistent across platforms",
                "Strengthen entity relevance and authority signals",
            ]),
        }
    }
}

impl BranchPayload for CredibilityAnalysis {
    const BRANCH: &'static str = "credibility";

    fn instructions() -> &'static str {
        "You evaluate the credibility of the site summarized in the input. Be brief.\n\
Reply with one JSON object only:\n\
{\"credibility_assessment\": string, \"neeat_scores\": {\"naturalness\": 0-100, \
\"entity\": 0-100, \"expertise\": 0-100, \"authority\": 0-100, \"trustworthiness\": 0-100, \
\"transparency\": 0-100}, \"trust_signals\": [three strings]}"
    }

    fn fallback() -> Self {
        Self {
            credibility_assessment: "Baseline credibility review: the site shows basic trust \
signals but has room to improve expertise and transparency. Expand the about page and \
show professional credentials."
                .to_string(),
            neeat_scores: map(&[
                ("naturalness", 70),
                ("entity", 65),
                ("expertise", 60),
                ("authority", 65),
                ("trustworthiness", 68),
                ("transparency", 62),
            ]),
            trust_signals: strings(&[
                "Secure connection (HTTPS) is configured",
                "Contact information is visible",
                "About page needs more detail",
            ]),
        }
    }
}

impl BranchPayload for ConversationAnalysis {
    const BRANCH: &'static str = "conversation";

    fn instructions() -> &'static str {
        "You analyze how ready the site summarized in the input is for conversational and \
voice search. Be concise.\n\
Reply with one JSON object only:\n\
{\"conversation_readiness\": string, \"query_patterns\": [three strings], \
\"engagement_score\": integer 0-100, \"gaps\": [three strings]}"
    }

    fn fallback() -> Self {
        Self {
            conversation_readiness: "Baseline conversational review: content structure is \
reasonable but should adapt to voice and conversational queries. Add an FAQ section and \
target long-tail questions."
                .to_string(),
            query_patterns: strings(&[
                "Informational: visitors looking for basic answers",
                "Comparison: visitors weighing alternatives",
                "Local: visitors looking for nearby services",
            ]),
            engagement_score: 68,
            gaps: strings(&[
                "No structured FAQ section",
                "Content depth does not cover enough query intents",
                "Natural-language and long-tail phrasing is missing",
            ]),
        }
    }
}

impl BranchPayload for PlatformPresence {
    const BRANCH: &'static str = "platform";

    fn instructions() -> &'static str {
        "You analyze the cross-platform presence of the site summarized in the input. Be brief.\n\
Reply with one JSON object only:\n\
{\"platform_coverage\": {\"search_engines\": string, \"social_media\": string, \
\"knowledge_graphs\": string}, \"visibility_scores\": {\"google\": 0-100, \"bing\": 0-100, \
\"social\": 0-100, \"knowledge_graph\": 0-100}, \"optimization_opportunities\": [three strings]}"
    }

    fn fallback() -> Self {
        Self {
            platform_coverage: map(&[
                (
                    "search_engines",
                    "Basic SEO is in place; technical setup and content quality need work"
                        .to_string(),
                ),
                (
                    "social_media",
                    "Social presence should be established or strengthened".to_string(),
                ),
                (
                    "knowledge_graphs",
                    "Knowledge panel and related entity coverage need improvement".to_string(),
                ),
            ]),
            visibility_scores: map(&[
                ("google", 70),
                ("bing", 65),
                ("social", 45),
                ("knowledge_graph", 58),
            ]),
            optimization_opportunities: strings(&[
                "Complete the business profile to improve local search",
                "Increase social media activity and build a community",
                "Build authority in industry knowledge graphs",
                "Monitor branded search results for completeness",
            ]),
        }
    }
}

impl BranchPayload for Recommendations {
    const BRANCH: &'static str = "recommendations";

    fn instructions() -> &'static str {
        "You turn the four analyses in the input into a strategic SEO plan. Be concise.\n\
Reply with one JSON object only:\n\
{\"strategic_recommendations\": [three strings], \"quick_wins\": [three strings], \
\"long_term_strategy\": [three strings], \"priority_matrix\": {\"high_impact_low_cost\": string, \
\"high_impact_high_cost\": string, \"low_impact_low_cost\": string, \
\"low_impact_high_cost\": string}}"
    }

    fn fallback() -> Self {
        Self {
            strategic_recommendations: strings(&[
                "Build a keyword strategy from search intent research",
                "Improve technical architecture: speed, mobile experience and crawlability",
                "Raise content quality with original, in-depth pages",
                "Earn authoritative backlinks and tighten internal linking",
            ]),
            quick_wins: strings(&[
                "Give every page a unique 30-60 character title containing its main keyword",
                "Write 150-160 character meta descriptions with a call to action",
                "Add descriptive alt text to all images",
                "Fix 404s, duplicate content and missing titles",
                "Check that pages render and load quickly on mobile",
            ]),
            long_term_strategy: strings(&[
                "Publish high-quality content on a regular schedule",
                "Grow social and knowledge-graph presence",
                "Demonstrate expertise and earn industry recognition",
                "Track SEO metrics and adjust strategy from the data",
            ]),
            priority_matrix: map(&[
                (
                    "high_impact_low_cost",
                    "Titles and meta descriptions, internal links, technical fixes".to_string(),
                ),
                (
                    "high_impact_high_cost",
                    "Content strategy rebuild, site architecture, dedicated SEO staff".to_string(),
                ),
                (
                    "low_impact_low_cost",
                    "Social profiles, image alt text, small content updates".to_string(),
                ),
                (
                    "low_impact_high_cost",
                    "Full site rebuild, large paid campaigns, rebranding".to_string(),
                ),
            ]),
        }
    }
}
