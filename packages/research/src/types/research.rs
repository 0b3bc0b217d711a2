//! Stage outputs of the step chain.
//!
//! Each step produces its own shape: [`ResearchPlan`] → [`ResearchResult`]s →
//! [`Summary`]s → [`OptimizedResearch`]. None of them has an identity outside
//! the run that produced it.

use indexmap::IndexSet;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Upper bound on queries in a plan.
pub const MAX_QUERIES: usize = 15;

lazy_static! {
    static ref LIST_MARKER: Regex = Regex::new(r"^\s*(?:\d+\s*[.):]\s*|[-*•]\s+)").unwrap();
}

/// Distinct, non-empty search queries derived from one interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    queries: Vec<String>,
}

impl ResearchPlan {
    /// Build a plan from raw candidate queries.
    ///
    /// The seed (usually the main keyword) always comes first. Candidates are
    /// trimmed and stripped of list markers and quotes; blanks and
    /// case-insensitive duplicates are dropped and the result is capped at
    /// [`MAX_QUERIES`].
    pub fn from_candidates<I, S>(seed: &str, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = IndexSet::new();
        let mut queries = Vec::new();

        let cleaned = std::iter::once(normalize_query(seed))
            .chain(candidates.into_iter().map(|c| normalize_query(c.as_ref())));

        for query in cleaned {
            if query.is_empty() || queries.len() == MAX_QUERIES {
                continue;
            }
            if seen.insert(query.to_lowercase()) {
                queries.push(query);
            }
        }

        Self { queries }
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

fn normalize_query(raw: &str) -> String {
    let stripped = LIST_MARKER.replace(raw, "");
    stripped
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where a piece of research came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Relevance reported by the search provider (0.0-1.0).
    #[serde(default)]
    pub score: Option<f32>,
}

/// A single search hit: cleaned page text plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: SourceMetadata,
}

impl SearchHit {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: SourceMetadata {
                url: url.into(),
                ..Default::default()
            },
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.metadata.score = Some(score);
        self
    }
}

/// Everything gathered for one query of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub query: String,
    /// Index of the query in the plan.
    pub position: usize,
    pub hits: Vec<SearchHit>,
    /// Set when best-effort gathering skipped this query; holds the reason.
    #[serde(default)]
    pub skipped: Option<String>,
}

impl ResearchResult {
    pub fn skipped(query: impl Into<String>, position: usize, reason: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            position,
            hits: Vec::new(),
            skipped: Some(reason.into()),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Best provider score among the hits.
    pub fn top_score(&self) -> Option<f32> {
        self.hits
            .iter()
            .filter_map(|h| h.metadata.score)
            .fold(None, |best, s| Some(best.map_or(s, |b: f32| b.max(s))))
    }
}

/// A bounded abstract of one research result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub query: String,
    pub position: usize,
    pub text: String,
    pub sources: Vec<SourceMetadata>,
    #[serde(default)]
    pub search_score: Option<f32>,
    #[serde(default)]
    pub skipped: bool,
}

/// A summary with the relevance score the optimizer gave it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSummary {
    pub summary: Summary,
    pub relevance: f32,
}

/// Summaries filtered and ordered by descending relevance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizedResearch {
    pub entries: Vec<RankedSummary>,
}

impl OptimizedResearch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct source URLs in ranking order.
    pub fn source_urls(&self) -> Vec<String> {
        let urls: IndexSet<&str> = self
            .entries
            .iter()
            .flat_map(|e| e.summary.sources.iter().map(|s| s.url.as_str()))
            .collect();
        urls.into_iter().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_puts_seed_first_and_dedups() {
        let plan = ResearchPlan::from_candidates(
            "online marketing",
            ["1. Online Marketing", "- que es el marketing digital", "\"seo local\"", "", "SEO local"],
        );

        assert_eq!(
            plan.queries(),
            &["online marketing", "que es el marketing digital", "seo local"]
        );
    }

    #[test]
    fn plan_is_capped() {
        let candidates: Vec<String> = (0..40).map(|i| format!("query {}", i)).collect();
        let plan = ResearchPlan::from_candidates("seed", &candidates);
        assert_eq!(plan.len(), MAX_QUERIES);
        assert_eq!(plan.queries()[0], "seed");
    }

    #[test]
    fn top_score_ignores_missing_scores() {
        let result = ResearchResult {
            query: "q".into(),
            position: 0,
            hits: vec![
                SearchHit::new("https://a.com", "a"),
                SearchHit::new("https://b.com", "b").with_score(0.4),
                SearchHit::new("https://c.com", "c").with_score(0.9),
            ],
            skipped: None,
        };
        assert_eq!(result.top_score(), Some(0.9));
    }
}
