use std::cmp::Ordering;
use std::collections::HashSet;

use url::Url;

use super::StepChain;
use crate::types::{Interview, OptimizedResearch, RankedSummary, Summary};

/// Summaries scoring below this are dropped.
pub const MIN_RELEVANCE: f32 = 0.05;

const KEYWORD_WEIGHT: f32 = 0.6;
const SEARCH_WEIGHT: f32 = 0.25;
const AUTHORITY_WEIGHT: f32 = 0.15;

impl StepChain {
    /// Step 4. See [`optimize_serp`].
    pub fn optimize_serp(&self, interview: &Interview, summaries: &[Summary]) -> OptimizedResearch {
        optimize_serp(interview, summaries)
    }
}

/// Rerank summaries by relevance to the interview's keywords.
///
/// Relevance mixes keyword coverage, the provider's own score and the
/// authority of the source domains. Skipped, empty and irrelevant summaries
/// are dropped; the rest are ordered by descending relevance, ties keeping
/// plan order.
pub fn optimize_serp(interview: &Interview, summaries: &[Summary]) -> OptimizedResearch {
    let terms = keyword_terms(interview);

    let mut entries: Vec<RankedSummary> = summaries
        .iter()
        .filter(|s| !s.skipped && !s.text.trim().is_empty())
        .map(|s| RankedSummary {
            relevance: relevance(&terms, s),
            summary: s.clone(),
        })
        .filter(|r| r.relevance >= MIN_RELEVANCE)
        .collect();

    entries.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(Ordering::Equal));

    OptimizedResearch { entries }
}

fn keyword_terms(interview: &Interview) -> HashSet<String> {
    interview
        .keywords()
        .flat_map(|k| k.split_whitespace())
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() > 2)
        .collect()
}

fn relevance(terms: &HashSet<String>, summary: &Summary) -> f32 {
    let coverage = if terms.is_empty() {
        0.0
    } else {
        let haystack = format!("{} {}", summary.query, summary.text).to_lowercase();
        let hit = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
        hit as f32 / terms.len() as f32
    };

    let search = summary.search_score.unwrap_or(0.0).clamp(0.0, 1.0);

    let authority = summary
        .sources
        .iter()
        .map(|s| domain_authority(&s.url))
        .fold(0.0_f32, f32::max);

    // Authority alone never clears the bar.
    if coverage == 0.0 && search == 0.0 {
        return 0.0;
    }

    KEYWORD_WEIGHT * coverage + SEARCH_WEIGHT * search + AUTHORITY_WEIGHT * authority
}

fn domain_authority(url: &str) -> f32 {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return 0.0;
    };

    if host.ends_with(".gov") || host.contains(".gov.") || host.contains(".gob.") || host.ends_with(".edu") || host.contains(".edu.") {
        1.0
    } else if host.ends_with("wikipedia.org") {
        0.9
    } else if host.ends_with(".org") {
        0.6
    } else {
        0.3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceMetadata;

    fn summary(position: usize, text: &str, url: &str, score: Option<f32>) -> Summary {
        Summary {
            query: format!("query {}", position),
            position,
            text: text.to_string(),
            sources: vec![SourceMetadata {
                url: url.to_string(),
                title: None,
                score,
            }],
            search_score: score,
            skipped: false,
        }
    }

    fn interview() -> Interview {
        Interview::new("online marketing").with_secondary_keywords(["digital marketing"])
    }

    #[test]
    fn orders_by_descending_relevance() {
        let summaries = vec![
            summary(0, "online tips", "https://blog.example.com", Some(0.2)),
            summary(1, "online marketing and digital marketing", "https://en.wikipedia.org/wiki/X", Some(0.9)),
            summary(2, "marketing basics", "https://www.example.gov", Some(0.5)),
        ];

        let optimized = optimize_serp(&interview(), &summaries);
        let positions: Vec<usize> = optimized.entries.iter().map(|e| e.summary.position).collect();

        assert_eq!(positions, vec![1, 2, 0]);
        assert!(optimized
            .entries
            .windows(2)
            .all(|w| w[0].relevance >= w[1].relevance));
    }

    #[test]
    fn drops_skipped_empty_and_irrelevant() {
        let mut skipped = summary(0, "online marketing", "https://a.com", Some(0.9));
        skipped.skipped = true;
        let summaries = vec![
            skipped,
            summary(1, "", "https://b.com", Some(0.9)),
            summary(2, "recetas de cocina", "https://www.example.gov", None),
            summary(3, "digital marketing", "https://c.com", None),
        ];

        let optimized = optimize_serp(&interview(), &summaries);

        assert_eq!(optimized.len(), 1);
        assert_eq!(optimized.entries[0].summary.position, 3);
    }

    #[test]
    fn never_grows() {
        let summaries: Vec<Summary> = (0..10)
            .map(|i| summary(i, "online marketing", "https://x.com", Some(0.5)))
            .collect();
        assert!(optimize_serp(&interview(), &summaries).len() <= summaries.len());
    }
}
