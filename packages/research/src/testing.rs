//! Mock providers for exercising the step chain without network calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{PipelineError, Result};
use crate::pipeline::prompts::{PLAN_SYSTEM, SCRIPT_SYSTEM, SUMMARIZE_SYSTEM};
use crate::throttle::{LimiterRegistry, Provider};
use crate::traits::{TextGenerator, WebSearcher};
use crate::types::{Interview, SearchHit};

const PLAN_SUFFIXES: &[&str] = &[
    "que es",
    "estrategias",
    "ejemplos",
    "herramientas",
    "ventajas",
    "curso",
    "para pymes",
    "tendencias",
    "precios",
    "agencia",
    "guia",
];

/// Record of a call made to the mock generator.
#[derive(Debug, Clone)]
pub struct MockGeneratorCall {
    pub system: String,
    pub user: String,
}

/// Deterministic [`TextGenerator`].
///
/// Without configured responses it answers each kind of step prompt with
/// something plausible: a JSON plan of twelve queries built from the main
/// keyword, a one-line summary that repeats the keyword, and a short
/// markdown script.
#[derive(Default)]
pub struct MockGenerator {
    responses: RwLock<Vec<(String, String)>>,
    fail_remaining: AtomicUsize,
    permanent_failure: RwLock<Option<String>>,
    delay: RwLock<Option<Duration>>,
    calls: RwLock<Vec<MockGeneratorCall>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with `response` whenever the system or user prompt contains `needle`.
    pub fn with_response(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        write(&self.responses).push((needle.into(), response.into()));
        self
    }

    /// Answer the planning prompt with these queries.
    pub fn with_plan<I, S>(self, queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queries: Vec<String> = queries.into_iter().map(Into::into).collect();
        let json = serde_json::to_string(&queries).unwrap_or_else(|_| "[]".to_string());
        self.with_response(PLAN_SYSTEM, json)
    }

    /// Fail the next `n` calls with a transient error.
    pub fn failing_times(self, n: usize) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every call with a permanent error.
    pub fn always_rejecting(self, message: impl Into<String>) -> Self {
        *write(&self.permanent_failure) = Some(message.into());
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *write(&self.delay) = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockGeneratorCall> {
        read(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        read(&self.calls).len()
    }

    fn default_response(system: &str, user: &str) -> String {
        let keyword = field(user, "Main keyword").unwrap_or("topic");

        if system == PLAN_SYSTEM {
            let mut queries = vec![keyword.to_string()];
            queries.extend(PLAN_SUFFIXES.iter().map(|s| format!("{} {}", keyword, s)));
            serde_json::to_string(&queries).unwrap_or_else(|_| "[]".to_string())
        } else if system == SUMMARIZE_SYSTEM {
            let query = field(user, "Search query").unwrap_or(keyword);
            format!("Key facts about {} found while researching '{}'.", keyword, query)
        } else if system == SCRIPT_SYSTEM {
            format!(
                "# Guide to {kw}\nWhat readers will learn about {kw}.\n## What is {kw}\n- definition [1]\n## How to get started\n- first steps [2]\n## Common mistakes\n- pitfalls",
                kw = keyword
            )
        } else {
            format!("Generated text: {}", user.lines().next().unwrap_or(""))
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        write(&self.calls).push(MockGeneratorCall {
            system: system.to_string(),
            user: user.to_string(),
        });

        let delay = *read(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = read(&self.permanent_failure).clone() {
            return Err(PipelineError::permanent("mock", message));
        }

        let failed = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PipelineError::transient("mock", "simulated outage"));
        }

        let configured = read(&self.responses)
            .iter()
            .find(|(needle, _)| system.contains(needle.as_str()) || user.contains(needle.as_str()))
            .map(|(_, response)| response.clone());

        Ok(configured.unwrap_or_else(|| Self::default_response(system, user)))
    }

    fn provider(&self) -> &str {
        "mock"
    }
}

/// Deterministic [`WebSearcher`] that records when each search started.
#[derive(Default)]
pub struct MockWebSearcher {
    results: RwLock<HashMap<String, Vec<SearchHit>>>,
    failing: RwLock<HashSet<String>>,
    calls: RwLock<Vec<(String, Instant)>>,
}

impl MockWebSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, query: &str, hits: Vec<SearchHit>) -> Self {
        write(&self.results).insert(query.to_string(), hits);
        self
    }

    /// Make searches for `query` fail with a transient error.
    pub fn failing_on(self, query: &str) -> Self {
        write(&self.failing).insert(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        read(&self.calls).iter().map(|(q, _)| q.clone()).collect()
    }

    /// Start instants of every search, in call order.
    pub fn call_instants(&self) -> Vec<Instant> {
        read(&self.calls).iter().map(|(_, at)| *at).collect()
    }

    fn synthetic_hits(query: &str, n: usize) -> Vec<SearchHit> {
        let slug: String = query
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        (0..n.min(2))
            .map(|i| {
                SearchHit::new(
                    format!("https://example.com/{}/{}", slug, i),
                    format!("<article><h2>{}</h2><p>Everything about {}.</p></article>", query, query),
                )
                .with_title(query.to_string())
                .with_score(0.9 - i as f32 * 0.1)
            })
            .collect()
    }
}

#[async_trait]
impl WebSearcher for MockWebSearcher {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>> {
        write(&self.calls).push((query.to_string(), Instant::now()));

        if read(&self.failing).contains(query) {
            return Err(PipelineError::transient("mock-search", format!("search for '{}' failed", query)));
        }

        Ok(read(&self.results)
            .get(query)
            .cloned()
            .unwrap_or_else(|| Self::synthetic_hits(query, num_results)))
    }

    fn provider(&self) -> &str {
        "mock-search"
    }
}

/// Searcher whose every call fails with the given error kind.
pub struct FailingSearcher {
    retryable: bool,
}

impl FailingSearcher {
    pub fn transient() -> Self {
        Self { retryable: true }
    }

    pub fn permanent() -> Self {
        Self { retryable: false }
    }
}

#[async_trait]
impl WebSearcher for FailingSearcher {
    async fn search(&self, query: &str, _num_results: usize) -> Result<Vec<SearchHit>> {
        if self.retryable {
            Err(PipelineError::transient("failing-search", format!("timeout for '{}'", query)))
        } else {
            Err(PipelineError::permanent("failing-search", "invalid credentials"))
        }
    }
}

/// The interview used throughout the tests: online marketing, in Spanish.
pub fn sample_interview() -> Interview {
    Interview::new("online marketing")
        .with_secondary_keywords(["digital marketing"])
        .with_language("es")
        .with_description("Guía para pequeñas empresas que empiezan en internet")
}

/// Registry with generous limits so tests are not slowed down.
pub fn fast_limiters() -> LimiterRegistry {
    LimiterRegistry::new()
        .with_limit(Provider::Search, 1000)
        .and_then(|r| r.with_limit(Provider::Generation, 1000))
        .unwrap_or_default()
}

fn field<'a>(prompt: &'a str, label: &str) -> Option<&'a str> {
    prompt.lines().find_map(|line| {
        line.strip_prefix(label)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
