use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use research::{ChainConfig, GatherPolicy, LimiterRegistry, Provider};

use crate::domains::generation::{DispatcherConfig, ImageKeyStrategy};
use crate::kernel::jobs::{JobWorkerConfig, RetryPolicy};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// In-memory stores are used when unset.
    pub database_url: Option<String>,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub tavily_api_key: Option<String>,
    pub search_max_per_second: usize,
    pub generation_max_per_second: usize,
    pub search_timeout: Duration,
    pub generation_timeout: Duration,
    pub search_results_per_query: usize,
    pub gather_policy: GatherPolicy,
    pub worker_count: usize,
    pub worker_batch_size: i64,
    pub job_max_attempts: i32,
    pub job_backoff_base: Duration,
    pub partial_failure_tolerance: bool,
    pub image_key_strategy: ImageKeyStrategy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            port: parsed("PORT", "8080").context("PORT must be a valid number")?,
            openai_api_key: optional("OPENAI_API_KEY"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            tavily_api_key: optional("TAVILY_API_KEY"),
            search_max_per_second: parsed("SEARCH_MAX_PER_SECOND", "5")
                .context("SEARCH_MAX_PER_SECOND must be a positive number")?,
            generation_max_per_second: parsed("GENERATION_MAX_PER_SECOND", "3")
                .context("GENERATION_MAX_PER_SECOND must be a positive number")?,
            search_timeout: Duration::from_secs(
                parsed("SEARCH_TIMEOUT_SECS", "20").context("SEARCH_TIMEOUT_SECS must be a number")?,
            ),
            generation_timeout: Duration::from_secs(
                parsed("GENERATION_TIMEOUT_SECS", "120")
                    .context("GENERATION_TIMEOUT_SECS must be a number")?,
            ),
            search_results_per_query: parsed("SEARCH_RESULTS_PER_QUERY", "5")
                .context("SEARCH_RESULTS_PER_QUERY must be a number")?,
            gather_policy: parsed("GATHER_POLICY", "fail_fast")
                .context("GATHER_POLICY must be fail_fast or best_effort")?,
            worker_count: parsed("WORKER_COUNT", "2").context("WORKER_COUNT must be a number")?,
            worker_batch_size: parsed("WORKER_BATCH_SIZE", "5")
                .context("WORKER_BATCH_SIZE must be a number")?,
            job_max_attempts: parsed("JOB_MAX_ATTEMPTS", "3")
                .context("JOB_MAX_ATTEMPTS must be a number")?,
            job_backoff_base: Duration::from_millis(
                parsed("JOB_BACKOFF_BASE_MS", "2000").context("JOB_BACKOFF_BASE_MS must be a number")?,
            ),
            partial_failure_tolerance: parsed("PARTIAL_FAILURE_TOLERANCE", "false")
                .context("PARTIAL_FAILURE_TOLERANCE must be true or false")?,
            image_key_strategy: parsed("IMAGE_KEY_STRATEGY", "timestamp")
                .context("IMAGE_KEY_STRATEGY must be timestamp or prompt_hash")?,
        })
    }

    /// Process-wide limiters for the two provider kinds.
    pub fn limiters(&self) -> Result<LimiterRegistry> {
        Ok(LimiterRegistry::new()
            .with_limit(Provider::Search, self.search_max_per_second)?
            .with_limit(Provider::Generation, self.generation_max_per_second)?)
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            results_per_query: self.search_results_per_query,
            gather_policy: self.gather_policy,
            search_timeout: self.search_timeout,
            generation_timeout: self.generation_timeout,
        }
    }

    pub fn worker_config(&self, index: usize) -> JobWorkerConfig {
        JobWorkerConfig::with_worker_id(format!("worker-{}-{}", index, uuid::Uuid::new_v4()))
            .with_batch_size(self.worker_batch_size)
    }
}

impl From<&Config> for DispatcherConfig {
    fn from(config: &Config) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.job_max_attempts.max(1),
                base_delay: config.job_backoff_base,
                ..RetryPolicy::default()
            },
            partial_failure_tolerance: config.partial_failure_tolerance,
            image_keys: config.image_key_strategy,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    Ok(raw.trim().parse::<T>()?)
}
