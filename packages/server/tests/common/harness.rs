//! In-memory harness for dispatcher and worker tests.
//!
//! Wires the memory stores, a mock generator and a mock searcher into a
//! dispatcher and a job worker, with backoff short enough to wait out.

use std::sync::Arc;
use std::time::Duration;

use research::testing::{fast_limiters, sample_interview, MockGenerator, MockWebSearcher};
use research::{PostId, RunId, StepChain, WebSearcher};
use server_core::domains::generation::{
    DispatcherConfig, GenerationDispatcher, GenerationHandler, MemoryPostStore, MemoryRunStore,
    PipelineRun, PostStore, RunStore,
};
use server_core::kernel::jobs::{JobCounts, JobStore, JobWorker, JobWorkerConfig, MemoryJobStore, RetryPolicy};
use tokio_util::sync::CancellationToken;

pub struct TestHarness {
    pub jobs: Arc<MemoryJobStore>,
    pub runs: Arc<MemoryRunStore>,
    pub posts: Arc<MemoryPostStore>,
    pub dispatcher: Arc<GenerationDispatcher>,
    pub generator: Arc<MockGenerator>,
    pub worker: JobWorker,
    pub shutdown: CancellationToken,
}

/// Retries after 10ms, 20ms...
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
    }
}

pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        retry: fast_retry(),
        ..DispatcherConfig::default()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_providers(test_config(), MockGenerator::new(), Arc::new(MockWebSearcher::new()))
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self::with_providers(config, MockGenerator::new(), Arc::new(MockWebSearcher::new()))
    }

    pub fn with_generator(generator: MockGenerator) -> Self {
        Self::with_providers(test_config(), generator, Arc::new(MockWebSearcher::new()))
    }

    pub fn with_providers(
        config: DispatcherConfig,
        generator: MockGenerator,
        searcher: Arc<dyn WebSearcher>,
    ) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let jobs = Arc::new(MemoryJobStore::new());
        let runs = Arc::new(MemoryRunStore::new());
        let posts = Arc::new(MemoryPostStore::new());
        let generator = Arc::new(generator);

        let dispatcher = Arc::new(GenerationDispatcher::new(jobs.clone(), runs.clone(), config));

        let chain = StepChain::new(searcher, generator.clone(), &fast_limiters())
            .expect("limiters cover both providers");
        let handler = Arc::new(GenerationHandler::new(chain, posts.clone(), dispatcher.clone()));

        let worker = JobWorker::with_config(
            jobs.clone(),
            handler,
            dispatcher.clone(),
            JobWorkerConfig::with_worker_id("test-worker").with_batch_size(10),
        );

        Self {
            jobs,
            runs,
            posts,
            dispatcher,
            generator,
            worker,
            shutdown: CancellationToken::new(),
        }
    }

    /// A post with the sample interview saved.
    pub async fn post(&self) -> PostId {
        let post_id = PostId::new();
        self.posts
            .save_interview(post_id, &sample_interview())
            .await
            .expect("save interview");
        post_id
    }

    pub async fn run(&self, post_id: PostId) -> PipelineRun {
        self.dispatcher.pipeline(post_id).await.expect("run exists")
    }

    pub async fn run_by_id(&self, run_id: RunId) -> PipelineRun {
        self.runs
            .find(run_id)
            .await
            .expect("run store")
            .expect("run exists")
    }

    pub async fn counts(&self, post_id: PostId) -> JobCounts {
        let run = self.run(post_id).await;
        self.jobs
            .counts_for_run(run.id.into_uuid())
            .await
            .expect("counts")
    }

    /// Run the worker until the post's current run has no pending or
    /// running jobs left.
    pub async fn drain(&self, post_id: PostId) {
        for _ in 0..300 {
            let processed = self
                .worker
                .run_once(&self.shutdown)
                .await
                .expect("worker pass");
            if processed == 0 {
                if self.counts(post_id).await.outstanding() == 0 {
                    return;
                }
                // Waiting out a retry backoff.
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        panic!("jobs for post {} did not finish", post_id);
    }
}
