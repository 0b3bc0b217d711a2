//! End-to-end behaviour of the step chain against mock providers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use research::testing::{fast_limiters, sample_interview, MockGenerator, MockWebSearcher};
use research::{
    ChainConfig, Checkpoint, GatherPolicy, LimiterRegistry, NoCheckpoint, PipelineError, Provider,
    Step, StepChain,
};

fn chain(
    searcher: Arc<MockWebSearcher>,
    generator: Arc<MockGenerator>,
    limiters: &LimiterRegistry,
) -> StepChain {
    StepChain::new(searcher, generator, limiters).unwrap()
}

#[tokio::test]
async fn online_marketing_interview_runs_end_to_end() {
    let searcher = Arc::new(MockWebSearcher::new());
    let generator = Arc::new(MockGenerator::new());
    let limiters = LimiterRegistry::new()
        .with_limit(Provider::Search, 5)
        .unwrap()
        .with_limit(Provider::Generation, 1000)
        .unwrap();
    let chain = chain(searcher.clone(), generator.clone(), &limiters);

    let output = chain.run(&sample_interview(), &NoCheckpoint).await.unwrap();

    // Plan: 1-15 distinct, non-empty queries.
    let queries = output.plan.queries();
    assert!((1..=15).contains(&queries.len()));
    assert!(queries.iter().all(|q| !q.trim().is_empty()));
    let distinct: HashSet<_> = queries.iter().collect();
    assert_eq!(distinct.len(), queries.len());
    assert_eq!(queries.len(), 12);

    // Gathering: plan order, and at least two throttle windows at 5/s.
    let gathered: Vec<&str> = output.results.iter().map(|r| r.query.as_str()).collect();
    assert_eq!(gathered, queries.iter().map(String::as_str).collect::<Vec<_>>());
    let instants = searcher.call_instants();
    assert_eq!(instants.len(), 12);
    let span = instants[11].duration_since(instants[0]);
    assert!(span >= Duration::from_millis(1990), "gathering took only {:?}", span);

    // Cleaning ran on the page text.
    assert!(output.results[0].hits.iter().all(|h| !h.text.contains('<')));

    // Summaries are 1:1 and in order.
    assert_eq!(output.summaries.len(), output.results.len());
    for (summary, result) in output.summaries.iter().zip(&output.results) {
        assert_eq!(summary.position, result.position);
    }

    // Optimization never grows and is sorted by relevance.
    assert!(output.optimized.len() <= output.summaries.len());
    assert!(!output.optimized.is_empty());
    assert!(output
        .optimized
        .entries
        .windows(2)
        .all(|w| w[0].relevance >= w[1].relevance));

    assert_eq!(output.script.title, "Guide to online marketing");
    assert_eq!(output.script.language, "es");
    assert_eq!(output.script.outline.len(), 3);
    assert_eq!(output.script.prompt_hash.len(), 64);
}

#[tokio::test]
async fn failing_query_fails_the_gathering_step() {
    let searcher = Arc::new(MockWebSearcher::new().failing_on("b"));
    let generator = Arc::new(MockGenerator::new().with_plan(["a", "b", "c"]));
    let chain = chain(searcher.clone(), generator, &fast_limiters());

    let err = chain.run(&sample_interview(), &NoCheckpoint).await.unwrap_err();

    match err {
        PipelineError::PartialResearch { query, source } => {
            assert_eq!(query, "b");
            assert!(source.is_retryable());
        }
        other => panic!("unexpected error: {other}"),
    }
    // "c" was never searched.
    assert_eq!(searcher.queries(), vec!["online marketing", "a", "b"]);
}

#[tokio::test]
async fn best_effort_marks_skipped_queries() {
    let searcher = Arc::new(MockWebSearcher::new().failing_on("b"));
    let generator = Arc::new(MockGenerator::new().with_plan(["a", "b", "c"]));
    let chain = chain(searcher, generator, &fast_limiters()).with_config(ChainConfig {
        gather_policy: GatherPolicy::BestEffort,
        ..ChainConfig::default()
    });

    let output = chain.run(&sample_interview(), &NoCheckpoint).await.unwrap();

    assert_eq!(output.results.len(), 4);
    assert!(output.results[2].is_skipped());
    assert!(output.results[2].skipped.as_deref().unwrap_or("").contains("failed"));
    assert!(output.summaries[2].skipped);
    assert!(output.optimized.entries.iter().all(|e| e.summary.position != 2));
}

struct CancelBefore(Step);

#[async_trait]
impl Checkpoint for CancelBefore {
    async fn before_step(&self, step: Step) -> research::Result<()> {
        if step == self.0 {
            Err(PipelineError::Cancelled {
                step: step.name().to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn cancellation_stops_before_the_next_step() {
    let searcher = Arc::new(MockWebSearcher::new());
    let generator = Arc::new(MockGenerator::new().with_plan(["a", "b"]));
    let chain = chain(searcher.clone(), generator.clone(), &fast_limiters());

    let err = chain
        .run(&sample_interview(), &CancelBefore(Step::Summarize))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    // Planning and gathering completed; summarizing never called the generator.
    assert_eq!(generator.call_count(), 1);
    assert_eq!(searcher.queries().len(), 3);
}

#[tokio::test]
async fn slow_generator_times_out_as_transient() {
    let generator = Arc::new(MockGenerator::new().with_delay(Duration::from_millis(300)));
    let chain = chain(Arc::new(MockWebSearcher::new()), generator, &fast_limiters()).with_config(
        ChainConfig {
            generation_timeout: Duration::from_millis(50),
            ..ChainConfig::default()
        },
    );

    let err = chain.build_research_plan(&sample_interview()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Timeout { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn steps_can_be_rerun_with_the_same_inputs() {
    let generator = Arc::new(MockGenerator::new().with_plan(["a", "b"]));
    let chain = chain(Arc::new(MockWebSearcher::new()), generator, &fast_limiters());
    let interview = sample_interview();

    let plan = chain.build_research_plan(&interview).await.unwrap();
    let first = chain.gather_research(&plan).await.unwrap();
    let second = chain.gather_research(&plan).await.unwrap();
    assert_eq!(first, second);

    let summaries = chain.summarize_research(&interview, &first).await.unwrap();
    assert_eq!(
        chain.optimize_serp(&interview, &summaries),
        chain.optimize_serp(&interview, &summaries)
    );
}

#[tokio::test]
async fn missing_limiter_is_a_configuration_error() {
    let limiters = LimiterRegistry::new().with_limit(Provider::Search, 5).unwrap();

    let result = StepChain::new(
        Arc::new(MockWebSearcher::new()),
        Arc::new(MockGenerator::new()),
        &limiters,
    );

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}
