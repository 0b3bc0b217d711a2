//! Timing properties of the rolling-window rate limiter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use research::{throttled, PipelineError, RateLimiter};
use tokio::time::Instant;

#[tokio::test]
async fn twenty_five_items_at_ten_per_second() {
    let limiter = RateLimiter::new("search", 10).unwrap();
    let starts = Arc::new(Mutex::new(Vec::new()));
    let began = Instant::now();

    let recorded = starts.clone();
    let results = limiter
        .run(0..25, move |i| {
            recorded.lock().unwrap().push(Instant::now());
            async move { Ok::<_, PipelineError>(i) }
        })
        .await
        .unwrap();

    let elapsed = began.elapsed();
    assert_eq!(results, (0..25).collect::<Vec<_>>());
    assert!(elapsed >= Duration::from_millis(2000), "finished too early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(3000), "finished too late: {:?}", elapsed);

    // No eleven starts ever fit inside one second.
    let starts = starts.lock().unwrap();
    for pair in starts.windows(11) {
        assert!(pair[10].duration_since(pair[0]) >= Duration::from_millis(990));
    }
}

#[tokio::test]
async fn results_follow_input_order_even_when_completion_order_differs() {
    let limiter = RateLimiter::new("search", 50).unwrap();

    let results = limiter
        .run([30u64, 1, 20, 5], |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, PipelineError>(delay)
        })
        .await
        .unwrap();

    assert_eq!(results, vec![30, 1, 20, 5]);
}

#[tokio::test]
async fn zero_rate_touches_no_items() {
    let touched = Arc::new(Mutex::new(0usize));

    let counter = touched.clone();
    let result = throttled(0, 0..5, move |i| {
        *counter.lock().unwrap() += 1;
        async move { Ok::<_, PipelineError>(i) }
    })
    .await;

    assert!(matches!(result, Err(PipelineError::Configuration(_))));
    assert_eq!(*touched.lock().unwrap(), 0);
}

#[tokio::test]
async fn shared_limiter_throttles_concurrent_callers_together() {
    let limiter = Arc::new(RateLimiter::new("search", 4).unwrap());
    let began = Instant::now();

    let a = {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            limiter
                .run(0..4, |i| async move { Ok::<_, PipelineError>(i) })
                .await
        })
    };
    let b = {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            limiter
                .run(0..4, |i| async move { Ok::<_, PipelineError>(i) })
                .await
        })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // Eight starts at four per second need a second window.
    assert!(began.elapsed() >= Duration::from_millis(990));
}
