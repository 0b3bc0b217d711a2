//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::domains::generation::{GenerationDispatcher, PostStore};
use crate::server::routes::{
    cancel_pipeline_handler, enqueue_generation_handler, get_job_handler, health_handler,
    list_artifacts_handler, pipeline_status_handler, put_interview_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<GenerationDispatcher>,
    pub posts: Arc<dyn PostStore>,
    /// Present when running against PostgreSQL.
    pub db_pool: Option<PgPool>,
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/posts/:post_id/interview", put(put_interview_handler))
        .route(
            "/posts/:post_id/generation-jobs",
            post(enqueue_generation_handler),
        )
        .route("/posts/:post_id/pipeline", get(pipeline_status_handler))
        .route(
            "/posts/:post_id/pipeline/cancel",
            post(cancel_pipeline_handler),
        )
        .route("/posts/:post_id/artifacts", get(list_artifacts_handler))
        .route("/jobs/:job_id", get(get_job_handler))
        .layer(Extension(state))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
