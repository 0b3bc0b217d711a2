// Main entry point for API server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use research::ai::OpenAiGenerator;
use research::{StepChain, TavilyWebSearcher};
use server_core::domains::generation::{
    DispatcherConfig, GenerationDispatcher, GenerationHandler, MemoryPostStore, MemoryRunStore,
    PostStore, PostgresPostStore, PostgresRunStore, RunStore,
};
use server_core::kernel::jobs::{
    run_retention, JobStore, JobWorker, MemoryJobStore, PostgresJobStore, RetentionPolicy,
};
use server_core::{server::build_app, server::AppState, Config};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Stores {
    jobs: Arc<dyn JobStore>,
    runs: Arc<dyn RunStore>,
    posts: Arc<dyn PostStore>,
    pool: Option<PgPool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,research=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting blog post generation API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let stores = connect_stores(&config).await?;
    let dispatcher = Arc::new(GenerationDispatcher::new(
        stores.jobs.clone(),
        stores.runs.clone(),
        DispatcherConfig::from(&config),
    ));

    let shutdown = CancellationToken::new();
    let mut workers = Vec::new();

    match (&config.openai_api_key, &config.tavily_api_key) {
        (Some(openai_key), Some(tavily_key)) => {
            let limiters = config.limiters()?;
            let generator = OpenAiGenerator::new(openai_key.clone()).with_model(&config.openai_model);
            let chain = StepChain::new(
                Arc::new(TavilyWebSearcher::new(tavily_key.clone())),
                Arc::new(generator),
                &limiters,
            )
            .context("Failed to build step chain")?
            .with_config(config.chain_config());

            let handler = Arc::new(GenerationHandler::new(
                chain,
                stores.posts.clone(),
                dispatcher.clone(),
            ));

            for index in 0..config.worker_count {
                let worker = JobWorker::with_config(
                    stores.jobs.clone(),
                    handler.clone(),
                    dispatcher.clone(),
                    config.worker_config(index),
                );
                workers.push(tokio::spawn(worker.run(shutdown.clone())));
            }
            tracing::info!(workers = config.worker_count, "Job workers started");
        }
        _ => {
            tracing::warn!("OPENAI_API_KEY or TAVILY_API_KEY not set; jobs will be queued but not run");
        }
    }

    let retention = tokio::spawn(run_retention(
        stores.jobs.clone(),
        RetentionPolicy::default(),
        Duration::from_secs(3600),
        shutdown.clone(),
    ));

    // Build application
    let app = build_app(AppState {
        dispatcher,
        posts: stores.posts,
        db_pool: stores.pool,
    });

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    for worker in workers {
        match worker.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Job worker stopped with error"),
            Err(e) => tracing::error!(error = %e, "Job worker panicked"),
            Ok(Ok(())) => {}
        }
    }
    if let Err(e) = retention.await {
        tracing::error!(error = %e, "Retention task panicked");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn connect_stores(config: &Config) -> Result<Stores> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set; using in-memory stores");
        return Ok(Stores {
            jobs: Arc::new(MemoryJobStore::new()),
            runs: Arc::new(MemoryRunStore::new()),
            posts: Arc::new(MemoryPostStore::new()),
            pool: None,
        });
    };

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    Ok(Stores {
        jobs: Arc::new(PostgresJobStore::new(pool.clone())),
        runs: Arc::new(PostgresRunStore::new(pool.clone())),
        posts: Arc::new(PostgresPostStore::new(pool.clone())),
        pool: Some(pool),
    })
}

/// Resolves on Ctrl-C and tells workers to wind down.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
