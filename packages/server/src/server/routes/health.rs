use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Returns 200 OK when the store is reachable, 503 Service Unavailable
/// otherwise. In-memory deployments are always healthy.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_health = match &state.db_pool {
        None => DatabaseHealth {
            status: "memory".to_string(),
            error: None,
        },
        Some(pool) => match tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sqlx::query("SELECT 1").execute(pool),
        )
        .await
        {
            Ok(Ok(_)) => DatabaseHealth {
                status: "ok".to_string(),
                error: None,
            },
            Ok(Err(e)) => DatabaseHealth {
                status: "error".to_string(),
                error: Some(format!("Query failed: {}", e)),
            },
            Err(_) => DatabaseHealth {
                status: "error".to_string(),
                error: Some("Query timeout (>5s)".to_string()),
            },
        },
    };

    let is_healthy = db_health.status != "error";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            database: db_health,
        }),
    )
}
