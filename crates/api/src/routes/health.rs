use crate::{create_success_response, AppState, HealthCheck, ServiceHealth};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rizz_common::ApiResponse;
use rizz_core::storage::StorageStatus;
use serde_json::json;
use tracing::debug;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

async fn database_status(state: &AppState) -> &'static str {
    match state.database.health_check().await {
        Ok(health) if health.is_healthy => "healthy",
        Ok(health) if health.error_message.is_none() => "degraded",
        _ => "unhealthy",
    }
}

async fn storage_status(state: &AppState) -> &'static str {
    match state.core.storage.health_check().await {
        Ok(health) => match health.status {
            StorageStatus::Healthy => "healthy",
            StorageStatus::Degraded => "degraded",
            StorageStatus::Unhealthy => "unhealthy",
        },
        Err(_) => "unhealthy",
    }
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthCheck>> {
    debug!("Health check requested");

    let database = database_status(&state).await;
    let storage = storage_status(&state).await;
    let status = if database == "healthy" && storage == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    let health = HealthCheck {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.started_at.elapsed().as_secs(),
        services: ServiceHealth {
            database: database.to_string(),
            storage: storage.to_string(),
        },
    };

    create_success_response(health)
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    debug!("Readiness check requested");

    let database_ready = database_status(&state).await != "unhealthy";
    let storage_ready = storage_status(&state).await == "healthy";
    let ready = database_ready && storage_ready;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "timestamp": chrono::Utc::now(),
            "checks": {
                "database": if database_ready { "ready" } else { "not_ready" },
                "storage": if storage_ready { "ready" } else { "not_ready" }
            }
        })),
    )
}

async fn liveness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now(),
        "uptime_seconds": state.started_at.elapsed().as_secs()
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestApp;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_check() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["services"]["database"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_check() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/health/ready", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_readiness_fails_when_database_closed() {
        let app = TestApp::new().await;
        app.state.database.close().await;

        let (status, body) = app.get("/health/ready", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");
    }

    #[tokio::test]
    async fn test_liveness_check() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/health/live", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "alive");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/nope", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "NOT_FOUND");
    }
}
