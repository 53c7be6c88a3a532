pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

use axum::Json;
use rizz_common::ApiResponse;
use rizz_core::{database::DatabaseManager, RizzCore};
use std::sync::Arc;
use std::time::Instant;

pub use server::ApiServer;

pub use rizz_common;
pub use rizz_core;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_request_size: usize,
    pub rate_limit_requests_per_minute: u32,
    pub request_timeout_secs: u64,
    pub event_purge_interval_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            max_request_size: 1024 * 1024, // 1MB
            rate_limit_requests_per_minute: 60,
            request_timeout_secs: 60,
            event_purge_interval_secs: 3600,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RizzCore>,
    pub database: Arc<DatabaseManager>,
    pub auth: Arc<auth::AuthService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        core: Arc<RizzCore>,
        database: Arc<DatabaseManager>,
        auth: Arc<auth::AuthService>,
    ) -> Self {
        Self {
            core,
            database,
            auth,
            started_at: Instant::now(),
        }
    }
}

#[derive(serde::Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub uptime: u64,
    pub services: ServiceHealth,
}

#[derive(serde::Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub storage: String,
}

pub fn create_success_response<T: serde::Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}
