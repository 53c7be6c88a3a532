use crate::{
    middleware::{
        compression_layer, cors_layer, rate_limiting_middleware, request_id_middleware,
        request_logging_middleware, request_size_middleware, security_headers_middleware,
        timeout_layer, RateLimiter,
    },
    routes::create_routes,
    ApiConfig, AppState,
};
use axum::{extract::DefaultBodyLimit, Router};
use rizz_core::storage::StorageStatus;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
    rate_limiter: Arc<RateLimiter>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_requests_per_minute,
            Duration::from_secs(60),
        ));

        Self {
            config,
            state,
            rate_limiter,
        }
    }

    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.router();

        info!("CORS origins: {:?}", self.config.cors_origins);
        self.start_background_tasks();

        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!("API server listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("API server stopped");
        Ok(())
    }

    /// The full application: routes plus the middleware stack.
    pub fn router(&self) -> Router {
        create_routes(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.max_request_size))
            .layer(
                ServiceBuilder::new()
                    // Outermost layers first
                    .layer(TraceLayer::new_for_http())
                    .layer(timeout_layer(self.config.request_timeout_secs))
                    .layer(compression_layer())
                    .layer(cors_layer(&self.config))
                    .layer(axum::middleware::from_fn(security_headers_middleware))
                    .layer(axum::middleware::from_fn_with_state(
                        self.config.max_request_size,
                        request_size_middleware,
                    ))
                    .layer(axum::middleware::from_fn_with_state(
                        self.rate_limiter.clone(),
                        rate_limiting_middleware,
                    ))
                    .layer(axum::middleware::from_fn(request_id_middleware))
                    .layer(axum::middleware::from_fn(request_logging_middleware)),
            )
    }

    fn start_background_tasks(&self) {
        let rate_limiter = self.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let tracked = rate_limiter.cleanup_old_entries();
                debug!("Rate limiter tracking {} clients", tracked);
            }
        });

        let core = self.state.core.clone();
        let purge_every = Duration::from_secs(self.config.event_purge_interval_secs.max(60));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(purge_every);
            loop {
                interval.tick().await;
                if let Err(e) = core.events.purge_expired().await {
                    error!("Error purging expired events: {}", e);
                }
            }
        });

        info!("Background tasks started");
    }

    pub async fn health_check(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let storage_health = self.state.core.storage.health_check().await?;
        if storage_health.status != StorageStatus::Healthy {
            error!("Storage health check failed: {:?}", storage_health);
            return Err("Storage health check failed".into());
        }

        let database_health = self.state.database.health_check().await?;
        if !database_health.is_healthy {
            error!("Database health check failed: {:?}", database_health.error_message);
            return Err("Database health check failed".into());
        }

        info!("API server health check passed");
        Ok(())
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
