pub mod admin;
pub mod events;
pub mod health;
pub mod knowledge;
pub mod onboarding;
pub mod referrals;
pub mod rizz;
pub mod users;

use crate::{error::ApiError, AppState};
use axum::Router;
use rizz_common::RizzError;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // Health check routes (no authentication required)
        .nest("/health", health::routes())
        .nest("/api/v1", api_routes())
        .fallback(not_found_handler)
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/me", users::routes())
        .nest("/onboarding", onboarding::routes())
        .nest("/knowledge", knowledge::routes())
        .nest("/rizz", rizz::routes())
        .nest("/referrals", referrals::routes())
        .nest("/events", events::routes())
        .nest("/admin", admin::routes())
}

pub async fn not_found_handler() -> ApiError {
    ApiError::CoreService(RizzError::NotFound("Route not found".to_string()))
}
