use crate::{create_success_response, error::ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use rizz_common::{ApiResponse, ReferralItem};
use rizz_core::{referrals::ScoredReferral, storage::ReferralQuery};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct RecommendQuery {
    pub q: String,
    pub limit: Option<usize>,
}

/// Public catalog; no token needed to browse.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_referrals))
        .route("/recommend", get(recommend))
        .route("/:id", get(get_referral))
        .route("/:id/click", post(record_click))
}

async fn list_referrals(
    State(state): State<AppState>,
    Query(query): Query<ReferralQuery>,
) -> ApiResult<Json<ApiResponse<Vec<ReferralItem>>>> {
    let items = state.core.referrals.list(&query).await?;
    Ok(create_success_response(items))
}

async fn recommend(
    State(state): State<AppState>,
    Query(query): Query<RecommendQuery>,
) -> ApiResult<Json<ApiResponse<Vec<ScoredReferral>>>> {
    let items = state
        .core
        .referrals
        .recommend(&query.q, query.limit.unwrap_or(5))
        .await?;
    Ok(create_success_response(items))
}

async fn get_referral(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ReferralItem>>> {
    let item = state.core.referrals.get(id).await?;
    Ok(create_success_response(item))
}

async fn record_click(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let url = state.core.referrals.record_click(id).await?;
    Ok(create_success_response(json!({ "url": url })))
}
