use crate::{auth::AdminUser, create_success_response, error::ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use rizz_common::{
    ApiResponse, ApprovalStatus, KnowledgeRecord, PathStat, ReferralDraft, ReferralItem, User,
    UserRole,
};
use rizz_core::credits::{PurchaseOutcome, PurchaseRequest};
use rizz_knowledge::KnowledgeStats;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: ApprovalStatus,
}

#[derive(Deserialize)]
pub struct RoleUpdate {
    pub role: UserRole,
}

#[derive(Deserialize)]
pub struct PendingQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub days: Option<i64>,
    pub limit: Option<usize>,
}

/// Every route here requires the admin role.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/knowledge/pending", get(pending_knowledge))
        .route("/knowledge/stats", get(knowledge_stats))
        .route("/knowledge/:id/status", put(set_knowledge_status))
        .route("/referrals", post(create_referral))
        .route("/referrals/:id", put(update_referral).delete(delete_referral))
        .route("/events/stats", get(event_stats))
        .route("/purchases", post(record_purchase))
        .route("/users/:id", get(get_user))
        .route("/users/:id/role", put(set_user_role))
}

async fn pending_knowledge(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Json<ApiResponse<Vec<KnowledgeRecord>>>> {
    let records = state.core.knowledge.pending(query.limit.unwrap_or(50)).await?;
    Ok(create_success_response(records))
}

async fn knowledge_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<ApiResponse<KnowledgeStats>>> {
    let stats = state.core.knowledge.stats().await?;
    Ok(create_success_response(stats))
}

async fn set_knowledge_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.core.knowledge.set_status(id, update.status).await?;
    info!("Admin {} set knowledge {} to {}", admin.id, id, update.status);
    Ok(create_success_response(json!({ "id": id, "status": update.status })))
}

async fn create_referral(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(draft): Json<ReferralDraft>,
) -> ApiResult<Json<ApiResponse<ReferralItem>>> {
    let item = state.core.referrals.create(draft).await?;
    Ok(create_success_response(item))
}

async fn update_referral(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(draft): Json<ReferralDraft>,
) -> ApiResult<Json<ApiResponse<ReferralItem>>> {
    let item = state.core.referrals.update(id, draft).await?;
    Ok(create_success_response(item))
}

async fn delete_referral(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.core.referrals.delete(id).await?;
    Ok(create_success_response(json!({ "deleted": id })))
}

async fn event_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<PathStat>>>> {
    let stats = state
        .core
        .events
        .stats(query.days.unwrap_or(7), query.limit.unwrap_or(20))
        .await?;
    Ok(create_success_response(stats))
}

async fn record_purchase(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<PurchaseRequest>,
) -> ApiResult<Json<ApiResponse<PurchaseOutcome>>> {
    info!(
        "Admin {} recording payment {} for user {}",
        admin.id, request.external_payment_id, request.user_id
    );
    let outcome = state.core.credits.record_purchase(request).await?;
    Ok(create_success_response(outcome))
}

async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = state.core.get_user(id).await?;
    Ok(create_success_response(user))
}

async fn set_user_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(update): Json<RoleUpdate>,
) -> ApiResult<Json<ApiResponse<User>>> {
    state.core.storage.set_role(id, update.role).await?;
    info!("Admin {} set role of {} to {}", admin.id, id, update.role);
    let user = state.core.get_user(id).await?;
    Ok(create_success_response(user))
}
