use crate::{auth::AuthenticatedUser, create_success_response, error::ApiResult, AppState};
use axum::{extract::State, routing::get, Json, Router};
use rizz_common::{ApiResponse, Plan, Purchase, User, UserProfile};
use rizz_core::credits::CreditLedger;
use serde::Serialize;
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_me).delete(delete_me))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/credits", get(get_credits))
}

#[derive(Serialize)]
struct MeResponse {
    user: User,
    plan: Option<&'static Plan>,
}

#[derive(Serialize)]
struct CreditsResponse {
    balance: i64,
    plan_id: i32,
    plans: &'static [Plan],
    purchases: Vec<Purchase>,
}

async fn get_me(AuthenticatedUser { user, .. }: AuthenticatedUser) -> Json<ApiResponse<MeResponse>> {
    let plan = CreditLedger::plan(user.plan_id);
    create_success_response(MeResponse { user, plan })
}

async fn delete_me(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.core.delete_user(user.id).await?;
    Ok(create_success_response(json!({ "deleted": user.id })))
}

async fn get_profile(AuthenticatedUser { user, .. }: AuthenticatedUser) -> Json<ApiResponse<UserProfile>> {
    create_success_response(user.profile)
}

async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(profile): Json<UserProfile>,
) -> ApiResult<Json<ApiResponse<User>>> {
    if let Some(age) = profile.age {
        if !(18..=120).contains(&age) {
            return Err(crate::error::validation_error("Age must be between 18 and 120"));
        }
    }

    let updated = state
        .core
        .storage
        .update_profile(user.id, &profile, false)
        .await?;
    Ok(create_success_response(updated))
}

async fn get_credits(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<CreditsResponse>>> {
    let purchases = state.core.credits.history(user.id).await?;
    Ok(create_success_response(CreditsResponse {
        balance: user.credit_balance,
        plan_id: user.plan_id,
        plans: CreditLedger::plans(),
        purchases,
    }))
}
