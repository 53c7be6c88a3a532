use crate::{auth::AuthenticatedUser, create_success_response, error::ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use rizz_common::ApiResponse;
use rizz_core::onboarding::{OnboardingAnswers, OnboardingResult};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(submit_onboarding))
}

async fn submit_onboarding(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(answers): Json<OnboardingAnswers>,
) -> ApiResult<Json<ApiResponse<OnboardingResult>>> {
    let result = state.core.onboarding.submit(user.id, answers).await?;
    Ok(create_success_response(result))
}
