use crate::{auth::AuthenticatedUser, create_success_response, error::ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use rizz_common::ApiResponse;
use rizz_core::rizz::{TipRequest, TipResponse};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new().route("/tips", post(generate_tips))
}

async fn generate_tips(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(request): Json<TipRequest>,
) -> ApiResult<Json<ApiResponse<TipResponse>>> {
    info!("Tip request from user {} ({:?})", user.id, request.tone);
    let response = state.core.rizz.generate(user.id, request).await?;
    Ok(create_success_response(response))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{MockTestTipModel, TestApp};
    use axum::http::StatusCode;
    use rizz_common::RizzError;
    use serde_json::json;

    #[tokio::test]
    async fn test_generate_tips_charges_one_credit() {
        let app = TestApp::new().await;
        let token = app.token("user_tips");

        let (status, body) = app
            .post(
                "/api/v1/rizz/tips",
                Some(&token),
                json!({ "situation": "First message to a match who loves music", "tone": "playful" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tips"][0], "Ask about her weekend");
        assert_eq!(body["data"]["tips"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["data"]["credits_remaining"], 9);
    }

    #[tokio::test]
    async fn test_out_of_credits() {
        let app = TestApp::new().await;
        let token = app.token("user_broke");
        let (_, me) = app.get("/api/v1/me", Some(&token)).await;
        let user_id = me["data"]["user"]["id"].as_str().unwrap().parse().unwrap();
        app.state.core.storage.consume_credits(user_id, 10).await.unwrap();

        let (status, body) = app
            .post("/api/v1/rizz/tips", Some(&token), json!({ "situation": "Asking for a second date" }))
            .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error_code"], "INSUFFICIENT_CREDITS");
    }

    #[tokio::test]
    async fn test_model_failure_refunds_credit() {
        let mut model = MockTestTipModel::new();
        model
            .expect_complete()
            .returning(|_, _| Err(RizzError::Generation("upstream timeout".to_string())));
        let app = TestApp::with_tip_model(model).await;
        let token = app.token("user_refund");

        let (status, body) = app
            .post("/api/v1/rizz/tips", Some(&token), json!({ "situation": "Planning a cooking date" }))
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error_code"], "GENERATION_FAILED");

        let (_, credits) = app.get("/api/v1/me/credits", Some(&token)).await;
        assert_eq!(credits["data"]["balance"], 10);
    }

    #[tokio::test]
    async fn test_empty_situation_rejected() {
        let app = TestApp::new().await;
        let token = app.token("user_quiet");

        let (status, _) = app
            .post("/api/v1/rizz/tips", Some(&token), json!({ "situation": "   " }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
