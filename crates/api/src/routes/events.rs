use crate::{
    auth::AuthenticatedUser, create_success_response, error::ApiResult, middleware::client_address,
    AppState,
};
use axum::{
    extract::{ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap},
    routing::post,
    Json, Router,
};
use rizz_common::{ApiResponse, Event};
use rizz_core::events::PageView;
use std::net::SocketAddr;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(record_page_view))
}

/// Anonymous visitors are welcome; a valid token attributes the view to its user.
async fn record_page_view(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    user: Option<AuthenticatedUser>,
    Json(mut view): Json<PageView>,
) -> ApiResult<Json<ApiResponse<Event>>> {
    view.user_id = user.map(|u| u.user.id);
    view.client_addr = client_address(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    view.user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let event = state.core.events.record_page_view(view).await?;
    Ok(create_success_response(event))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_anonymous_page_view() {
        let app = TestApp::new().await;

        let (status, body) = app
            .post("/api/v1/events", None, json!({ "path": "/pricing", "referrer": "https://t.co" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "page_view");
        assert!(body["data"]["user_id"].is_null());
    }

    #[tokio::test]
    async fn test_page_view_attributed_to_user() {
        let app = TestApp::new().await;
        let token = app.token("user_reader");

        let (status, body) = app
            .post("/api/v1/events", Some(&token), json!({ "path": "/tips" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["user_id"].is_string());
    }

    #[tokio::test]
    async fn test_relative_path_rejected() {
        let app = TestApp::new().await;
        let (status, _) = app
            .post("/api/v1/events", None, json!({ "path": "pricing" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
