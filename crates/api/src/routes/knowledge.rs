use crate::{auth::AuthenticatedUser, create_success_response, error::ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use rizz_common::{ApiResponse, KnowledgeCategory, KnowledgeRecord, ScoredKnowledge};
use rizz_core::knowledge::Contribution;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub category: Option<KnowledgeCategory>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SampleQuery {
    pub category: Option<KnowledgeCategory>,
    pub language: Option<String>,
    pub count: Option<usize>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_own).post(contribute))
        .route("/search", get(search))
        .route("/sample", get(sample))
        .route("/:id", delete(delete_record))
}

async fn list_own(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<KnowledgeRecord>>>> {
    let records = state
        .core
        .knowledge
        .list_own(user.id, query.limit.unwrap_or(50))
        .await?;
    Ok(create_success_response(records))
}

async fn contribute(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(contribution): Json<Contribution>,
) -> ApiResult<Json<ApiResponse<KnowledgeRecord>>> {
    let record = state.core.knowledge.contribute(&user, contribution).await?;
    Ok(create_success_response(record))
}

async fn search(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let results: Vec<ScoredKnowledge> = state
        .core
        .knowledge
        .search(&user, &query.q, query.category, query.limit.unwrap_or(5))
        .await?;

    Ok(create_success_response(json!({
        "total": results.len(),
        "results": results,
    })))
}

async fn sample(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Query(query): Query<SampleQuery>,
) -> ApiResult<Json<ApiResponse<Vec<KnowledgeRecord>>>> {
    let records = state
        .core
        .knowledge
        .sample(&user, query.category, query.language, query.count.unwrap_or(3))
        .await?;
    Ok(create_success_response(records))
}

async fn delete_record(
    State(state): State<AppState>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.core.knowledge.delete(&user, id).await?;
    Ok(create_success_response(json!({ "deleted": id })))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_contribute_and_search() {
        let app = TestApp::new().await;
        let token = app.token("user_kb");

        let (status, created) = app
            .post(
                "/api/v1/knowledge",
                Some(&token),
                json!({ "content": "Enjoys cooking Levantine food", "category": "interest" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["data"]["status"], "approved");

        let (status, body) = app
            .get("/api/v1/knowledge/search?q=cooking%20date&limit=3", Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["results"][0]["record"]["id"], created["data"]["id"]);

        let (status, _) = app.get("/api/v1/knowledge/search?q=%20", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_global_contribution_needs_approval() {
        let app = TestApp::new().await;
        let member = app.token("user_member");
        let admin = app.admin_token("user_admin").await;

        let (_, created) = app
            .post(
                "/api/v1/knowledge",
                Some(&member),
                json!({ "content": "Music festivals make great dates", "category": "dating_tip", "global": true }),
            )
            .await;
        assert_eq!(created["data"]["status"], "pending");
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (_, sample) = app.get("/api/v1/knowledge/sample?count=5", Some(&member)).await;
        assert_eq!(sample["data"].as_array().map(Vec::len), Some(0));

        let (status, _) = app
            .put(
                &format!("/api/v1/admin/knowledge/{}/status", id),
                Some(&member),
                json!({ "status": "approved" }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .put(
                &format!("/api/v1/admin/knowledge/{}/status", id),
                Some(&admin),
                json!({ "status": "approved" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, sample) = app
            .get("/api/v1/knowledge/sample?category=dating_tip", Some(&member))
            .await;
        assert_eq!(sample["data"][0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_delete_only_own_records() {
        let app = TestApp::new().await;
        let owner = app.token("user_owner");
        let other = app.token("user_other");

        let (_, created) = app
            .post(
                "/api/v1/knowledge",
                Some(&owner),
                json!({ "content": "Prefers quiet cafes", "category": "preference" }),
            )
            .await;
        let uri = format!("/api/v1/knowledge/{}", created["data"]["id"].as_str().unwrap());

        let (status, _) = app.delete(&uri, Some(&other)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.delete(&uri, Some(&owner)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.delete(&uri, Some(&owner)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
