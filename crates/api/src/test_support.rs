use crate::{
    auth::{AuthConfig, AuthService},
    routes::create_routes,
    AppState,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use mockall::mock;
use rizz_common::{Result, UserRole};
use rizz_core::{
    database::{DatabaseConfig, DatabaseManager},
    rizz::TipModel,
    CoreConfig, RizzCore,
};
use rizz_knowledge::Embedder;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

mock! {
    pub TestEmbedder {}

    #[async_trait]
    impl Embedder for TestEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>>;
        fn model_name(&self) -> &str;
        fn dimension(&self) -> usize;
    }
}

mock! {
    pub TestTipModel {}

    #[async_trait]
    impl TipModel for TestTipModel {
        async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
    }
}

const KEYWORDS: [&str; 3] = ["hiking", "cooking", "music"];

pub fn keyword_embedder() -> MockTestEmbedder {
    let mut embedder = MockTestEmbedder::new();
    embedder.expect_embed().returning(|text| {
        let text = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
            .chain(std::iter::once(0.1))
            .collect())
    });
    embedder.expect_dimension().return_const(KEYWORDS.len() + 1);
    embedder
        .expect_model_name()
        .return_const("keyword-test".to_string());
    embedder
}

pub fn canned_tip_model() -> MockTestTipModel {
    let mut model = MockTestTipModel::new();
    model
        .expect_complete()
        .returning(|_, _| Ok("1. Ask about her weekend\n2. Share a playlist".to_string()));
    model
}

pub struct TestApp {
    _dir: TempDir,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_tip_model(canned_tip_model()).await
    }

    pub async fn with_tip_model(model: MockTestTipModel) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let database = DatabaseManager::new(DatabaseConfig {
            database_url: format!("sqlite:{}", dir.path().join("api.db").display()),
            max_connections: 5,
            min_connections: 1,
            ..DatabaseConfig::default()
        })
        .await
        .unwrap();

        let core = RizzCore::new(
            &database,
            Arc::new(keyword_embedder()),
            Arc::new(model),
            CoreConfig::default(),
        );

        let state = AppState::new(
            Arc::new(core),
            Arc::new(database),
            Arc::new(AuthService::new(AuthConfig::default())),
        );
        let router = create_routes(state.clone());

        Self {
            _dir: dir,
            state,
            router,
        }
    }

    pub fn token(&self, subject: &str) -> String {
        self.state
            .auth
            .issue_token(subject, &format!("{}@example.com", subject), Some(subject))
            .unwrap()
    }

    /// Token for a subject whose account already holds the admin role.
    pub async fn admin_token(&self, subject: &str) -> String {
        let token = self.token(subject);
        let claims = self.state.auth.verify_token(&token).unwrap();
        let user = self
            .state
            .core
            .storage
            .upsert_user(&claims.new_user())
            .await
            .unwrap();
        self.state
            .core
            .storage
            .set_role(user.id, UserRole::Admin)
            .await
            .unwrap();
        token
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }
}
