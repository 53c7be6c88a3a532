use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use rizz_common::{Result, RizzError, ScoredKnowledge, User};
use rizz_knowledge::document_processor::{normalize_text, preview};
use rizz_knowledge::{KnowledgeRetriever, SearchFilter, Visibility};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::credits::CreditLedger;
use crate::storage::Storage;

pub const TIP_CREDIT_COST: i64 = 1;
pub const MAX_SITUATION_CHARS: usize = 1000;
pub const MAX_TIPS: usize = 5;
const DEFAULT_TIP_COUNT: usize = 3;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TipModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Knowledge records retrieved to ground each request.
    pub grounding_limit: usize,
    pub grounding_min_score: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 800,
            temperature: 0.8,
            grounding_limit: 5,
            grounding_min_score: 0.2,
        }
    }
}

pub struct OpenAiTipModel {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiTipModel {
    pub fn new(config: &GenerationConfig) -> Self {
        let mut openai_config = match &config.api_key {
            Some(key) => OpenAIConfig::new().with_api_key(key),
            // Falls back to OPENAI_API_KEY
            None => OpenAIConfig::new(),
        };
        if let Some(base) = &config.api_base {
            openai_config = openai_config.with_api_base(base);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

fn generation_error(e: impl std::fmt::Display) -> RizzError {
    RizzError::Generation(e.to_string())
}

#[async_trait]
impl TipModel for OpenAiTipModel {
    #[instrument(skip(self, system, prompt), fields(model = %self.model))]
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(generation_error)?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(generation_error)?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()
            .map_err(generation_error)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!("OpenAI API error: {}", e);
            generation_error(e)
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| RizzError::Generation("Model returned an empty response".to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipTone {
    #[default]
    Playful,
    Romantic,
    Confident,
    Respectful,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TipRequest {
    /// What the user is trying to say or the moment they are in.
    pub situation: String,
    #[serde(default)]
    pub tone: TipTone,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TipResponse {
    pub tips: Vec<String>,
    /// Knowledge records the prompt was grounded on.
    pub grounding: Vec<Uuid>,
    pub credits_remaining: i64,
}

pub struct RizzService {
    storage: Arc<dyn Storage>,
    credits: Arc<CreditLedger>,
    retriever: KnowledgeRetriever,
    model: Arc<dyn TipModel>,
    config: GenerationConfig,
}

impl RizzService {
    pub fn new(
        storage: Arc<dyn Storage>,
        credits: Arc<CreditLedger>,
        retriever: KnowledgeRetriever,
        model: Arc<dyn TipModel>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            storage,
            credits,
            retriever,
            model,
            config,
        }
    }

    /// Charges one credit up front and refunds it if generation fails.
    #[instrument(skip(self, request))]
    pub async fn generate(&self, user_id: Uuid, request: TipRequest) -> Result<TipResponse> {
        let situation = normalize_text(&request.situation);
        if situation.is_empty() {
            return Err(RizzError::Validation("Situation is required".to_string()));
        }
        if situation.chars().count() > MAX_SITUATION_CHARS {
            return Err(RizzError::Validation(format!(
                "Situation exceeds {} characters",
                MAX_SITUATION_CHARS
            )));
        }

        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| RizzError::NotFound(format!("User not found: {}", user_id)))?;

        let mut balance = self.credits.consume(user_id, TIP_CREDIT_COST).await?;

        match self.compose(&user, &situation, &request).await {
            Ok((tips, grounding)) => {
                info!("Generated {} tips for user {}", tips.len(), user_id);
                Ok(TipResponse {
                    tips,
                    grounding,
                    credits_remaining: balance,
                })
            }
            Err(e) => {
                warn!("Tip generation failed for user {}: {}", user_id, e);
                match self.credits.refund(user_id, TIP_CREDIT_COST).await {
                    Ok(refunded) => balance = refunded,
                    Err(refund_error) => {
                        error!("Failed to refund credit to user {}: {}", user_id, refund_error)
                    }
                }
                debug!("User {} balance after refund: {}", user_id, balance);
                Err(e)
            }
        }
    }

    async fn compose(
        &self,
        user: &User,
        situation: &str,
        request: &TipRequest,
    ) -> Result<(Vec<String>, Vec<Uuid>)> {
        let count = request.count.unwrap_or(DEFAULT_TIP_COUNT).clamp(1, MAX_TIPS);
        let language = request
            .language
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| user.profile.language_or_default());

        let filter = SearchFilter::new(Visibility::owner_and_global(user.id))
            .with_limit(self.config.grounding_limit)
            .with_min_score(self.config.grounding_min_score);

        // Grounding is best effort; an ungrounded tip is still useful.
        let grounding = match self.retriever.retrieve(situation, &filter).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Knowledge retrieval failed, generating without grounding: {}", e);
                Vec::new()
            }
        };

        let system = system_prompt(request.tone, language, count);
        let prompt = build_prompt(user, situation, &grounding);
        debug!("Tip prompt: {}", preview(&prompt, 200));

        let raw = self.model.complete(&system, &prompt).await?;
        let tips = parse_tips(&raw, count);
        if tips.is_empty() {
            return Err(RizzError::Generation("Model returned no tips".to_string()));
        }

        Ok((tips, grounding.iter().map(|g| g.record.id).collect()))
    }
}

fn system_prompt(tone: TipTone, language: &str, count: usize) -> String {
    let tone = match tone {
        TipTone::Playful => "playful and witty",
        TipTone::Romantic => "warm and romantic",
        TipTone::Confident => "confident but never arrogant",
        TipTone::Respectful => "respectful and sincere",
    };
    format!(
        "You are ArabianRizz, a dating coach who writes charming conversation lines. \
         Be {tone}, culturally aware and respectful of boundaries. Never be crude. \
         Reply in the language with code '{language}'. \
         Return exactly {count} suggestions as a numbered list, one per line, with no preamble."
    )
}

fn build_prompt(user: &User, situation: &str, grounding: &[ScoredKnowledge]) -> String {
    let mut prompt = String::new();

    let name = user
        .profile
        .first_name
        .as_deref()
        .unwrap_or(user.username.as_str());
    prompt.push_str(&format!("About the user ({}):\n", name));
    if grounding.is_empty() {
        prompt.push_str("- No profile details available.\n");
    }
    for item in grounding {
        prompt.push_str(&format!("- {}\n", item.record.content));
    }

    prompt.push_str(&format!("\nSituation:\n{}\n", situation));
    prompt
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim();
        }
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim();
        }
    }
    line
}

/// Splits a model reply into list items, dropping markers and blank lines.
pub fn parse_tips(raw: &str, max: usize) -> Vec<String> {
    raw.lines()
        .map(strip_list_marker)
        .map(|line| line.trim_matches('"').trim())
        .filter(|line| !line.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::{new_user, test_storage};
    use crate::test_support::{keyword_embedder, MockTestEmbedder};
    use mockall::predicate::always;
    use rizz_common::{
        ApprovalStatus, KnowledgeCategory, KnowledgeSource, NewKnowledge, DEFAULT_CREDIT_BALANCE,
    };
    use rizz_knowledge::SqliteKnowledgeStore;

    fn request(situation: &str) -> TipRequest {
        TipRequest {
            situation: situation.to_string(),
            tone: TipTone::Playful,
            count: Some(2),
            language: None,
        }
    }

    #[test]
    fn test_parse_tips_strips_markers() {
        let raw = "1. Ask about her favourite hike\n\n2) \"Compliment the playlist\"\n- Suggest a cooking class\n3. Extra";
        assert_eq!(
            parse_tips(raw, 3),
            vec![
                "Ask about her favourite hike",
                "Compliment the playlist",
                "Suggest a cooking class",
            ]
        );
        assert_eq!(parse_tips("• One line", 5), vec!["One line"]);
        assert!(parse_tips("   \n  ", 3).is_empty());
    }

    #[test]
    fn test_numbers_without_marker_are_kept() {
        assert_eq!(parse_tips("2024 was great", 1), vec!["2024 was great"]);
    }

    #[tokio::test]
    async fn test_generate_consumes_credit_and_grounds_prompt() {
        let (_dir, db, storage) = test_storage().await;
        let storage = Arc::new(storage);
        let user = storage.upsert_user(&new_user("rizz_1")).await.unwrap();

        let retriever = KnowledgeRetriever::new(
            Arc::new(keyword_embedder()),
            Arc::new(SqliteKnowledgeStore::new(db.pool().clone())),
        );
        let fact = retriever
            .ingest(NewKnowledge {
                owner: Some(user.id),
                contributor: Some(user.id),
                content: "Loves hiking in Wadi Rum".to_string(),
                category: KnowledgeCategory::Interest,
                language: "en".to_string(),
                source: KnowledgeSource::Onboarding,
                status: ApprovalStatus::Approved,
            })
            .await
            .unwrap();

        let mut model = MockTipModel::new();
        model
            .expect_complete()
            .withf(|system, prompt| {
                system.contains("exactly 2 suggestions") && prompt.contains("Wadi Rum")
            })
            .times(1)
            .returning(|_, _| Ok("1. Invite her on a sunrise hike\n2. Ask about her best trail".to_string()));

        let service = RizzService::new(
            storage.clone(),
            Arc::new(CreditLedger::new(storage.clone())),
            retriever,
            Arc::new(model),
            GenerationConfig::default(),
        );

        let response = service
            .generate(user.id, request("Planning a hiking date"))
            .await
            .unwrap();
        assert_eq!(response.tips.len(), 2);
        assert_eq!(response.grounding, vec![fact.id]);
        assert_eq!(response.credits_remaining, DEFAULT_CREDIT_BALANCE - 1);
    }

    #[tokio::test]
    async fn test_generation_failure_refunds_credit() {
        let (_dir, db, storage) = test_storage().await;
        let storage = Arc::new(storage);
        let user = storage.upsert_user(&new_user("rizz_2")).await.unwrap();

        let mut model = MockTipModel::new();
        model
            .expect_complete()
            .with(always(), always())
            .returning(|_, _| Err(RizzError::Generation("rate limited".to_string())));

        let service = RizzService::new(
            storage.clone(),
            Arc::new(CreditLedger::new(storage.clone())),
            KnowledgeRetriever::new(
                Arc::new(keyword_embedder()),
                Arc::new(SqliteKnowledgeStore::new(db.pool().clone())),
            ),
            Arc::new(model),
            GenerationConfig::default(),
        );

        let result = service.generate(user.id, request("First message")).await;
        assert!(matches!(result, Err(RizzError::Generation(_))));

        let user = storage.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.credit_balance, DEFAULT_CREDIT_BALANCE);
    }

    #[tokio::test]
    async fn test_retrieval_failure_still_generates() {
        let (_dir, db, storage) = test_storage().await;
        let storage = Arc::new(storage);
        let user = storage.upsert_user(&new_user("rizz_3")).await.unwrap();

        let mut embedder = MockTestEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(RizzError::Embedding("timeout".to_string())));

        let mut model = MockTipModel::new();
        model
            .expect_complete()
            .withf(|_, prompt| prompt.contains("No profile details"))
            .returning(|_, _| Ok("- Say hi with a smile".to_string()));

        let service = RizzService::new(
            storage.clone(),
            Arc::new(CreditLedger::new(storage.clone())),
            KnowledgeRetriever::new(
                Arc::new(embedder),
                Arc::new(SqliteKnowledgeStore::new(db.pool().clone())),
            ),
            Arc::new(model),
            GenerationConfig::default(),
        );

        let response = service.generate(user.id, request("Opening line")).await.unwrap();
        assert_eq!(response.tips, vec!["Say hi with a smile"]);
        assert!(response.grounding.is_empty());
    }

    #[tokio::test]
    async fn test_no_credits_never_calls_model() {
        let (_dir, db, storage) = test_storage().await;
        let storage = Arc::new(storage);
        let user = storage.upsert_user(&new_user("rizz_4")).await.unwrap();
        storage
            .consume_credits(user.id, DEFAULT_CREDIT_BALANCE)
            .await
            .unwrap();

        let mut model = MockTipModel::new();
        model.expect_complete().never();

        let service = RizzService::new(
            storage.clone(),
            Arc::new(CreditLedger::new(storage.clone())),
            KnowledgeRetriever::new(
                Arc::new(keyword_embedder()),
                Arc::new(SqliteKnowledgeStore::new(db.pool().clone())),
            ),
            Arc::new(model),
            GenerationConfig::default(),
        );

        assert!(matches!(
            service.generate(user.id, request("Hello")).await,
            Err(RizzError::InsufficientCredits { .. })
        ));
        assert!(matches!(
            service.generate(user.id, request("   ")).await,
            Err(RizzError::Validation(_))
        ));
    }
}
