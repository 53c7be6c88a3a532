use rizz_common::{
    ApprovalStatus, KnowledgeCategory, KnowledgeSource, NewKnowledge, Result, RizzError, User,
    UserProfile,
};
use rizz_knowledge::document_processor::normalize_text;
use rizz_knowledge::semantic_search::validate_fact;
use rizz_knowledge::KnowledgeRetriever;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::storage::Storage;

pub const MAX_INTERESTS: usize = 20;

/// Answers collected by the onboarding form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnboardingAnswers {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub ideal_partner: Option<String>,
    #[serde(default)]
    pub relationship_goal: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

fn filled(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(normalize_text)
        .filter(|v| !v.is_empty())
}

impl OnboardingAnswers {
    pub fn interests(&self) -> Vec<String> {
        let mut interests: Vec<String> = Vec::new();
        for interest in &self.interests {
            let interest = normalize_text(interest);
            if !interest.is_empty()
                && !interests.iter().any(|i| i.eq_ignore_ascii_case(&interest))
            {
                interests.push(interest);
            }
        }
        interests.truncate(MAX_INTERESTS);
        interests
    }

    /// One fact per filled answer. Fails when nothing was answered.
    pub fn facts(&self) -> Result<Vec<(KnowledgeCategory, String)>> {
        let mut facts = Vec::new();

        if let Some(bio) = filled(&self.bio) {
            facts.push((KnowledgeCategory::Profile, bio));
        }

        let interests = self.interests();
        if !interests.is_empty() {
            facts.push((
                KnowledgeCategory::Interest,
                format!("Interests: {}", interests.join(", ")),
            ));
        }

        if let Some(personality) = filled(&self.personality) {
            facts.push((KnowledgeCategory::Personality, personality));
        }

        if let Some(partner) = filled(&self.ideal_partner) {
            facts.push((
                KnowledgeCategory::Preference,
                format!("Ideal partner: {}", partner),
            ));
        }

        if let Some(goal) = filled(&self.relationship_goal) {
            facts.push((
                KnowledgeCategory::Preference,
                format!("Relationship goal: {}", goal),
            ));
        }

        if facts.is_empty() {
            return Err(RizzError::Validation(
                "Onboarding needs at least one answer".to_string(),
            ));
        }

        facts
            .into_iter()
            .map(|(category, text)| validate_fact(&text).map(|text| (category, text)))
            .collect()
    }

    /// Overlays the answers on an existing profile.
    pub fn apply_to(&self, mut profile: UserProfile) -> UserProfile {
        if let Some(first_name) = filled(&self.first_name) {
            profile.first_name = Some(first_name);
        }
        if let Some(last_name) = filled(&self.last_name) {
            profile.last_name = Some(last_name);
        }
        if self.age.is_some() {
            profile.age = self.age;
        }
        if let Some(gender) = filled(&self.gender) {
            profile.gender = Some(gender);
        }
        if let Some(bio) = filled(&self.bio) {
            profile.bio = Some(bio);
        }
        let interests = self.interests();
        if !interests.is_empty() {
            profile.interests = interests;
        }
        if let Some(goal) = filled(&self.relationship_goal) {
            profile.relationship_goal = Some(goal);
        }
        if let Some(language) = filled(&self.language) {
            profile.language = Some(language);
        }
        profile
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingResult {
    pub user: User,
    pub facts_stored: usize,
    pub facts_replaced: u64,
}

pub struct OnboardingService {
    storage: Arc<dyn Storage>,
    retriever: KnowledgeRetriever,
}

impl OnboardingService {
    pub fn new(storage: Arc<dyn Storage>, retriever: KnowledgeRetriever) -> Self {
        Self { storage, retriever }
    }

    /// Embeds every fact before writing anything, so a failed embedding
    /// leaves the previous onboarding knowledge untouched.
    #[instrument(skip(self, answers))]
    pub async fn submit(&self, user_id: Uuid, answers: OnboardingAnswers) -> Result<OnboardingResult> {
        if let Some(age) = answers.age {
            if !(18..=120).contains(&age) {
                return Err(RizzError::Validation("Age must be between 18 and 120".to_string()));
            }
        }

        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| RizzError::NotFound(format!("User not found: {}", user_id)))?;

        let profile = answers.apply_to(user.profile.clone());
        let language = profile.language_or_default().to_string();

        let facts = answers
            .facts()?
            .into_iter()
            .map(|(category, content)| NewKnowledge {
                owner: Some(user_id),
                contributor: Some(user_id),
                content,
                category,
                language: language.clone(),
                source: KnowledgeSource::Onboarding,
                status: ApprovalStatus::Approved,
            })
            .collect();

        let records = self.retriever.build_records(facts).await?;

        let replaced = self
            .retriever
            .store()
            .replace_owner_records(user_id, KnowledgeSource::Onboarding, &records)
            .await?;

        let user = self.storage.update_profile(user_id, &profile, true).await?;

        info!(
            "User {} onboarded with {} facts ({} replaced)",
            user_id,
            records.len(),
            replaced
        );

        Ok(OnboardingResult {
            user,
            facts_stored: records.len(),
            facts_replaced: replaced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::{new_user, test_storage};
    use crate::test_support::{keyword_embedder, MockTestEmbedder};
    use rizz_knowledge::{KnowledgeStore, SqliteKnowledgeStore};

    fn answers() -> OnboardingAnswers {
        OnboardingAnswers {
            first_name: Some("  Omar ".to_string()),
            age: Some(27),
            bio: Some("Engineer   who loves travel".to_string()),
            interests: vec!["hiking".to_string(), "Hiking".to_string(), " ".to_string(), "music".to_string()],
            relationship_goal: Some("Something serious".to_string()),
            language: Some("ar".to_string()),
            ..OnboardingAnswers::default()
        }
    }

    #[test]
    fn test_facts_skip_empty_answers() {
        let facts = answers().facts().unwrap();
        assert_eq!(
            facts,
            vec![
                (KnowledgeCategory::Profile, "Engineer who loves travel".to_string()),
                (KnowledgeCategory::Interest, "Interests: hiking, music".to_string()),
                (KnowledgeCategory::Preference, "Relationship goal: Something serious".to_string()),
            ]
        );
    }

    #[test]
    fn test_facts_require_an_answer() {
        let empty = OnboardingAnswers {
            bio: Some("   ".to_string()),
            ..OnboardingAnswers::default()
        };
        assert!(matches!(empty.facts(), Err(RizzError::Validation(_))));
    }

    #[test]
    fn test_apply_to_keeps_unanswered_fields() {
        let existing = UserProfile {
            last_name: Some("Haddad".to_string()),
            ..UserProfile::default()
        };
        let profile = answers().apply_to(existing);
        assert_eq!(profile.first_name.as_deref(), Some("Omar"));
        assert_eq!(profile.last_name.as_deref(), Some("Haddad"));
        assert_eq!(profile.interests, vec!["hiking", "music"]);
        assert_eq!(profile.language_or_default(), "ar");
    }

    #[tokio::test]
    async fn test_submit_replaces_previous_onboarding() {
        let (_dir, db, storage) = test_storage().await;
        let storage = Arc::new(storage);
        let user = storage.upsert_user(&new_user("onboard_1")).await.unwrap();
        let knowledge = Arc::new(SqliteKnowledgeStore::new(db.pool().clone()));
        let retriever = KnowledgeRetriever::new(Arc::new(keyword_embedder()), knowledge.clone());
        let service = OnboardingService::new(storage.clone(), retriever);

        let first = service.submit(user.id, answers()).await.unwrap();
        assert_eq!(first.facts_stored, 3);
        assert_eq!(first.facts_replaced, 0);
        assert!(first.user.onboarded);
        assert_eq!(first.user.profile.first_name.as_deref(), Some("Omar"));

        let second = service
            .submit(
                user.id,
                OnboardingAnswers {
                    personality: Some("Calm and curious".to_string()),
                    ..OnboardingAnswers::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.facts_stored, 1);
        assert_eq!(second.facts_replaced, 3);

        let records = knowledge.list_by_owner(user.id, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].language, "ar");
        assert_eq!(records[0].status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_state_untouched() {
        let (_dir, db, storage) = test_storage().await;
        let storage = Arc::new(storage);
        let user = storage.upsert_user(&new_user("onboard_2")).await.unwrap();

        let mut embedder = MockTestEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(RizzError::Embedding("service unavailable".to_string())));
        embedder.expect_dimension().return_const(5usize);
        embedder.expect_model_name().return_const("m".to_string());

        let knowledge = Arc::new(SqliteKnowledgeStore::new(db.pool().clone()));
        let service = OnboardingService::new(
            storage.clone(),
            KnowledgeRetriever::new(Arc::new(embedder), knowledge.clone()),
        );

        let result = service.submit(user.id, answers()).await;
        assert!(matches!(result, Err(RizzError::Embedding(_))));

        let user = storage.get_user(user.id).await.unwrap().unwrap();
        assert!(!user.onboarded);
        assert!(knowledge.list_by_owner(user.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_underage_and_unknown_user() {
        let (_dir, db, storage) = test_storage().await;
        let mut embedder = MockTestEmbedder::new();
        embedder.expect_embed().never();
        let service = OnboardingService::new(
            Arc::new(storage),
            KnowledgeRetriever::new(
                Arc::new(embedder),
                Arc::new(SqliteKnowledgeStore::new(db.pool().clone())),
            ),
        );

        let underage = OnboardingAnswers {
            age: Some(16),
            ..answers()
        };
        assert!(matches!(
            service.submit(Uuid::new_v4(), underage).await,
            Err(RizzError::Validation(_))
        ));
        assert!(matches!(
            service.submit(Uuid::new_v4(), answers()).await,
            Err(RizzError::NotFound(_))
        ));
    }
}
