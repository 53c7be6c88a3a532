pub mod credits;
pub mod database;
pub mod events;
pub mod knowledge;
pub mod onboarding;
pub mod referrals;
pub mod rizz;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

use rizz_common::{Result, RizzError, User};
use rizz_knowledge::{Embedder, KnowledgeRetriever, SqliteKnowledgeStore};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::DatabaseManager;
use crate::storage::{SqliteStorage, Storage};

/// Every service the API needs, wired to one database.
pub struct RizzCore {
    pub storage: Arc<dyn Storage>,
    pub knowledge: knowledge::KnowledgeService,
    pub credits: Arc<credits::CreditLedger>,
    pub onboarding: onboarding::OnboardingService,
    pub rizz: rizz::RizzService,
    pub referrals: referrals::ReferralService,
    pub events: events::EventService,
}

impl RizzCore {
    pub fn new(
        database: &DatabaseManager,
        embedder: Arc<dyn Embedder>,
        tip_model: Arc<dyn rizz::TipModel>,
        config: CoreConfig,
    ) -> Self {
        let pool = database.pool().clone();
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(pool.clone()));
        let retriever =
            KnowledgeRetriever::new(embedder.clone(), Arc::new(SqliteKnowledgeStore::new(pool)));
        let credits = Arc::new(credits::CreditLedger::new(storage.clone()));

        let referral_embedder = config.embed_referrals.then_some(embedder);

        Self {
            knowledge: knowledge::KnowledgeService::new(retriever.clone()),
            onboarding: onboarding::OnboardingService::new(storage.clone(), retriever.clone()),
            rizz: rizz::RizzService::new(
                storage.clone(),
                credits.clone(),
                retriever,
                tip_model,
                config.generation,
            ),
            referrals: referrals::ReferralService::new(storage.clone(), referral_embedder),
            events: events::EventService::new(storage.clone(), config.visitor_hash_salt),
            credits,
            storage,
        }
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        self.storage
            .get_user(id)
            .await?
            .ok_or_else(|| RizzError::NotFound(format!("User not found: {}", id)))
    }

    /// Removes the account together with its private knowledge.
    pub async fn delete_user(&self, id: Uuid) -> Result<()> {
        if !self.storage.delete_user(id).await? {
            return Err(RizzError::NotFound(format!("User not found: {}", id)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub generation: rizz::GenerationConfig,
    pub visitor_hash_salt: String,
    /// Compute embeddings for referral items so they can be recommended.
    pub embed_referrals: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            generation: rizz::GenerationConfig::default(),
            visitor_hash_salt: "arabian-rizz".to_string(),
            embed_referrals: true,
        }
    }
}
