use rizz_common::{
    ApprovalStatus, KnowledgeCategory, KnowledgeRecord, KnowledgeSource, NewKnowledge, Result,
    RizzError, ScoredKnowledge, User,
};
use rizz_knowledge::vector_store::MAX_SAMPLE_SIZE;
use rizz_knowledge::{KnowledgeRetriever, KnowledgeStats, SampleFilter, SearchFilter, Visibility};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

/// A fact a user adds outside onboarding.
#[derive(Debug, Clone, Deserialize)]
pub struct Contribution {
    pub content: String,
    pub category: KnowledgeCategory,
    #[serde(default)]
    pub language: Option<String>,
    /// Shared with every user once approved.
    #[serde(default)]
    pub global: bool,
}

/// User-facing knowledge operations with ownership and approval rules applied.
#[derive(Clone)]
pub struct KnowledgeService {
    retriever: KnowledgeRetriever,
}

impl KnowledgeService {
    pub fn new(retriever: KnowledgeRetriever) -> Self {
        Self { retriever }
    }

    pub fn retriever(&self) -> &KnowledgeRetriever {
        &self.retriever
    }

    pub async fn list_own(&self, user_id: Uuid, limit: usize) -> Result<Vec<KnowledgeRecord>> {
        let records = self.retriever.store().list_by_owner(user_id, limit).await?;
        Ok(records.into_iter().map(KnowledgeRecord::without_embedding).collect())
    }

    /// Admin records are approved at once; global records from users wait for review.
    pub async fn contribute(&self, user: &User, contribution: Contribution) -> Result<KnowledgeRecord> {
        let (owner, source, status) = if user.is_admin() {
            let owner = if contribution.global { None } else { Some(user.id) };
            (owner, KnowledgeSource::Admin, ApprovalStatus::Approved)
        } else if contribution.global {
            (None, KnowledgeSource::User, ApprovalStatus::Pending)
        } else {
            (Some(user.id), KnowledgeSource::User, ApprovalStatus::Approved)
        };

        let language = contribution
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| user.profile.language_or_default().to_string());

        let record = self
            .retriever
            .ingest(NewKnowledge {
                owner,
                contributor: Some(user.id),
                content: contribution.content,
                category: contribution.category,
                language,
                source,
                status,
            })
            .await?;

        Ok(record.without_embedding())
    }

    pub async fn search(
        &self,
        user: &User,
        query: &str,
        category: Option<KnowledgeCategory>,
        limit: usize,
    ) -> Result<Vec<ScoredKnowledge>> {
        let mut filter = SearchFilter::new(Visibility::owner_and_global(user.id)).with_limit(limit);
        if let Some(category) = category {
            filter = filter.with_categories(vec![category]);
        }

        let results = self.retriever.retrieve(query, &filter).await?;
        Ok(results
            .into_iter()
            .map(|scored| ScoredKnowledge {
                record: scored.record.without_embedding(),
                score: scored.score,
            })
            .collect())
    }

    pub async fn sample(
        &self,
        user: &User,
        category: Option<KnowledgeCategory>,
        language: Option<String>,
        count: usize,
    ) -> Result<Vec<KnowledgeRecord>> {
        let records = self
            .retriever
            .store()
            .sample(&SampleFilter {
                visibility: Visibility::owner_and_global(user.id),
                category,
                language,
                count: count.clamp(1, MAX_SAMPLE_SIZE),
            })
            .await?;
        Ok(records.into_iter().map(KnowledgeRecord::without_embedding).collect())
    }

    /// Owners may delete their own records and contributors their unapproved
    /// global ones; admins may delete any.
    pub async fn delete(&self, user: &User, id: Uuid) -> Result<()> {
        let record = self
            .retriever
            .store()
            .get(id)
            .await?
            .ok_or_else(|| RizzError::NotFound(format!("Knowledge record not found: {}", id)))?;

        let owns = record.owner == Some(user.id);
        let withdraws = record.is_global()
            && record.contributor == Some(user.id)
            && record.status != ApprovalStatus::Approved;
        if !user.is_admin() && !owns && !withdraws {
            return Err(RizzError::Forbidden(
                "Only the owner or an admin can delete this record".to_string(),
            ));
        }

        self.retriever.store().delete(id).await?;
        info!("User {} deleted knowledge record {}", user.id, id);
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: ApprovalStatus) -> Result<()> {
        self.retriever.store().set_status(id, status).await?;
        info!("Knowledge record {} marked {}", id, status);
        Ok(())
    }

    pub async fn pending(&self, limit: usize) -> Result<Vec<KnowledgeRecord>> {
        let records = self
            .retriever
            .store()
            .list_by_status(ApprovalStatus::Pending, limit)
            .await?;
        Ok(records.into_iter().map(KnowledgeRecord::without_embedding).collect())
    }

    pub async fn stats(&self) -> Result<KnowledgeStats> {
        self.retriever.store().stats().await
    }
}
