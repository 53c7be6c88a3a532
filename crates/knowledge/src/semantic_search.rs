use chrono::Utc;
use rizz_common::{KnowledgeRecord, NewKnowledge, Result, RizzError, ScoredKnowledge};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::document_processor::{normalize_text, preview};
use crate::embedding::{check_dimension, Embedder};
use crate::vector_store::{KnowledgeStore, SearchFilter};

/// Longest fact accepted into the knowledge base, in characters.
pub const MAX_FACT_CHARS: usize = 2000;

/// Couples an embedder with a knowledge store: text in, ranked records out.
#[derive(Clone)]
pub struct KnowledgeRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embeds `query` and returns the closest visible records.
    #[instrument(skip(self, query, filter))]
    pub async fn retrieve(&self, query: &str, filter: &SearchFilter) -> Result<Vec<ScoredKnowledge>> {
        let query = normalize_text(query);
        if query.is_empty() {
            return Err(RizzError::Validation("Search query is empty".to_string()));
        }

        let query_embedding = self.embedder.embed(&query).await?;
        let results = self.store.search(&query_embedding, filter).await?;

        debug!(
            "Retrieved {} records for '{}'",
            results.len(),
            preview(&query, 60)
        );
        Ok(results)
    }

    /// Embeds a single fact without storing it.
    pub async fn build_record(&self, knowledge: NewKnowledge) -> Result<KnowledgeRecord> {
        let content = validate_fact(&knowledge.content)?;
        let embedding = self.embedder.embed(&content).await?;
        check_dimension(&embedding, self.embedder.dimension())?;

        Ok(KnowledgeRecord {
            id: Uuid::new_v4(),
            owner: knowledge.owner,
            contributor: knowledge.contributor,
            content,
            embedding,
            embedding_model: self.embedder.model_name().to_string(),
            category: knowledge.category,
            status: knowledge.status,
            language: knowledge.language,
            source: knowledge.source,
            created_at: Utc::now(),
        })
    }

    /// Embeds every fact in order. The first failure aborts the batch.
    pub async fn build_records(&self, facts: Vec<NewKnowledge>) -> Result<Vec<KnowledgeRecord>> {
        let mut records = Vec::with_capacity(facts.len());
        for fact in facts {
            records.push(self.build_record(fact).await?);
        }
        Ok(records)
    }

    /// Embeds and stores one fact.
    pub async fn ingest(&self, knowledge: NewKnowledge) -> Result<KnowledgeRecord> {
        let record = self.build_record(knowledge).await?;
        self.store.insert(&record).await?;
        info!(
            "Ingested {} knowledge record {} ({})",
            record.category, record.id, record.status
        );
        Ok(record)
    }
}

/// Normalizes a fact and enforces the content bounds.
pub fn validate_fact(content: &str) -> Result<String> {
    let content = normalize_text(content);
    if content.is_empty() {
        return Err(RizzError::Validation("Knowledge content is empty".to_string()));
    }
    if content.chars().count() > MAX_FACT_CHARS {
        return Err(RizzError::Validation(format!(
            "Knowledge content exceeds {} characters",
            MAX_FACT_CHARS
        )));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use crate::vector_store::tests::test_pool;
    use crate::vector_store::{SqliteKnowledgeStore, Visibility};
    use mockall::predicate::eq;
    use rizz_common::{ApprovalStatus, KnowledgeCategory, KnowledgeSource};

    fn fact(owner: Option<Uuid>, content: &str) -> NewKnowledge {
        NewKnowledge {
            owner,
            contributor: owner,
            content: content.to_string(),
            category: KnowledgeCategory::Interest,
            language: "en".to_string(),
            source: KnowledgeSource::Onboarding,
            status: ApprovalStatus::Approved,
        }
    }

    fn keyword_embedder() -> MockEmbedder {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().returning(|text| {
            let text = text.to_lowercase();
            Ok(vec![
                if text.contains("hiking") { 1.0 } else { 0.0 },
                if text.contains("cooking") { 1.0 } else { 0.0 },
                0.1,
            ])
        });
        embedder.expect_dimension().return_const(3usize);
        embedder
            .expect_model_name()
            .return_const("keyword-test".to_string());
        embedder
    }

    #[tokio::test]
    async fn test_ingest_then_retrieve() {
        let (_dir, pool) = test_pool().await;
        let retriever = KnowledgeRetriever::new(
            Arc::new(keyword_embedder()),
            Arc::new(SqliteKnowledgeStore::new(pool)),
        );
        let owner = Uuid::new_v4();

        let hiking = retriever.ingest(fact(Some(owner), "Loves  hiking\non weekends")).await.unwrap();
        retriever.ingest(fact(Some(owner), "Enjoys cooking pasta")).await.unwrap();

        assert_eq!(hiking.content, "Loves hiking on weekends");
        assert_eq!(hiking.embedding_model, "keyword-test");

        let results = retriever
            .retrieve(
                "any hiking trails?",
                &SearchFilter::new(Visibility::owner_and_global(owner)).with_limit(1),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, hiking.id);
    }

    #[tokio::test]
    async fn test_empty_query_skips_embedder() {
        let (_dir, pool) = test_pool().await;
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().never();
        let retriever = KnowledgeRetriever::new(
            Arc::new(embedder),
            Arc::new(SqliteKnowledgeStore::new(pool)),
        );

        let result = retriever
            .retrieve("   ", &SearchFilter::new(Visibility::global()))
            .await;
        assert!(matches!(result, Err(RizzError::Validation(_))));
    }

    #[tokio::test]
    async fn test_build_records_aborts_on_first_failure() {
        let (_dir, pool) = test_pool().await;
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .with(eq("first"))
            .returning(|_| Ok(vec![1.0]));
        embedder
            .expect_embed()
            .with(eq("second"))
            .returning(|_| Err(RizzError::Embedding("quota exceeded".to_string())));
        embedder.expect_embed().with(eq("third")).never();
        embedder.expect_dimension().return_const(1usize);
        embedder.expect_model_name().return_const("m".to_string());

        let retriever = KnowledgeRetriever::new(
            Arc::new(embedder),
            Arc::new(SqliteKnowledgeStore::new(pool)),
        );
        let result = retriever
            .build_records(vec![fact(None, "first"), fact(None, "second"), fact(None, "third")])
            .await;
        assert!(matches!(result, Err(RizzError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let (_dir, pool) = test_pool().await;
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().returning(|_| Ok(vec![1.0, 2.0]));
        embedder.expect_dimension().return_const(3usize);
        embedder.expect_model_name().return_const("m".to_string());

        let retriever = KnowledgeRetriever::new(
            Arc::new(embedder),
            Arc::new(SqliteKnowledgeStore::new(pool)),
        );
        let result = retriever.ingest(fact(None, "short vector")).await;
        assert!(matches!(result, Err(RizzError::Embedding(_))));
    }

    #[test]
    fn test_validate_fact_bounds() {
        assert!(validate_fact("  ").is_err());
        assert!(validate_fact(&"x".repeat(MAX_FACT_CHARS + 1)).is_err());
        assert_eq!(validate_fact(" a  b ").unwrap(), "a b");
    }
}
