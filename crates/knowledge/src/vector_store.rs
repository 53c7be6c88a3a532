//! Knowledge persistence and similarity ranking.
//!
//! Records live in a SQLite table with their embeddings serialized as JSON
//! arrays. Similarity search filters candidates in SQL and ranks them in
//! process by cosine similarity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rizz_common::{
    ApprovalStatus, KnowledgeCategory, KnowledgeRecord, KnowledgeSource, Result, RizzError,
    ScoredKnowledge,
};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::cmp::Ordering;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const MAX_SEARCH_LIMIT: usize = 50;
pub const MAX_SAMPLE_SIZE: usize = 50;

const KNOWLEDGE_SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS knowledge (
        id TEXT PRIMARY KEY,
        owner_id TEXT,
        contributor_id TEXT,
        content TEXT NOT NULL,
        embedding TEXT NOT NULL,
        embedding_model TEXT NOT NULL,
        category TEXT NOT NULL,
        status TEXT NOT NULL,
        language TEXT NOT NULL,
        source TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_knowledge_owner ON knowledge(owner_id, source)",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_contributor ON knowledge(contributor_id)",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_status ON knowledge(status, category, language)",
];

const SELECT_COLUMNS: &str = "SELECT id, owner_id, contributor_id, content, embedding, \
     embedding_model, category, status, language, source, created_at FROM knowledge";

/// Which records a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    /// `None` restricts the query to global records.
    pub owner: Option<Uuid>,
    /// Adds global records to an owner's own records.
    pub include_global: bool,
}

impl Visibility {
    pub fn global() -> Self {
        Self {
            owner: None,
            include_global: true,
        }
    }

    pub fn owner_and_global(owner: Uuid) -> Self {
        Self {
            owner: Some(owner),
            include_global: true,
        }
    }

    pub fn owner_only(owner: Uuid) -> Self {
        Self {
            owner: Some(owner),
            include_global: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub visibility: Visibility,
    pub categories: Vec<KnowledgeCategory>,
    pub language: Option<String>,
    pub limit: usize,
    pub min_score: f32,
}

impl SearchFilter {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            categories: Vec::new(),
            language: None,
            limit: 5,
            min_score: 0.0,
        }
    }

    pub fn with_categories(mut self, categories: Vec<KnowledgeCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SampleFilter {
    pub visibility: Visibility,
    pub category: Option<KnowledgeCategory>,
    pub language: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct KnowledgeStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

/// Cosine similarity of two vectors.
///
/// Returns `None` when the lengths differ and `Some(0.0)` when either vector
/// has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some(dot / (norm_a * norm_b))
}

/// Ranks `candidates` against `query`, best first.
///
/// Records of a different dimension are skipped. Equal scores keep the newer
/// record first.
pub fn rank_by_similarity(
    query: &[f32],
    candidates: Vec<KnowledgeRecord>,
    min_score: f32,
    limit: usize,
) -> Vec<ScoredKnowledge> {
    let mut skipped = 0usize;
    let mut scored: Vec<ScoredKnowledge> = candidates
        .into_iter()
        .filter_map(|record| match cosine_similarity(query, &record.embedding) {
            Some(score) => Some(ScoredKnowledge { record, score }),
            None => {
                skipped += 1;
                None
            }
        })
        .filter(|scored| scored.score >= min_score)
        .collect();

    if skipped > 0 {
        warn!(
            "Skipped {} knowledge records with mismatched embedding dimension (query has {})",
            skipped,
            query.len()
        );
    }

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.record.created_at.cmp(&a.record.created_at))
    });
    scored.truncate(limit);
    scored
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn insert(&self, record: &KnowledgeRecord) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<KnowledgeRecord>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    /// Records owned by `owner` plus the global records they contributed.
    async fn list_by_owner(&self, owner: Uuid, limit: usize) -> Result<Vec<KnowledgeRecord>>;
    async fn list_by_status(
        &self,
        status: ApprovalStatus,
        limit: usize,
    ) -> Result<Vec<KnowledgeRecord>>;
    async fn set_status(&self, id: Uuid, status: ApprovalStatus) -> Result<()>;

    /// Atomically swaps every record of `owner` from `source` for `records`.
    /// Returns how many records were removed.
    async fn replace_owner_records(
        &self,
        owner: Uuid,
        source: KnowledgeSource,
        records: &[KnowledgeRecord],
    ) -> Result<u64>;

    /// Approved records visible under `filter`, ranked by similarity to `query`.
    async fn search(&self, query: &[f32], filter: &SearchFilter) -> Result<Vec<ScoredKnowledge>>;

    /// Random approved records visible under `filter`.
    async fn sample(&self, filter: &SampleFilter) -> Result<Vec<KnowledgeRecord>>;

    async fn stats(&self) -> Result<KnowledgeStats>;
}

#[derive(sqlx::FromRow)]
struct KnowledgeRow {
    id: String,
    owner_id: Option<String>,
    contributor_id: Option<String>,
    content: String,
    embedding: String,
    embedding_model: String,
    category: String,
    status: String,
    language: String,
    source: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<KnowledgeRow> for KnowledgeRecord {
    type Error = RizzError;

    fn try_from(row: KnowledgeRow) -> Result<Self> {
        let owner = parse_user_id(row.owner_id.as_deref())?;
        let contributor = parse_user_id(row.contributor_id.as_deref())?;

        Ok(KnowledgeRecord {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| RizzError::Internal(format!("Invalid UUID: {}", e)))?,
            owner,
            contributor,
            content: row.content,
            embedding: serde_json::from_str(&row.embedding)
                .map_err(|e| RizzError::Internal(format!("Corrupt embedding: {}", e)))?,
            embedding_model: row.embedding_model,
            category: row.category.parse()?,
            status: row.status.parse()?,
            language: row.language,
            source: row.source.parse()?,
            created_at: row.created_at,
        })
    }
}

fn parse_user_id(raw: Option<&str>) -> Result<Option<Uuid>> {
    raw.map(Uuid::parse_str)
        .transpose()
        .map_err(|e| RizzError::Internal(format!("Invalid user UUID: {}", e)))
}

fn into_records(rows: Vec<KnowledgeRow>) -> Result<Vec<KnowledgeRecord>> {
    rows.into_iter().map(KnowledgeRecord::try_from).collect()
}

fn push_visibility(builder: &mut QueryBuilder<'_, Sqlite>, visibility: Visibility) {
    match visibility.owner {
        Some(owner) if visibility.include_global => {
            builder
                .push(" AND (owner_id = ")
                .push_bind(owner.to_string())
                .push(" OR owner_id IS NULL)");
        }
        Some(owner) => {
            builder.push(" AND owner_id = ").push_bind(owner.to_string());
        }
        None => {
            builder.push(" AND owner_id IS NULL");
        }
    }
}

async fn insert_record<'e, E>(executor: E, record: &KnowledgeRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let embedding_json = serde_json::to_string(&record.embedding)
        .map_err(|e| RizzError::Internal(format!("Failed to serialize embedding: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO knowledge (id, owner_id, contributor_id, content, embedding, embedding_model,
                               category, status, language, source, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.owner.map(|o| o.to_string()))
    .bind(record.contributor.map(|c| c.to_string()))
    .bind(&record.content)
    .bind(embedding_json)
    .bind(&record.embedding_model)
    .bind(record.category.as_str())
    .bind(record.status.as_str())
    .bind(&record.language)
    .bind(record.source.as_str())
    .bind(record.created_at)
    .execute(executor)
    .await
    .map_err(|e| RizzError::Database(format!("Failed to store knowledge: {}", e)))?;

    Ok(())
}

pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the knowledge table and its indexes if they are missing.
    pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
        for statement in KNOWLEDGE_SCHEMA {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| RizzError::Database(format!("Failed to create knowledge schema: {}", e)))?;
        }
        info!("Knowledge schema ready");
        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn insert(&self, record: &KnowledgeRecord) -> Result<()> {
        insert_record(&self.pool, record).await?;
        debug!("Stored knowledge record: {}", record.id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<KnowledgeRecord>> {
        let row = sqlx::query_as::<_, KnowledgeRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to get knowledge: {}", e)))?;

        row.map(KnowledgeRecord::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM knowledge WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to delete knowledge: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(&self, owner: Uuid, limit: usize) -> Result<Vec<KnowledgeRecord>> {
        let rows = sqlx::query_as::<_, KnowledgeRow>(&format!(
            "{} WHERE owner_id = ? OR (owner_id IS NULL AND contributor_id = ?) \
             ORDER BY created_at DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(owner.to_string())
        .bind(owner.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to list knowledge: {}", e)))?;

        into_records(rows)
    }

    async fn list_by_status(
        &self,
        status: ApprovalStatus,
        limit: usize,
    ) -> Result<Vec<KnowledgeRecord>> {
        let rows = sqlx::query_as::<_, KnowledgeRow>(&format!(
            "{} WHERE status = ? ORDER BY created_at ASC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to list knowledge: {}", e)))?;

        into_records(rows)
    }

    async fn set_status(&self, id: Uuid, status: ApprovalStatus) -> Result<()> {
        let result = sqlx::query("UPDATE knowledge SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to update knowledge status: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RizzError::NotFound(format!("Knowledge record not found: {}", id)));
        }

        debug!("Knowledge record {} is now {}", id, status);
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn replace_owner_records(
        &self,
        owner: Uuid,
        source: KnowledgeSource,
        records: &[KnowledgeRecord],
    ) -> Result<u64> {
        if let Some(foreign) = records.iter().find(|r| r.owner != Some(owner) || r.source != source) {
            return Err(RizzError::Validation(format!(
                "Record {} does not belong to owner {} with source {}",
                foreign.id, owner, source
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RizzError::Database(format!("Failed to begin transaction: {}", e)))?;

        let removed = sqlx::query("DELETE FROM knowledge WHERE owner_id = ? AND source = ?")
            .bind(owner.to_string())
            .bind(source.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to clear knowledge: {}", e)))?
            .rows_affected();

        for record in records {
            insert_record(&mut *tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| RizzError::Database(format!("Failed to commit transaction: {}", e)))?;

        info!(
            "Replaced {} {} records of {} with {}",
            removed,
            source,
            owner,
            records.len()
        );
        Ok(removed)
    }

    #[instrument(skip(self, query, filter), fields(dimension = query.len()))]
    async fn search(&self, query: &[f32], filter: &SearchFilter) -> Result<Vec<ScoredKnowledge>> {
        let limit = filter.limit.clamp(1, MAX_SEARCH_LIMIT);

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder
            .push(" WHERE status = ")
            .push_bind(ApprovalStatus::Approved.as_str());
        push_visibility(&mut builder, filter.visibility);

        if !filter.categories.is_empty() {
            builder.push(" AND category IN (");
            let mut separated = builder.separated(", ");
            for category in &filter.categories {
                separated.push_bind(category.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some(language) = &filter.language {
            builder.push(" AND language = ").push_bind(language.clone());
        }

        let rows = builder
            .build_query_as::<KnowledgeRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to search knowledge: {}", e)))?;

        let candidates = into_records(rows)?;
        let candidate_count = candidates.len();
        let results = rank_by_similarity(query, candidates, filter.min_score, limit);

        debug!(
            "Ranked {} candidates, returning {} results",
            candidate_count,
            results.len()
        );
        Ok(results)
    }

    async fn sample(&self, filter: &SampleFilter) -> Result<Vec<KnowledgeRecord>> {
        let count = filter.count.clamp(1, MAX_SAMPLE_SIZE);

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder
            .push(" WHERE status = ")
            .push_bind(ApprovalStatus::Approved.as_str());
        push_visibility(&mut builder, filter.visibility);

        if let Some(category) = filter.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }

        if let Some(language) = &filter.language {
            builder.push(" AND language = ").push_bind(language.clone());
        }

        builder.push(" ORDER BY RANDOM() LIMIT ").push_bind(count as i64);

        let rows = builder
            .build_query_as::<KnowledgeRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to sample knowledge: {}", e)))?;

        into_records(rows)
    }

    async fn stats(&self) -> Result<KnowledgeStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM knowledge GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RizzError::Database(format!("Failed to count knowledge: {}", e)))?;

        let mut stats = KnowledgeStats::default();
        for (status, count) in rows {
            match status.parse::<ApprovalStatus>()? {
                ApprovalStatus::Pending => stats.pending = count,
                ApprovalStatus::Approved => stats.approved = count,
                ApprovalStatus::Rejected => stats.rejected = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }
}
