use chrono::Utc;
use rizz_common::{ReferralDraft, ReferralItem, Result, RizzError};
use rizz_knowledge::document_processor::normalize_text;
use rizz_knowledge::{cosine_similarity, Embedder};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::storage::{ReferralQuery, Storage};

pub const MAX_RECOMMENDATIONS: usize = 20;
const MAX_TAGS: usize = 12;
const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Serialize)]
pub struct ScoredReferral {
    pub item: ReferralItem,
    pub score: f32,
}

/// Absolute http(s) URL with a host and no whitespace.
pub fn validate_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let invalid = || RizzError::Validation(format!("Invalid url: {}", raw));

    if raw.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let parsed = Url::parse(raw).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RizzError::Validation(
            "url must start with http:// or https://".to_string(),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }
    Ok(raw.to_string())
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = normalize_text(tag).to_lowercase();
        if !tag.is_empty() && !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    normalized.truncate(MAX_TAGS);
    normalized
}

struct ValidDraft {
    name: String,
    description: String,
    url: String,
    image_url: Option<String>,
    price: Option<f64>,
    currency: String,
    tags: Vec<String>,
}

fn validate_draft(draft: &ReferralDraft) -> Result<ValidDraft> {
    let name = normalize_text(&draft.name);
    if name.is_empty() {
        return Err(RizzError::Validation("name is required".to_string()));
    }

    if let Some(price) = draft.price {
        if !price.is_finite() || price < 0.0 {
            return Err(RizzError::Validation("price must be non-negative".to_string()));
        }
    }

    let currency = match draft.currency.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_CURRENCY.to_string(),
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            code.to_ascii_uppercase()
        }
        Some(code) => {
            return Err(RizzError::Validation(format!("Invalid currency: {}", code)));
        }
    };

    let image_url = draft
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(validate_url)
        .transpose()?;

    Ok(ValidDraft {
        name,
        description: draft.description.trim().to_string(),
        url: validate_url(&draft.url)?,
        image_url,
        price: draft.price,
        currency,
        tags: normalize_tags(&draft.tags),
    })
}

pub struct ReferralService {
    storage: Arc<dyn Storage>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ReferralService {
    pub fn new(storage: Arc<dyn Storage>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { storage, embedder }
    }

    /// A failed embedding is logged and the item is kept without one.
    async fn embed_item(&self, item: &ReferralItem) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&item.embedding_text()).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("Failed to embed referral {}: {}", item.id, e);
                None
            }
        }
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(&self, draft: ReferralDraft) -> Result<ReferralItem> {
        let valid = validate_draft(&draft)?;
        let now = Utc::now();

        let mut item = ReferralItem {
            id: Uuid::new_v4(),
            name: valid.name,
            description: valid.description,
            category: draft.category,
            url: valid.url,
            image_url: valid.image_url,
            price: valid.price,
            currency: valid.currency,
            tags: valid.tags,
            embedding: None,
            clicks: 0,
            created_at: now,
            updated_at: now,
        };
        item.embedding = self.embed_item(&item).await;

        self.storage.insert_referral(&item).await?;
        info!("Created referral item {} ({})", item.id, item.category);
        Ok(public(item))
    }

    #[instrument(skip(self, draft))]
    pub async fn update(&self, id: Uuid, draft: ReferralDraft) -> Result<ReferralItem> {
        let valid = validate_draft(&draft)?;
        let existing = self
            .storage
            .get_referral(id)
            .await?
            .ok_or_else(|| RizzError::NotFound(format!("Referral not found: {}", id)))?;

        let mut item = ReferralItem {
            name: valid.name,
            description: valid.description,
            category: draft.category,
            url: valid.url,
            image_url: valid.image_url,
            price: valid.price,
            currency: valid.currency,
            tags: valid.tags,
            updated_at: Utc::now(),
            ..existing
        };
        item.embedding = self.embed_item(&item).await;

        self.storage.update_referral(&item).await?;
        info!("Updated referral item {}", id);
        Ok(public(item))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.storage.delete_referral(id).await? {
            return Err(RizzError::NotFound(format!("Referral not found: {}", id)));
        }
        info!("Deleted referral item {}", id);
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<ReferralItem> {
        self.storage
            .get_referral(id)
            .await?
            .map(public)
            .ok_or_else(|| RizzError::NotFound(format!("Referral not found: {}", id)))
    }

    pub async fn list(&self, query: &ReferralQuery) -> Result<Vec<ReferralItem>> {
        let items = self.storage.list_referrals(query).await?;
        Ok(items.into_iter().map(public).collect())
    }

    /// Counts the click and returns the destination URL.
    pub async fn record_click(&self, id: Uuid) -> Result<String> {
        self.storage
            .increment_clicks(id)
            .await?
            .ok_or_else(|| RizzError::NotFound(format!("Referral not found: {}", id)))
    }

    /// Ranks embedded items by similarity to `query`. Items without an
    /// embedding are matched by text and follow the ranked ones with score 0.
    #[instrument(skip(self))]
    pub async fn recommend(&self, query: &str, limit: usize) -> Result<Vec<ScoredReferral>> {
        let query = normalize_text(query);
        if query.is_empty() {
            return Err(RizzError::Validation("Query is empty".to_string()));
        }
        let limit = limit.clamp(1, MAX_RECOMMENDATIONS);

        let Some(embedder) = &self.embedder else {
            let matches = self.text_matches(&query, limit).await?;
            return Ok(matches.into_iter().map(unscored).collect());
        };

        let query_embedding = embedder.embed(&query).await?;
        let mut scored: Vec<ScoredReferral> = self
            .storage
            .referrals_with_embeddings()
            .await?
            .into_iter()
            .filter_map(|item| {
                let score = item
                    .embedding
                    .as_deref()
                    .and_then(|e| cosine_similarity(&query_embedding, e))?;
                Some(ScoredReferral {
                    item: public(item),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.item.clicks.cmp(&a.item.clicks))
        });
        scored.truncate(limit);

        if scored.len() < limit {
            let unembedded: Vec<ScoredReferral> = self
                .text_matches(&query, MAX_RECOMMENDATIONS)
                .await?
                .into_iter()
                .filter(|item| item.embedding.is_none())
                .take(limit - scored.len())
                .map(unscored)
                .collect();
            if !unembedded.is_empty() {
                debug!("Adding {} unembedded text matches", unembedded.len());
            }
            scored.extend(unembedded);
        }
        Ok(scored)
    }

    async fn text_matches(&self, query: &str, limit: usize) -> Result<Vec<ReferralItem>> {
        self.storage
            .list_referrals(&ReferralQuery {
                search: Some(query.to_string()),
                limit,
                ..ReferralQuery::default()
            })
            .await
    }
}

fn public(mut item: ReferralItem) -> ReferralItem {
    item.embedding = None;
    item
}

fn unscored(item: ReferralItem) -> ScoredReferral {
    ScoredReferral {
        item: public(item),
        score: 0.0,
    }
}
