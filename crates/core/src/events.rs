use chrono::{Duration, Utc};
use ring::digest::{digest, SHA256};
use rizz_common::{Event, PathStat, Result, RizzError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::storage::Storage;

pub const EVENT_TTL_DAYS: i64 = 30;
pub const PAGE_VIEW: &str = "page_view";
const MAX_PATH_LEN: usize = 512;

/// A page view as reported by the frontend, plus what the server saw.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageView {
    pub path: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(skip)]
    pub user_id: Option<Uuid>,
    #[serde(skip)]
    pub client_addr: Option<String>,
    #[serde(skip)]
    pub user_agent: Option<String>,
}

pub struct EventService {
    storage: Arc<dyn Storage>,
    visitor_salt: String,
}

impl EventService {
    pub fn new(storage: Arc<dyn Storage>, visitor_salt: impl Into<String>) -> Self {
        Self {
            storage,
            visitor_salt: visitor_salt.into(),
        }
    }

    /// SHA-256 of salt, address and user agent. The raw address is never stored.
    pub fn visitor_hash(&self, client_addr: &str, user_agent: &str) -> String {
        let input = format!("{}|{}|{}", self.visitor_salt, client_addr, user_agent);
        hex::encode(digest(&SHA256, input.as_bytes()).as_ref())
    }

    pub async fn record_page_view(&self, view: PageView) -> Result<Event> {
        let path = view.path.trim();
        if !path.starts_with('/') || path.len() > MAX_PATH_LEN {
            return Err(RizzError::Validation(format!(
                "path must start with '/' and be at most {} bytes",
                MAX_PATH_LEN
            )));
        }

        let visitor_hash = view
            .client_addr
            .as_deref()
            .map(|addr| self.visitor_hash(addr, view.user_agent.as_deref().unwrap_or_default()));

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            name: PAGE_VIEW.to_string(),
            path: path.to_string(),
            user_id: view.user_id,
            visitor_hash,
            referrer: view
                .referrer
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            created_at: now,
            expires_at: now + Duration::days(EVENT_TTL_DAYS),
        };

        self.storage.insert_event(&event).await?;
        debug!("Recorded page view {}", event.path);
        Ok(event)
    }

    /// Most viewed paths over the last `days` days.
    pub async fn stats(&self, days: i64, limit: usize) -> Result<Vec<PathStat>> {
        let days = days.clamp(1, EVENT_TTL_DAYS);
        let now = Utc::now();
        self.storage
            .page_view_stats(now - Duration::days(days), now, limit)
            .await
    }

    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self.storage.purge_expired_events(Utc::now()).await?;
        if removed > 0 {
            info!("Purged {} expired events", removed);
        }
        Ok(removed)
    }
}
