use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rizz_common::{
    ApprovalStatus, Event, NewUser, PathStat, Purchase, ReferralCategory, ReferralItem, Result, RizzError, User,
    UserProfile, UserRole, DEFAULT_CREDIT_BALANCE, FREE_PLAN_ID,
};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
pub trait Storage: Send + Sync {
    // User operations
    async fn upsert_user(&self, user: &NewUser) -> Result<User>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>>;
    async fn update_profile(
        &self,
        id: Uuid,
        profile: &UserProfile,
        mark_onboarded: bool,
    ) -> Result<User>;
    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<()>;
    async fn delete_user(&self, id: Uuid) -> Result<bool>;

    // Credit operations
    /// Atomically subtracts `amount` if the balance covers it; returns the new balance.
    async fn consume_credits(&self, user_id: Uuid, amount: i64) -> Result<i64>;
    async fn add_credits(&self, user_id: Uuid, amount: i64) -> Result<i64>;
    /// Inserts the purchase and grants its credits in one transaction.
    /// Returns the stored purchase and whether this call applied it.
    async fn record_purchase(&self, purchase: &Purchase) -> Result<(Purchase, bool)>;
    async fn list_purchases(&self, user_id: Uuid) -> Result<Vec<Purchase>>;

    // Referral operations
    async fn insert_referral(&self, item: &ReferralItem) -> Result<()>;
    async fn update_referral(&self, item: &ReferralItem) -> Result<()>;
    async fn delete_referral(&self, id: Uuid) -> Result<bool>;
    async fn get_referral(&self, id: Uuid) -> Result<Option<ReferralItem>>;
    async fn list_referrals(&self, query: &ReferralQuery) -> Result<Vec<ReferralItem>>;
    async fn referrals_with_embeddings(&self) -> Result<Vec<ReferralItem>>;
    /// Bumps the click counter and returns the target URL.
    async fn increment_clicks(&self, id: Uuid) -> Result<Option<String>>;

    // Event operations
    async fn insert_event(&self, event: &Event) -> Result<()>;
    async fn page_view_stats(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PathStat>>;
    async fn purge_expired_events(&self, now: DateTime<Utc>) -> Result<u64>;

    // Maintenance operations
    async fn health_check(&self) -> Result<StorageHealth>;
}

#[derive(Debug, Clone)]
pub struct StorageHealth {
    pub status: StorageStatus,
    pub connection_pool_size: Option<usize>,
    pub user_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralSort {
    #[default]
    Newest,
    Popular,
    PriceAsc,
    PriceDesc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralQuery {
    #[serde(default)]
    pub category: Option<ReferralCategory>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ReferralSort,
    #[serde(default = "default_page_size")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_page_size() -> usize {
    20
}

impl Default for ReferralQuery {
    fn default() -> Self {
        Self {
            category: None,
            tag: None,
            search: None,
            sort: ReferralSort::default(),
            limit: default_page_size(),
            offset: 0,
        }
    }
}

pub const MAX_PAGE_SIZE: usize = 100;

/// Escape SQL LIKE pattern
pub fn escape_like_pattern(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

const USER_COLUMNS: &str = "id, external_id, email, username, photo_url, credit_balance, plan_id, \
     role, profile, onboarded, created_at, updated_at";

const REFERRAL_COLUMNS: &str = "id, name, description, category, url, image_url, price, currency, \
     tags, embedding, clicks, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    external_id: String,
    email: String,
    username: String,
    photo_url: Option<String>,
    credit_balance: i64,
    plan_id: i32,
    role: String,
    profile: String,
    onboarded: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RizzError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid(&row.id)?,
            external_id: row.external_id,
            email: row.email,
            username: row.username,
            photo_url: row.photo_url,
            credit_balance: row.credit_balance,
            plan_id: row.plan_id,
            role: row.role.parse()?,
            profile: serde_json::from_str(&row.profile)
                .map_err(|e| RizzError::Internal(format!("Failed to deserialize profile: {}", e)))?,
            onboarded: row.onboarded,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReferralRow {
    id: String,
    name: String,
    description: String,
    category: String,
    url: String,
    image_url: Option<String>,
    price: Option<f64>,
    currency: String,
    tags: String,
    embedding: Option<String>,
    clicks: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReferralRow> for ReferralItem {
    type Error = RizzError;

    fn try_from(row: ReferralRow) -> Result<Self> {
        let embedding = row
            .embedding
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()
            .map_err(|e| RizzError::Internal(format!("Corrupt referral embedding: {}", e)))?;

        Ok(ReferralItem {
            id: parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            category: row.category.parse()?,
            url: row.url,
            image_url: row.image_url,
            price: row.price,
            currency: row.currency,
            tags: serde_json::from_str(&row.tags)
                .map_err(|e| RizzError::Internal(format!("Corrupt referral tags: {}", e)))?,
            embedding,
            clicks: row.clicks,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: String,
    external_payment_id: String,
    user_id: String,
    plan_id: i32,
    amount: f64,
    credits: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = RizzError;

    fn try_from(row: PurchaseRow) -> Result<Self> {
        Ok(Purchase {
            id: parse_uuid(&row.id)?,
            external_payment_id: row.external_payment_id,
            user_id: parse_uuid(&row.user_id)?,
            plan_id: row.plan_id,
            amount: row.amount,
            credits: row.credits,
            created_at: row.created_at,
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| RizzError::Internal(format!("Invalid UUID: {}", e)))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| RizzError::Internal(format!("Failed to serialize {}: {}", what, e)))
}

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn credit_balance(&self, user_id: Uuid) -> Result<Option<i64>> {
        let balance: Option<(i64,)> =
            sqlx::query_as("SELECT credit_balance FROM users WHERE id = ?")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RizzError::Database(format!("Failed to read balance: {}", e)))?;

        Ok(balance.map(|(b,)| b))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn upsert_user(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let empty_profile = to_json(&UserProfile::default(), "profile")?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, external_id, email, username, photo_url, credit_balance,
                               plan_id, role, profile, onboarded, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                email = excluded.email,
                username = excluded.username,
                photo_url = COALESCE(excluded.photo_url, users.photo_url),
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(&user.external_id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.photo_url)
        .bind(DEFAULT_CREDIT_BALANCE)
        .bind(FREE_PLAN_ID)
        .bind(UserRole::User.as_str())
        .bind(empty_profile)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to upsert user: {}", e)))?;

        let user = User::try_from(row)?;
        debug!("Upserted user {} ({})", user.id, user.external_id);
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to get user: {}", e)))?;

        row.map(User::try_from).transpose()
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE external_id = ?",
            USER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to get user: {}", e)))?;

        row.map(User::try_from).transpose()
    }

    async fn update_profile(
        &self,
        id: Uuid,
        profile: &UserProfile,
        mark_onboarded: bool,
    ) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET profile = ?, onboarded = (onboarded OR ?), updated_at = ?
            WHERE id = ?
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(to_json(profile, "profile")?)
        .bind(mark_onboarded)
        .bind(Utc::now())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to update profile: {}", e)))?;

        match row {
            Some(row) => User::try_from(row),
            None => Err(RizzError::NotFound(format!("User not found: {}", id))),
        }
    }

    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<()> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to set role: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RizzError::NotFound(format!("User not found: {}", id)));
        }

        info!("User {} role set to {}", id, role);
        Ok(())
    }

    /// Removes the user's private knowledge, their unapproved global
    /// contributions and the user row in one transaction. Approved global
    /// records stay but lose the contributor link.
    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RizzError::Database(format!("Failed to begin transaction: {}", e)))?;

        let knowledge = sqlx::query(
            "DELETE FROM knowledge WHERE owner_id = ? OR (contributor_id = ? AND status != ?)",
        )
        .bind(id.to_string())
        .bind(id.to_string())
        .bind(ApprovalStatus::Approved.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to delete user knowledge: {}", e)))?;

        sqlx::query("UPDATE knowledge SET contributor_id = NULL WHERE contributor_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to unlink contributions: {}", e)))?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to delete user: {}", e)))?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        tx.commit()
            .await
            .map_err(|e| RizzError::Database(format!("Failed to commit transaction: {}", e)))?;

        info!(
            "Deleted user {} and {} knowledge records",
            id,
            knowledge.rows_affected()
        );
        Ok(true)
    }

    async fn consume_credits(&self, user_id: Uuid, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(RizzError::Validation(
                "Credit amount must be positive".to_string(),
            ));
        }

        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE users
            SET credit_balance = credit_balance - ?, updated_at = ?
            WHERE id = ? AND credit_balance >= ?
            RETURNING credit_balance
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(user_id.to_string())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to consume credits: {}", e)))?;

        match updated {
            Some((balance,)) => Ok(balance),
            None => match self.credit_balance(user_id).await? {
                Some(balance) => Err(RizzError::InsufficientCredits {
                    balance,
                    required: amount,
                }),
                None => Err(RizzError::NotFound(format!("User not found: {}", user_id))),
            },
        }
    }

    async fn add_credits(&self, user_id: Uuid, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(RizzError::Validation(
                "Credit amount must be positive".to_string(),
            ));
        }

        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE users
            SET credit_balance = credit_balance + ?, updated_at = ?
            WHERE id = ?
            RETURNING credit_balance
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to add credits: {}", e)))?;

        updated
            .map(|(balance,)| balance)
            .ok_or_else(|| RizzError::NotFound(format!("User not found: {}", user_id)))
    }

    /// Insert-first so concurrent deliveries of one payment serialize on the
    /// write lock; only the delivery that inserted the row grants credits.
    async fn record_purchase(&self, purchase: &Purchase) -> Result<(Purchase, bool)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RizzError::Database(format!("Failed to begin transaction: {}", e)))?;

        let inserted: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO purchases (id, external_payment_id, user_id, plan_id, amount, credits, created_at)
            SELECT ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM users WHERE id = ?)
            ON CONFLICT(external_payment_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(purchase.id.to_string())
        .bind(&purchase.external_payment_id)
        .bind(purchase.user_id.to_string())
        .bind(purchase.plan_id)
        .bind(purchase.amount)
        .bind(purchase.credits)
        .bind(purchase.created_at)
        .bind(purchase.user_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to store purchase: {}", e)))?;

        if inserted.is_none() {
            let existing = sqlx::query_as::<_, PurchaseRow>(
                "SELECT * FROM purchases WHERE external_payment_id = ?",
            )
            .bind(&purchase.external_payment_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to look up purchase: {}", e)))?;

            return match existing {
                Some(existing) => {
                    debug!(
                        "Purchase {} already recorded, skipping",
                        purchase.external_payment_id
                    );
                    Ok((Purchase::try_from(existing)?, false))
                }
                None => Err(RizzError::NotFound(format!(
                    "User not found: {}",
                    purchase.user_id
                ))),
            };
        }

        sqlx::query(
            "UPDATE users SET credit_balance = credit_balance + ?, plan_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(purchase.credits)
        .bind(purchase.plan_id)
        .bind(Utc::now())
        .bind(purchase.user_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to grant credits: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| RizzError::Database(format!("Failed to commit transaction: {}", e)))?;

        info!(
            "Recorded purchase {}: {} credits for user {}",
            purchase.external_payment_id, purchase.credits, purchase.user_id
        );
        Ok((purchase.clone(), true))
    }

    async fn list_purchases(&self, user_id: Uuid) -> Result<Vec<Purchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(
            "SELECT * FROM purchases WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to list purchases: {}", e)))?;

        rows.into_iter().map(Purchase::try_from).collect()
    }

    async fn insert_referral(&self, item: &ReferralItem) -> Result<()> {
        let embedding = item
            .embedding
            .as_ref()
            .map(|e| to_json(e, "embedding"))
            .transpose()?;

        sqlx::query(&format!(
            "INSERT INTO referral_items ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            REFERRAL_COLUMNS
        ))
        .bind(item.id.to_string())
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.category.as_str())
        .bind(&item.url)
        .bind(&item.image_url)
        .bind(item.price)
        .bind(&item.currency)
        .bind(to_json(&item.tags, "tags")?)
        .bind(embedding)
        .bind(item.clicks)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to store referral: {}", e)))?;

        debug!("Stored referral item: {}", item.id);
        Ok(())
    }

    async fn update_referral(&self, item: &ReferralItem) -> Result<()> {
        let embedding = item
            .embedding
            .as_ref()
            .map(|e| to_json(e, "embedding"))
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE referral_items
            SET name = ?, description = ?, category = ?, url = ?, image_url = ?, price = ?,
                currency = ?, tags = ?, embedding = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.category.as_str())
        .bind(&item.url)
        .bind(&item.image_url)
        .bind(item.price)
        .bind(&item.currency)
        .bind(to_json(&item.tags, "tags")?)
        .bind(embedding)
        .bind(item.updated_at)
        .bind(item.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to update referral: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RizzError::NotFound(format!("Referral not found: {}", item.id)));
        }

        debug!("Updated referral item: {}", item.id);
        Ok(())
    }

    async fn delete_referral(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM referral_items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to delete referral: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_referral(&self, id: Uuid) -> Result<Option<ReferralItem>> {
        let row = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {} FROM referral_items WHERE id = ?",
            REFERRAL_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to get referral: {}", e)))?;

        row.map(ReferralItem::try_from).transpose()
    }

    async fn list_referrals(&self, query: &ReferralQuery) -> Result<Vec<ReferralItem>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM referral_items WHERE 1 = 1",
            REFERRAL_COLUMNS
        ));

        if let Some(category) = query.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }

        if let Some(tag) = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            builder
                .push(" AND EXISTS (SELECT 1 FROM json_each(referral_items.tags) WHERE lower(json_each.value) = lower(")
                .push_bind(tag.to_string())
                .push("))");
        }

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like_pattern(search));
            builder
                .push(" AND (name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR description LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        builder.push(match query.sort {
            ReferralSort::Newest => " ORDER BY created_at DESC",
            ReferralSort::Popular => " ORDER BY clicks DESC, created_at DESC",
            ReferralSort::PriceAsc => " ORDER BY price IS NULL, price ASC, created_at DESC",
            ReferralSort::PriceDesc => " ORDER BY price IS NULL, price DESC, created_at DESC",
        });

        builder
            .push(" LIMIT ")
            .push_bind(query.limit.clamp(1, MAX_PAGE_SIZE) as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows = builder
            .build_query_as::<ReferralRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to list referrals: {}", e)))?;

        rows.into_iter().map(ReferralItem::try_from).collect()
    }

    async fn referrals_with_embeddings(&self) -> Result<Vec<ReferralItem>> {
        let rows = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {} FROM referral_items WHERE embedding IS NOT NULL",
            REFERRAL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to list referrals: {}", e)))?;

        rows.into_iter().map(ReferralItem::try_from).collect()
    }

    async fn increment_clicks(&self, id: Uuid) -> Result<Option<String>> {
        let url: Option<(String,)> = sqlx::query_as(
            "UPDATE referral_items SET clicks = clicks + 1 WHERE id = ? RETURNING url",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to record click: {}", e)))?;

        Ok(url.map(|(url,)| url))
    }

    async fn insert_event(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, name, path, user_id, visitor_hash, referrer, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(&event.name)
        .bind(&event.path)
        .bind(event.user_id.map(|u| u.to_string()))
        .bind(&event.visitor_hash)
        .bind(&event.referrer)
        .bind(event.created_at)
        .bind(event.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to store event: {}", e)))?;

        Ok(())
    }

    async fn page_view_stats(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PathStat>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT path, COUNT(*) AS views
            FROM events
            WHERE name = 'page_view' AND created_at >= ? AND expires_at > ?
            GROUP BY path
            ORDER BY views DESC, path ASC
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(now)
        .bind(limit.clamp(1, MAX_PAGE_SIZE) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RizzError::Database(format!("Failed to compute page stats: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(path, views)| PathStat { path, views })
            .collect())
    }

    async fn purge_expired_events(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to purge events: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<StorageHealth> {
        let count: std::result::Result<(i64,), sqlx::Error> =
            sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await;

        Ok(match count {
            Ok((users,)) => StorageHealth {
                status: StorageStatus::Healthy,
                connection_pool_size: Some(self.pool.size() as usize),
                user_count: Some(users),
            },
            Err(e) => {
                tracing::error!("Storage health check failed: {}", e);
                StorageHealth {
                    status: StorageStatus::Unhealthy,
                    connection_pool_size: Some(self.pool.size() as usize),
                    user_count: None,
                }
            }
        })
    }
}
