use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Credits granted to a freshly created account.
pub const DEFAULT_CREDIT_BALANCE: i64 = 10;

/// Plan every account starts on.
pub const FREE_PLAN_ID: i32 = 1;

pub const DEFAULT_LANGUAGE: &str = "en";

// User types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub username: String,
    pub photo_url: Option<String>,
    pub credit_balance: i64,
    pub plan_id: i32,
    pub role: UserRole,
    pub profile: UserProfile,
    pub onboarded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Fields required the first time an account is seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub external_id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub relationship_goal: Option<String>,
}

impl UserProfile {
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

// Knowledge types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeRecord {
    pub id: Uuid,
    /// `None` marks a global record visible to every user.
    pub owner: Option<Uuid>,
    /// The user who submitted the record, also for global records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<Uuid>,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub category: KnowledgeCategory,
    pub status: ApprovalStatus,
    pub language: String,
    pub source: KnowledgeSource,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeRecord {
    pub fn is_global(&self) -> bool {
        self.owner.is_none()
    }

    /// Drops the vector, which clients never need.
    pub fn without_embedding(mut self) -> Self {
        self.embedding = Vec::new();
        self
    }
}

/// A fact waiting to be embedded and stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewKnowledge {
    pub owner: Option<Uuid>,
    #[serde(default)]
    pub contributor: Option<Uuid>,
    pub content: String,
    pub category: KnowledgeCategory,
    pub language: String,
    pub source: KnowledgeSource,
    pub status: ApprovalStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredKnowledge {
    pub record: KnowledgeRecord,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    Profile,
    Interest,
    Personality,
    Preference,
    DatingTip,
    Conversation,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSource {
    Onboarding,
    User,
    Admin,
}

// Referral marketplace types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferralItem {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: ReferralCategory,
    pub url: String,
    pub image_url: Option<String>,
    pub price: Option<f64>,
    pub currency: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embedding: Option<Vec<f32>>,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReferralItem {
    /// Text the recommendation embedding is computed from.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}\n{}", self.name, self.description, self.tags.join(", "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ReferralCategory,
    pub url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReferralCategory {
    Product,
    DateIdea,
    Gift,
    Course,
    App,
    Other,
}

// Analytics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub user_id: Option<Uuid>,
    pub visitor_hash: Option<String>,
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathStat {
    pub path: String,
    pub views: i64,
}

// Billing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub id: Uuid,
    pub external_payment_id: String,
    pub user_id: Uuid,
    pub plan_id: i32,
    pub amount: f64,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Plan {
    pub id: i32,
    pub name: &'static str,
    pub price: f64,
    pub credits: i64,
}

// String codecs for the enums persisted as TEXT columns.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = RizzError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(RizzError::Validation(format!(
                        "unknown {} value: {}",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(UserRole { User => "user", Admin => "admin" });
text_enum!(KnowledgeCategory {
    Profile => "profile",
    Interest => "interest",
    Personality => "personality",
    Preference => "preference",
    DatingTip => "dating_tip",
    Conversation => "conversation",
    Other => "other",
});
text_enum!(ApprovalStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});
text_enum!(KnowledgeSource {
    Onboarding => "onboarding",
    User => "user",
    Admin => "admin",
});
text_enum!(ReferralCategory {
    Product => "product",
    DateIdea => "date_idea",
    Gift => "gift",
    Course => "course",
    App => "app",
    Other => "other",
});

// Error types
#[derive(Debug, thiserror::Error)]
pub enum RizzError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RizzError>;

// API response types
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_codec() {
        assert_eq!(KnowledgeCategory::DatingTip.as_str(), "dating_tip");
        assert_eq!(
            "date_idea".parse::<ReferralCategory>().unwrap(),
            ReferralCategory::DateIdea
        );
        assert_eq!(ApprovalStatus::Approved.to_string(), "approved");
        assert!("superuser".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_enum_serde_matches_text_codec() {
        let json = serde_json::to_string(&KnowledgeCategory::DatingTip).unwrap();
        assert_eq!(json, "\"dating_tip\"");
        let source: KnowledgeSource = serde_json::from_str("\"onboarding\"").unwrap();
        assert_eq!(source, KnowledgeSource::Onboarding);
    }

    #[test]
    fn test_record_without_embedding() {
        let record = KnowledgeRecord {
            id: Uuid::new_v4(),
            owner: None,
            contributor: None,
            content: "Likes hiking".to_string(),
            embedding: vec![0.1, 0.2],
            embedding_model: "test".to_string(),
            category: KnowledgeCategory::Interest,
            status: ApprovalStatus::Approved,
            language: "en".to_string(),
            source: KnowledgeSource::Admin,
            created_at: Utc::now(),
        };

        assert!(record.is_global());
        let stripped = record.without_embedding();
        assert!(stripped.embedding.is_empty());
        let json = serde_json::to_value(&stripped).unwrap();
        assert!(json.get("embedding").is_none());
    }

    #[test]
    fn test_profile_language_default() {
        let profile = UserProfile::default();
        assert_eq!(profile.language_or_default(), "en");
    }

    #[test]
    fn test_api_response() {
        let response = ApiResponse::success("data");
        assert!(response.success);
        assert_eq!(response.data, Some("data"));

        let error_response: ApiResponse<String> = ApiResponse::error("error".to_string());
        assert!(!error_response.success);
        assert_eq!(error_response.error, Some("error".to_string()));
    }
}
