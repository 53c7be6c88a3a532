use config::{Config, ConfigError, Environment, File};
use rizz_api::{auth::AuthConfig, ApiConfig};
use rizz_core::{database::DatabaseConfig, rizz::GenerationConfig, CoreConfig};
use rizz_knowledge::EmbeddingConfig;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_JWT_SECRET: &str = "default-secret-change-in-production";
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `development` relaxes the JWT secret check.
    pub environment: String,
    pub log_json: bool,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub openai: OpenAiSettings,
    pub analytics: AnalyticsSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_request_size: usize,
    pub rate_limit_requests_per_minute: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub admin_subjects: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub embed_referrals: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    pub visitor_hash_salt: String,
    pub purge_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_json: false,
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            auth: AuthSettings::default(),
            openai: OpenAiSettings::default(),
            analytics: AnalyticsSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        let api = ApiConfig::default();
        Self {
            host: api.host,
            port: api.port,
            cors_origins: api.cors_origins,
            max_request_size: api.max_request_size,
            rate_limit_requests_per_minute: api.rate_limit_requests_per_minute,
            request_timeout_secs: api.request_timeout_secs,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        let database = DatabaseConfig::default();
        Self {
            url: database.database_url,
            max_connections: database.max_connections,
            min_connections: database.min_connections,
            connect_timeout_secs: database.connect_timeout.as_secs(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        let auth = AuthConfig::default();
        Self {
            jwt_secret: auth.jwt_secret,
            issuer: auth.issuer,
            audience: auth.audience,
            admin_subjects: auth.admin_subjects,
        }
    }
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        let generation = GenerationConfig::default();
        let embedding = EmbeddingConfig::default();
        Self {
            api_key: None,
            api_base: None,
            chat_model: generation.model,
            embedding_model: embedding.model,
            embedding_dimension: embedding.dimension,
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            embed_referrals: true,
        }
    }
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            visitor_hash_salt: CoreConfig::default().visitor_hash_salt,
            purge_interval_secs: ApiConfig::default().event_purge_interval_secs,
        }
    }
}

impl Settings {
    /// Defaults, then `config/default.toml`, `config/local.toml` and `RIZZ__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("RIZZ")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .with_list_parse_key("auth.admin_subjects")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Every problem with the loaded settings, so startup can report them at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.database.url.trim().is_empty() {
            problems.push("database.url must not be empty".to_string());
        }
        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_string());
        }
        if self.server.rate_limit_requests_per_minute == 0 {
            problems.push("server.rate_limit_requests_per_minute must be positive".to_string());
        }
        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            problems.push(format!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            ));
        }
        if !self.is_development() && self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            problems.push("auth.jwt_secret must be changed outside development".to_string());
        }
        if self.openai_key().is_none() {
            problems.push("openai.api_key or OPENAI_API_KEY must be set".to_string());
        }
        if self.openai.embedding_dimension == 0 {
            problems.push("openai.embedding_dimension must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    fn openai_key(&self) -> Option<String> {
        self.openai
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            cors_origins: self.server.cors_origins.clone(),
            max_request_size: self.server.max_request_size,
            rate_limit_requests_per_minute: self.server.rate_limit_requests_per_minute,
            request_timeout_secs: self.server.request_timeout_secs,
            event_purge_interval_secs: self.analytics.purge_interval_secs,
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            database_url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            min_connections: self.database.min_connections,
            connect_timeout: Duration::from_secs(self.database.connect_timeout_secs),
            ..DatabaseConfig::default()
        }
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            jwt_secret: self.auth.jwt_secret.clone(),
            issuer: self.auth.issuer.clone(),
            audience: self.auth.audience.clone(),
            admin_subjects: self.auth.admin_subjects.clone(),
            ..AuthConfig::default()
        }
    }

    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            api_key: self.openai_key(),
            api_base: self.openai.api_base.clone(),
            model: self.openai.embedding_model.clone(),
            dimension: self.openai.embedding_dimension,
        }
    }

    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            generation: GenerationConfig {
                api_key: self.openai_key(),
                api_base: self.openai.api_base.clone(),
                model: self.openai.chat_model.clone(),
                max_tokens: self.openai.max_tokens,
                temperature: self.openai.temperature,
                ..GenerationConfig::default()
            },
            visitor_hash_salt: self.analytics.visitor_hash_salt.clone(),
            embed_referrals: self.openai.embed_referrals,
        }
    }
}
