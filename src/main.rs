use anyhow::{Context, Result};
use rizz_api::{
    auth::AuthService,
    rizz_core::{database::DatabaseManager, rizz::OpenAiTipModel, RizzCore},
    ApiServer, AppState,
};
use rizz_knowledge::OpenAiEmbedder;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod settings;
use settings::Settings;

const DEFAULT_LOG_FILTER: &str =
    "arabian_rizz=debug,rizz_api=debug,rizz_core=debug,rizz_knowledge=debug,tower_http=debug";

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let settings = Settings::load().context("Failed to load settings")?;
    init_tracing(settings.log_json);

    info!("Starting ArabianRizz API ({})", settings.environment);

    if let Err(problems) = settings.validate() {
        for problem in &problems {
            error!("Invalid setting: {}", problem);
        }
        anyhow::bail!("Invalid configuration: {}", problems.join("; "));
    }

    let database = Arc::new(
        DatabaseManager::new(settings.database_config())
            .await
            .context("Failed to open database")?,
    );

    let embedder = Arc::new(
        OpenAiEmbedder::new(settings.embedding_config()).context("Failed to create embedder")?,
    );
    let core_config = settings.core_config();
    let tip_model = Arc::new(OpenAiTipModel::new(&core_config.generation));

    let core = Arc::new(RizzCore::new(&database, embedder, tip_model, core_config));
    let auth = Arc::new(AuthService::new(settings.auth_config()));
    let state = AppState::new(core, database.clone(), auth);

    let server = ApiServer::new(settings.api_config(), state);
    server
        .health_check()
        .await
        .map_err(|e| anyhow::anyhow!("Startup health check failed: {}", e))?;

    let result = server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e));

    database.close().await;
    info!("ArabianRizz API shut down");
    result
}
