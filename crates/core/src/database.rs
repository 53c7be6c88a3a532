use rizz_common::{Result, RizzError};
use rizz_knowledge::SqliteKnowledgeStore;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL or file path
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,
    /// Idle timeout for connections
    pub idle_timeout: Option<Duration>,
    /// Enable WAL mode for better concurrency
    pub enable_wal_mode: bool,
    /// Enable foreign key constraints
    pub enable_foreign_keys: bool,
    /// SQLite synchronous mode
    pub synchronous_mode: SqliteSynchronous,
    /// Run migrations on startup
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/arabian_rizz.db".to_string(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(3600)), // 1 hour
            idle_timeout: Some(Duration::from_secs(600)),   // 10 minutes
            enable_wal_mode: true,
            enable_foreign_keys: true,
            synchronous_mode: SqliteSynchronous::Normal,
            auto_migrate: true,
        }
    }
}

/// Database connection pool manager
pub struct DatabaseManager {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl DatabaseManager {
    /// Create a new database manager with configuration
    #[instrument(skip(config))]
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        info!("Initializing database connection pool");

        // Ensure database directory exists
        let file_path = config
            .database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        if let Some(parent) = Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RizzError::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let mut connect_options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| RizzError::Database(format!("Invalid database URL: {}", e)))?;

        connect_options = connect_options
            .create_if_missing(true)
            .foreign_keys(config.enable_foreign_keys)
            .synchronous(config.synchronous_mode);

        if config.enable_wal_mode {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);

        if let Some(max_lifetime) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(max_lifetime);
        }

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| RizzError::Database(format!("Failed to create connection pool: {}", e)))?;

        let manager = Self { pool, config };

        if manager.config.auto_migrate {
            manager.run_migrations().await?;
        }

        let health = manager.health_check().await?;
        if !health.is_healthy {
            return Err(RizzError::Database(
                health
                    .error_message
                    .unwrap_or_else(|| "Database is unhealthy".to_string()),
            ));
        }

        info!("Database connection pool initialized successfully");
        Ok(manager)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Run the embedded migrations and create the knowledge schema
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("Migration failed: {}", e)))?;

        SqliteKnowledgeStore::init_schema(&self.pool).await?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Perform health check on the database connection
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<DatabaseHealth> {
        debug!("Performing database health check");

        let start_time = std::time::Instant::now();
        let connectivity_result = sqlx::query("SELECT 1").fetch_one(&self.pool).await;
        let connectivity_time = start_time.elapsed();

        if let Err(e) = connectivity_result {
            error!("Database connectivity check failed: {}", e);
            return Ok(DatabaseHealth {
                is_healthy: false,
                connectivity_ms: connectivity_time.as_millis() as u64,
                pool_stats: self.get_pool_stats(),
                error_message: Some(format!("Connectivity check failed: {}", e)),
            });
        }

        let health = DatabaseHealth {
            is_healthy: connectivity_time < Duration::from_millis(1000),
            connectivity_ms: connectivity_time.as_millis() as u64,
            pool_stats: self.get_pool_stats(),
            error_message: None,
        };

        if health.is_healthy {
            debug!("Database health check passed");
        } else {
            warn!("Database health check indicates degraded performance");
        }

        Ok(health)
    }

    /// Get connection pool statistics
    pub fn get_pool_stats(&self) -> PoolStats {
        PoolStats {
            connections_total: self.pool.size(),
            connections_idle: self.pool.num_idle() as u32,
        }
    }

    /// Refresh query planner statistics and reclaim free pages
    #[instrument(skip(self))]
    pub async fn optimize(&self) -> Result<()> {
        info!("Running database optimization");

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("ANALYZE failed: {}", e)))?;

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| RizzError::Database(format!("VACUUM failed: {}", e)))?;

        info!("Database optimization completed");
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// Database health information
#[derive(Debug, Clone)]
pub struct DatabaseHealth {
    pub is_healthy: bool,
    pub connectivity_ms: u64,
    pub pool_stats: PoolStats,
    pub error_message: Option<String>,
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub connections_total: u32,
    pub connections_idle: u32,
}
