use std::sync::Arc;

use mailquote_agent::{HttpLlmClient, LlmError, LlmRequestExtractor};
use mailquote_core::config::AppConfig;
use mailquote_core::extraction::ReferenceFilter;
use mailquote_core::ports::ExternalError;
use mailquote_core::{PipelineDeps, PipelineSettings, QuotePipeline};
use mailquote_db::{
    connect_with_settings, migrations, DbPool, SqlAnalysisRepository, SqlCorrectionRepository,
    SqlSourceRepository,
};
use thiserror::Error;
use tracing::info;

/// Everything a pipeline command needs, wired against the configured backends.
pub struct Workspace {
    pub config: AppConfig,
    pub pool: DbPool,
    pub sources: Arc<SqlSourceRepository>,
    pub pipeline: QuotePipeline,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(String),
    #[error("database migration failed: {0}")]
    Migration(String),
    #[error("erp client setup failed: {0}")]
    Erp(#[from] ExternalError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
}

impl BootstrapError {
    pub fn class(&self) -> &'static str {
        match self {
            Self::DatabaseConnect(_) => "db_connectivity",
            Self::Migration(_) => "migration",
            Self::Erp(_) | Self::Llm(_) => "integration_setup",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DatabaseConnect(_) => 4,
            Self::Migration(_) => 5,
            Self::Erp(_) | Self::Llm(_) => 8,
        }
    }
}

/// Connects and applies pending migrations.
pub async fn open_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    // Every pooled connection to `:memory:` would see its own empty database.
    let max_connections = if config.database.url.contains(":memory:") {
        1
    } else {
        config.database.max_connections
    };
    let pool =
        connect_with_settings(&config.database.url, max_connections, config.database.timeout_secs)
            .await
            .map_err(|error| BootstrapError::DatabaseConnect(error.to_string()))?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&pool)
        .await
        .map_err(|error| BootstrapError::Migration(error.to_string()))?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );
    Ok(pool)
}

pub async fn open(config: AppConfig) -> Result<Workspace, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting pipeline bootstrap"
    );
    let pool = open_database(&config).await?;

    let (registry, catalog) = mailquote_erp::connect(&config)?;
    let llm = HttpLlmClient::from_config(&config.llm)?;
    let settings = PipelineSettings::from_config(&config);
    let filter = ReferenceFilter::new(&settings.extra_denylist, &settings.extra_placeholders);

    let sources = Arc::new(SqlSourceRepository::new(pool.clone()));
    let deps = PipelineDeps {
        documents: sources.clone(),
        extractor: Arc::new(LlmRequestExtractor::new(Arc::new(llm), filter)),
        registry: Arc::new(registry),
        catalog: Arc::new(catalog),
        analyses: Arc::new(SqlAnalysisRepository::new(pool.clone())),
        corrections: Arc::new(SqlCorrectionRepository::new(pool.clone())),
    };
    let pipeline = QuotePipeline::new(deps, settings);

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_model = %config.llm.model,
        "pipeline ready"
    );
    Ok(Workspace { config, pool, sources, pipeline })
}
