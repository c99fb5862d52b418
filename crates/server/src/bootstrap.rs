use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use taxcase_core::config::{AppConfig, ConfigError, LoadOptions};
use taxcase_core::events::{ChannelPublisher, EventPublisher};
use taxcase_core::notify::TracingNotificationSink;
use taxcase_core::storage::InMemoryUploadStore;
use taxcase_db::repositories::{SqlDocumentRepository, SqlFilingRepository, SqlStaffDirectory};
use taxcase_db::{connect, migrations, DbPool};
use taxcase_engine::{
    ChecklistService, DocumentReviewPipeline, DocumentVersionStore, FilingLifecycleManager,
    NotificationDispatcher,
};

use crate::state::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
    pub dispatcher: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let filings = Arc::new(SqlFilingRepository::new(db_pool.clone()));
    let documents = Arc::new(SqlDocumentRepository::new(db_pool.clone()));
    let staff = Arc::new(SqlStaffDirectory::new(db_pool.clone()));
    let uploads = Arc::new(InMemoryUploadStore::default());

    let (publisher, receiver) = ChannelPublisher::new();
    let dispatcher = NotificationDispatcher::spawn(receiver, Arc::new(TracingNotificationSink));
    let events: Arc<dyn EventPublisher> = Arc::new(publisher);

    let state = AppState {
        lifecycle: Arc::new(FilingLifecycleManager::new(
            filings.clone(),
            staff,
            events.clone(),
        )),
        documents: Arc::new(DocumentVersionStore::new(
            documents.clone(),
            filings.clone(),
            uploads,
            events.clone(),
        )),
        pipeline: Arc::new(DocumentReviewPipeline::new(documents.clone(), events)),
        checklist: Arc::new(ChecklistService::new(filings, documents)),
    };

    Ok(Application { config, db_pool, state, dispatcher })
}

#[cfg(test)]
mod tests {
    use taxcase_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_smoke_covers_config_pool_and_migrations() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed against an in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('filing', 'filing_status_log', 'document', 'audit_log')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables after bootstrap");
        assert_eq!(table_count, 4, "bootstrap should expose the filing-path tables");

        app.dispatcher.abort();
    }
}
