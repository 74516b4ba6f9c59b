use std::sync::Arc;

use axum::Router;
use signoff_core::{AppConfig, ApprovalWorkflow, ConfigError, UserDirectory};
use signoff_db::{connect, migrations, DbPool, SqlOrderGateway, SqlUserDirectory};
use signoff_notify::{HttpNotificationDispatcher, LogOnlyEmailTransport};
use thiserror::Error;
use tracing::info;

use crate::{approvals, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub router: Router,
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

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!("database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!("database migrations applied");

    let gateway = Arc::new(SqlOrderGateway::new(db_pool.clone()));
    let directory = Arc::new(SqlUserDirectory::new(db_pool.clone()));
    let dispatcher = HttpNotificationDispatcher::new(LogOnlyEmailTransport);
    let workflow = Arc::new(ApprovalWorkflow::new(
        gateway,
        directory.clone(),
        dispatcher,
        config.approvals.clone(),
        config.notifications.clone(),
    ));

    let router = approvals::router(workflow, directory as Arc<dyn UserDirectory>)
        .merge(health::router(db_pool.clone()));

    Ok(Application { config, db_pool, router })
}

#[cfg(test)]
mod tests {
    use signoff_core::AppConfig;

    use crate::bootstrap::bootstrap_with_config;

    #[tokio::test]
    async fn bootstrap_prepares_schema_and_routes() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:?cache=shared".to_string();

        let app = bootstrap_with_config(config).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('purchase_order', 'app_user')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema tables should exist after bootstrap");
        assert_eq!(table_count, 2);

        app.db_pool.close().await;
    }
}
