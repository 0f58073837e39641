use std::sync::Arc;

use anyhow::Context;

use mendy_core::config::AppConfig;
use mendy_core::notify::{Notifier, TracingNotifier};
use mendy_db::repositories::{SqlAuditLogRepository, SqlRequestStore};
use mendy_db::{connect_with_config, migrations, DbPool, LifecycleService};

use crate::notify::WebhookNotifier;

pub struct App {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<LifecycleService>,
}

pub async fn bootstrap_with_config(config: AppConfig) -> anyhow::Result<App> {
    let db_pool = connect_with_config(&config.database)
        .await
        .with_context(|| format!("connecting to database at `{}`", config.database.url))?;

    migrations::run_pending(&db_pool).await.context("applying pending migrations")?;

    let notifier: Arc<dyn Notifier> = match (&config.notifier.enabled, &config.notifier.webhook_url)
    {
        (true, Some(url)) => Arc::new(WebhookNotifier::new(
            url.clone(),
            config.notifier.bearer_token.clone(),
        )),
        _ => Arc::new(TracingNotifier),
    };

    let service = Arc::new(LifecycleService::new(
        Arc::new(SqlRequestStore::new(db_pool.clone())),
        Arc::new(SqlAuditLogRepository::new(db_pool.clone())),
        notifier,
    ));

    Ok(App { config, db_pool, service })
}
