pub mod kv;
pub mod postgres;
pub mod reports;

use crate::config::Settings;
use anyhow::Context;
use std::sync::Arc;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use reports::{ReportStore, Snapshot};

/// Key holding the serialized report collection.
pub const REPORTS_KEY: &str = "researchReports";
/// Prefix of the per-session admin flag keys (`isAdminAuthenticated_<token>`).
pub const AUTH_FLAG_KEY: &str = "isAdminAuthenticated";

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Opens the configured backend: Postgres when `DATABASE_URL` is set, the store directory otherwise.
pub async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    if let Some(db_url) = settings.database_url.as_deref() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        migrate(&pool).await?;
        tracing::info!("using postgres key-value store");
        return Ok(Arc::new(postgres::PgStore::new(pool)));
    }

    let dir = settings.store_dir();
    tracing::info!(dir = %dir.display(), "using file key-value store");
    Ok(Arc::new(FileStore::open(dir).await?))
}
