use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// SQLite is file-based; synchronous connections created on demand from a
// shared database URL are simpler than an async pool and good enough for a
// sequential sync job.
pub type StorePool = Arc<Mutex<String>>;
pub type StoreConnection = SqliteConnection;

/// Initialize the archive database at a path and run pending migrations.
pub fn init_store_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db_url = format!("sqlite://{}", db_path.display());
    debug!("initializing archive database at {}", db_path.display());

    let mut conn = SqliteConnection::establish(&db_url)
        .context("Failed to connect to archive database")?;

    // WAL must be set outside a transaction.
    diesel::sql_query("PRAGMA journal_mode = WAL")
        .execute(&mut conn)
        .context("Failed to enable WAL mode")?;

    diesel::sql_query("PRAGMA foreign_keys = ON")
        .execute(&mut conn)
        .context("Failed to enable foreign keys")?;

    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    Ok(())
}

/// Create the connection pool for the archive database, running migrations.
pub fn create_store_pool(db_path: &Path) -> Result<StorePool> {
    init_store_db(db_path)?;
    let db_url = format!("sqlite://{}", db_path.display());
    Ok(Arc::new(Mutex::new(db_url)))
}

/// Get a connection from the pool. Creates a fresh synchronous connection.
pub async fn get_connection(pool: &StorePool) -> Result<StoreConnection> {
    let db_url = pool.lock().await.clone();
    SqliteConnection::establish(&db_url).context("Failed to establish SQLite connection")
}
