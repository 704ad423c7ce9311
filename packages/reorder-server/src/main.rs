//! Reorder Server Binary
//!
//! Standalone HTTP endpoint running the two-phase reorder executor against the
//! SQLite member store.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin reorder-server
//!
//! # Custom port and database
//! REORDER_SERVER_PORT=3002 LISTSHARE_DB_PATH=/tmp/listshare.db cargo run --bin reorder-server
//! ```
//!
//! # Environment Variables
//!
//! - `REORDER_SERVER_PORT`: Server port (default: 3001)
//! - `LISTSHARE_DB_PATH`: Database file (default: `~/.listshare/database/listshare.db`)
//! - `LISTSHARE_TEMP_STRATEGY`, `LISTSHARE_TEMP_MARGIN`, `LISTSHARE_CHECK_GENERATION`:
//!   see `ReorderConfig::from_env`
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use listshare_core::db::SqliteMemberStore;
use listshare_core::{ReorderConfig, ReorderExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port = env::var("REORDER_SERVER_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3001);

    let db_path = match env::var("LISTSHARE_DB_PATH") {
        Ok(path) => PathBuf::from(path),
        Err(_) => dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?
            .join(".listshare")
            .join("database")
            .join("listshare.db"),
    };

    let config = ReorderConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!("Database: {}", db_path.display());
    tracing::info!("Temp key strategy: {:?}", config.temp_keys);

    let store = Arc::new(SqliteMemberStore::new(db_path).await?);
    let executor = Arc::new(ReorderExecutor::new(store, config)?);

    listshare_core::http::start_server(executor, port).await?;

    Ok(())
}
