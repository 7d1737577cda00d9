mod api;
mod auth;
mod config;
mod db;
mod mail;
mod models;
mod response;
mod util;

use std::sync::Arc;
use tracing::info;
use util::logging::init_tracing;

use crate::response::ServerResult;

#[tokio::main]
async fn main() -> ServerResult<()> {
    let config = config::AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}", e);
        std::process::exit(1);
    });

    init_tracing(&config.log_level);
    info!("Starting tenantry");

    info!("Connecting to database");
    let db = Arc::new(db::Mongo::connect(&config.mongo_uri, &config.mongo_db).await?);
    db.ensure_indexes().await?;

    let mailer = mail::mailer_from_config(&config);
    let config = Arc::new(config);

    if let Err(e) = api::serve::serve(db, config, mailer).await {
        tracing::error!("Server exited: {}", e);
    }
    Ok(())
}
