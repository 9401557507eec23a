use anyhow::Context;
use bson::doc;
use mongodb::{options::ClientOptions, Client, Database};
use tracing::info;

use crate::config::AppConfig;

/// Connects to MongoDB and pings the server once before serving.
pub async fn connect(config: &AppConfig) -> anyhow::Result<Database> {
    let mut opts = ClientOptions::parse(&config.mongodb_uri)
        .await
        .context("parse MONGODB_URI")?;
    opts.app_name = Some(env!("CARGO_PKG_NAME").to_string());
    opts.server_selection_timeout = Some(config.db_timeout);

    let client = Client::with_options(opts).context("build mongodb client")?;
    let db = client.database(&config.mongodb_db);
    db.run_command(doc! { "ping": 1 })
        .await
        .context("ping mongodb")?;

    info!(database = %config.mongodb_db, "connected to mongodb");
    Ok(db)
}
