//! Canonical store (MongoDB) access
//!
//! Document-oriented persistence for editais, job executions, conversations
//! and users. All writes are atomic per document; no cross-document
//! transactions are used.

pub mod models;
pub mod repository;

pub use repository::Repository;

use crate::config::MongoConfig;
use crate::errors::Result;
use mongodb::{bson::doc, Client, Database};
use tracing::info;

/// Connect to the configured MongoDB deployment and return the database handle
pub async fn connect(config: &MongoConfig) -> Result<Database> {
    let client = Client::with_uri_str(&config.uri).await?;
    let db = client.database(&config.database);

    // Fail fast at startup when the store is unreachable
    db.run_command(doc! { "ping": 1 }).await?;
    info!(database = %config.database, "Connected to MongoDB");

    Ok(db)
}
