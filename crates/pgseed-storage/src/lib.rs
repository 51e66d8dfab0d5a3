//! PostgreSQL access and configuration for the pgseed wizards.

use async_trait::async_trait;
use pgseed_core::{CategoryDraft, FormField};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub mod categories;
pub mod config;
pub mod forms;
pub mod ident;

pub use categories::PgCategorySession;
pub use sqlx::postgres::PgPool;
pub use config::{AppConfig, CategoryTables, ConfigError, DatabaseConfig, FormTables};
pub use forms::PgFormCatalog;

pub const CRATE_NAME: &str = "pgseed-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
    #[error("expected {expected} inserted rows, database reported {actual}")]
    InsertMismatch { expected: usize, actual: usize },
    #[error("order_index {position} does not fit the order_index column")]
    OrderIndexOverflow { position: usize },
    #[error("category session is already closed")]
    SessionClosed,
}

/// Lookups and the bulk insert used by the form field mapping wizard.
#[async_trait]
pub trait FormCatalog: Send + Sync {
    async fn form_exists(&self, form_id: &str) -> Result<bool, StoreError>;

    async fn field_by_id(&self, field_id: &str) -> Result<Option<FormField>, StoreError>;

    async fn all_fields(&self) -> Result<Vec<FormField>, StoreError>;

    async fn mapping_exists(&self, form_id: &str, field_id: &str) -> Result<bool, StoreError>;

    /// Inserts one mapping per field with `order_index` 1..N, all or nothing.
    async fn insert_mappings(&self, form_id: &str, fields: &[FormField]) -> Result<u64, StoreError>;
}

/// Transactional sink for a category session.
#[async_trait]
pub trait CategorySink: Send {
    /// Inserts `drafts` under `parent` and returns their ids in input order.
    async fn insert_categories(
        &mut self,
        entity_id: Uuid,
        parent: Option<Uuid>,
        drafts: &[CategoryDraft],
    ) -> Result<Vec<Uuid>, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Discards everything inserted so far. Safe to call on a closed session.
    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Opens a pool and verifies it with a round trip.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let options = config.connect_options().map_err(StoreError::Connect)?;
    debug!(db = %config.display_target(), "connecting to postgres");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .connect_with(options)
        .await
        .map_err(StoreError::Connect)?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(StoreError::Connect)?;

    info!(db = %config.display_target(), "database connected");
    Ok(pool)
}

/// Connects, pings and closes again.
pub async fn check_connection(config: &DatabaseConfig) -> Result<(), StoreError> {
    let pool = connect(config).await?;
    pool.close().await;
    Ok(())
}
