//! Category inserts inside one session-wide transaction.

use async_trait::async_trait;
use pgseed_core::CategoryDraft;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{QueryBuilder, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::CategoryTables;
use crate::{CategorySink, StoreError};

/// Column list shared by every category insert.
pub fn insert_head(tables: &CategoryTables) -> String {
    format!(
        "INSERT INTO {} (name, description, category_type, visibility_scope, entity_id, parent_category_id) ",
        tables.categories
    )
}

/// Holds the transaction for a whole category session.
///
/// Nothing becomes visible to other connections until [`CategorySink::commit`];
/// dropping the session without committing rolls everything back.
pub struct PgCategorySession {
    tx: Option<Transaction<'static, Postgres>>,
    insert_head: String,
    category_type: String,
    visibility_scope: String,
}

impl PgCategorySession {
    pub async fn begin(pool: &PgPool, tables: &CategoryTables) -> Result<Self, StoreError> {
        let tx = pool.begin().await?;
        debug!(table = %tables.categories, "category session started");
        Ok(Self {
            tx: Some(tx),
            insert_head: insert_head(tables),
            category_type: tables.category_type.to_string(),
            visibility_scope: tables.visibility_scope.to_string(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}

fn open_tx<T>(slot: &mut Option<T>) -> Result<&mut T, StoreError> {
    slot.as_mut().ok_or(StoreError::SessionClosed)
}

/// Ends the session: the transaction can be taken exactly once.
fn take_tx<T>(slot: &mut Option<T>) -> Result<T, StoreError> {
    slot.take().ok_or(StoreError::SessionClosed)
}

#[async_trait]
impl CategorySink for PgCategorySession {
    async fn insert_categories(
        &mut self,
        entity_id: Uuid,
        parent: Option<Uuid>,
        drafts: &[CategoryDraft],
    ) -> Result<Vec<Uuid>, StoreError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(self.insert_head.as_str());
        builder.push_values(drafts, |mut row, draft| {
            row.push_bind(draft.name.as_str())
                .push_bind(draft.description.as_str())
                .push(&self.category_type)
                .push(&self.visibility_scope)
                .push_bind(entity_id)
                .push_bind(parent);
        });
        builder.push(" RETURNING id");

        let tx = open_tx(&mut self.tx)?;
        let ids = builder
            .build_query_scalar::<Uuid>()
            .fetch_all(&mut **tx)
            .await?;

        if ids.len() != drafts.len() {
            return Err(StoreError::InsertMismatch {
                expected: drafts.len(),
                actual: ids.len(),
            });
        }
        debug!(%entity_id, ?parent, count = ids.len(), "categories inserted");
        Ok(ids)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = take_tx(&mut self.tx)?;
        tx.commit().await?;
        info!("category session committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if let Ok(tx) = take_tx(&mut self.tx) {
            tx.rollback().await?;
            info!("category session rolled back");
        }
        Ok(())
    }
}
