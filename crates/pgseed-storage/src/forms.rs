//! Form, field and mapping queries.
//!
//! Ids are compared through `::text` so the tables may key on uuid, integer or
//! text columns alike; the wizard only ever handles ids as strings. Each input
//! id is bound as the array of its [`id_lookup_keys`], so `67E5...` still finds
//! a uuid row and `007` an integer one.

use async_trait::async_trait;
use pgseed_core::{id_lookup_keys, FormField};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::config::FormTables;
use crate::{FormCatalog, StoreError};

/// SQL text for the configured tables, rendered once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormQueries {
    pub form_exists: String,
    pub field_by_id: String,
    pub all_fields: String,
    pub mapping_exists: String,
    pub insert_mapping: String,
}

impl FormQueries {
    pub fn new(tables: &FormTables) -> Self {
        let FormTables {
            forms,
            fields,
            mappings,
        } = tables;
        Self {
            form_exists: format!("SELECT 1 FROM {forms} WHERE id::text = ANY($1) LIMIT 1"),
            field_by_id: format!(
                "SELECT id::text AS id, field_name::text AS field_name FROM {fields} WHERE id::text = ANY($1) LIMIT 1"
            ),
            all_fields: format!(
                "SELECT ff.id::text AS id, ff.field_name::text AS field_name FROM {fields} ff ORDER BY ff.id"
            ),
            mapping_exists: format!(
                "SELECT 1 FROM {mappings} WHERE form_id::text = ANY($1) AND field_id::text = ANY($2) LIMIT 1"
            ),
            // Selecting the ids back out of their own tables keeps the column types native.
            insert_mapping: format!(
                "INSERT INTO {mappings} (form_id, field_id, order_index) \
                 SELECT f.id, ff.id, $3 FROM {forms} f, {fields} ff \
                 WHERE f.id::text = ANY($1) AND ff.id::text = ANY($2)"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgFormCatalog {
    pool: PgPool,
    queries: FormQueries,
}

impl PgFormCatalog {
    pub fn new(pool: PgPool, tables: &FormTables) -> Self {
        Self {
            pool,
            queries: FormQueries::new(tables),
        }
    }
}

/// `order_index` for the 1-based `position` in a batch.
fn order_index(position: usize) -> Result<i32, StoreError> {
    i32::try_from(position).map_err(|_| StoreError::OrderIndexOverflow { position })
}

fn field_from_row(row: &sqlx::postgres::PgRow) -> Result<FormField, sqlx::Error> {
    Ok(FormField {
        id: row.try_get("id")?,
        field_name: row
            .try_get::<Option<String>, _>("field_name")?
            .unwrap_or_default(),
    })
}

#[async_trait]
impl FormCatalog for PgFormCatalog {
    async fn form_exists(&self, form_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(&self.queries.form_exists)
            .bind(id_lookup_keys(form_id))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn field_by_id(&self, field_id: &str) -> Result<Option<FormField>, StoreError> {
        let row = sqlx::query(&self.queries.field_by_id)
            .bind(id_lookup_keys(field_id))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(field_from_row).transpose()?)
    }

    async fn all_fields(&self) -> Result<Vec<FormField>, StoreError> {
        let rows = sqlx::query(&self.queries.all_fields)
            .fetch_all(&self.pool)
            .await?;
        let fields = rows
            .iter()
            .map(field_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = fields.len(), "loaded form fields");
        Ok(fields)
    }

    async fn mapping_exists(&self, form_id: &str, field_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(&self.queries.mapping_exists)
            .bind(id_lookup_keys(form_id))
            .bind(id_lookup_keys(field_id))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_mappings(&self, form_id: &str, fields: &[FormField]) -> Result<u64, StoreError> {
        let order = (1..=fields.len())
            .map(order_index)
            .collect::<Result<Vec<_>, _>>()?;
        let form_keys = id_lookup_keys(form_id);

        // Dropping `tx` on any early return rolls the batch back.
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for (field, position) in fields.iter().zip(order) {
            let result = sqlx::query(&self.queries.insert_mapping)
                .bind(&form_keys)
                .bind(id_lookup_keys(&field.id))
                .bind(position)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() != 1 {
                warn!(
                    form_id,
                    field_id = %field.id,
                    rows = result.rows_affected(),
                    "mapping insert did not produce exactly one row; rolling back"
                );
                return Err(StoreError::InsertMismatch {
                    expected: 1,
                    actual: result.rows_affected() as usize,
                });
            }
            inserted += 1;
        }

        tx.commit().await?;
        info!(form_id, inserted, "form field mappings committed");
        Ok(inserted)
    }
}
