//! Database operations for `products`, the canonical entity keyed by stable key.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub stable_key: String,
    /// `style_code`, `platform_product`, or `synthesized`.
    pub key_source: String,
    pub name: String,
    pub attributes: Value,
    pub external_identifiers: Value,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column values for an insert or an update of one product.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductWrite {
    pub stable_key: String,
    pub key_source: String,
    pub name: String,
    pub attributes: Value,
    pub external_identifiers: Value,
    pub content_hash: String,
}

/// What [`reconcile_product`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductWriteOutcome {
    Inserted(Uuid),
    Updated(Uuid),
    Unchanged(Uuid),
}

impl ProductWriteOutcome {
    #[must_use]
    pub fn id(self) -> Uuid {
        match self {
            Self::Inserted(id) | Self::Updated(id) | Self::Unchanged(id) => id,
        }
    }
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_product_by_stable_key(
    pool: &PgPool,
    stable_key: &str,
) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, stable_key, key_source, name, attributes, external_identifiers, \
                content_hash, created_at, updated_at \
         FROM products WHERE stable_key = $1",
    )
    .bind(stable_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Inserts `incoming` or reconciles it with the existing product that has
/// the same stable key.
///
/// The insert attempt uses `ON CONFLICT DO NOTHING`; on conflict the
/// existing row is locked with `FOR UPDATE` and handed to `merge`, which
/// returns the replacement values or `None` when nothing changes. Two
/// writers on one key therefore serialize on the row lock.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement or the commit fails; the
/// transaction is rolled back on drop.
pub async fn reconcile_product<F>(
    pool: &PgPool,
    incoming: &ProductWrite,
    merge: F,
) -> Result<ProductWriteOutcome, DbError>
where
    F: FnOnce(&ProductRow) -> Option<ProductWrite> + Send,
{
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO products \
             (id, stable_key, key_source, name, attributes, external_identifiers, content_hash) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (stable_key) DO NOTHING \
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(&incoming.stable_key)
    .bind(&incoming.key_source)
    .bind(&incoming.name)
    .bind(&incoming.attributes)
    .bind(&incoming.external_identifiers)
    .bind(&incoming.content_hash)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(id) = inserted {
        tx.commit().await?;
        return Ok(ProductWriteOutcome::Inserted(id));
    }

    let existing = sqlx::query_as::<_, ProductRow>(
        "SELECT id, stable_key, key_source, name, attributes, external_identifiers, \
                content_hash, created_at, updated_at \
         FROM products WHERE stable_key = $1 FOR UPDATE",
    )
    .bind(&incoming.stable_key)
    .fetch_one(&mut *tx)
    .await?;

    let Some(update) = merge(&existing) else {
        tx.commit().await?;
        return Ok(ProductWriteOutcome::Unchanged(existing.id));
    };

    sqlx::query(
        "UPDATE products \
         SET key_source = $1, name = $2, attributes = $3, external_identifiers = $4, \
             content_hash = $5, updated_at = NOW() \
         WHERE id = $6",
    )
    .bind(&update.key_source)
    .bind(&update.name)
    .bind(&update.attributes)
    .bind(&update.external_identifiers)
    .bind(&update.content_hash)
    .bind(existing.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(ProductWriteOutcome::Updated(existing.id))
}
