use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Item, ItemKey, ItemQuery, Result, ScanFilter, SortKeyCondition, StoreError,
    store::{ItemStream, KeyValueStore, PutCondition, validate_item_key},
};

const LIVE: &str = "(expires_at IS NULL OR expires_at > NOW())";

/// PostgreSQL-backed key-value store implementation.
///
/// Every logical table lives in the single `kv_items` table. An item
/// without a sort key is stored with `sort_key = ''`.
#[derive(Clone)]
pub struct PostgresKeyValueStore {
    pool: PgPool,
}

impl PostgresKeyValueStore {
    /// Creates a new PostgreSQL key-value store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("kv_items migrations applied");
        Ok(())
    }

    fn stored_sort_key(key: &ItemKey) -> &str {
        key.sort_key().unwrap_or("")
    }

    fn row_to_item(row: PgRow) -> Result<Item> {
        let sort_key: String = row.try_get("sort_key")?;

        Ok(Item {
            key: ItemKey {
                partition_key: row.try_get("partition_key")?,
                sort_key: (!sort_key.is_empty()).then_some(sort_key),
            },
            attributes: row.try_get("attributes")?,
            expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
        })
    }
}

#[async_trait]
impl KeyValueStore for PostgresKeyValueStore {
    async fn put(&self, table: &str, item: Item, condition: PutCondition) -> Result<()> {
        validate_item_key(table, &item.key)?;

        // A conditional put may still overwrite an item that has expired.
        let sql = match condition {
            PutCondition::Always => {
                r#"
                INSERT INTO kv_items (table_name, partition_key, sort_key, attributes, expires_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (table_name, partition_key, sort_key) DO UPDATE SET
                    attributes = EXCLUDED.attributes,
                    expires_at = EXCLUDED.expires_at
                "#
            }
            PutCondition::IfAbsent => {
                r#"
                INSERT INTO kv_items (table_name, partition_key, sort_key, attributes, expires_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (table_name, partition_key, sort_key) DO UPDATE SET
                    attributes = EXCLUDED.attributes,
                    expires_at = EXCLUDED.expires_at
                WHERE kv_items.expires_at IS NOT NULL AND kv_items.expires_at <= NOW()
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(table)
            .bind(&item.key.partition_key)
            .bind(Self::stored_sort_key(&item.key))
            .bind(&item.attributes)
            .bind(item.expires_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(table = %table, key = %item.key, "conditional put found a live item");
            return Err(StoreError::ConditionFailed {
                table: table.to_string(),
                key: item.key,
            });
        }

        Ok(())
    }

    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            r#"
            SELECT partition_key, sort_key, attributes, expires_at
            FROM kv_items
            WHERE table_name = $1 AND partition_key = $2 AND sort_key = $3 AND {LIVE}
            "#
        ))
        .bind(table)
        .bind(&key.partition_key)
        .bind(Self::stored_sort_key(key))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_item).transpose()
    }

    async fn query(&self, table: &str, query: ItemQuery) -> Result<Vec<Item>> {
        let mut sql = format!(
            "SELECT partition_key, sort_key, attributes, expires_at FROM kv_items \
             WHERE table_name = $1 AND partition_key = $2 AND {LIVE}"
        );
        let mut param_count = 2;

        // Build dynamic query
        match &query.condition {
            SortKeyCondition::Any => {}
            SortKeyCondition::Equals(_) => {
                param_count += 1;
                sql.push_str(&format!(" AND sort_key = ${param_count}"));
            }
            SortKeyCondition::BeginsWith(_) => {
                param_count += 1;
                sql.push_str(&format!(
                    " AND sort_key <> '' AND starts_with(sort_key, ${param_count})"
                ));
            }
            SortKeyCondition::GreaterThan(_) => {
                param_count += 1;
                sql.push_str(&format!(" AND sort_key <> '' AND sort_key > ${param_count}"));
            }
            SortKeyCondition::Between(_, _) => {
                sql.push_str(&format!(
                    " AND sort_key <> '' AND sort_key BETWEEN ${} AND ${}",
                    param_count + 1,
                    param_count + 2
                ));
                param_count += 2;
            }
        }

        sql.push_str(if query.descending {
            " ORDER BY sort_key DESC"
        } else {
            " ORDER BY sort_key ASC"
        });

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        // Build and execute query with parameters
        let mut sqlx_query = sqlx::query(&sql).bind(table).bind(&query.partition_key);

        match &query.condition {
            SortKeyCondition::Any => {}
            SortKeyCondition::Equals(value)
            | SortKeyCondition::BeginsWith(value)
            | SortKeyCondition::GreaterThan(value) => {
                sqlx_query = sqlx_query.bind(value);
            }
            SortKeyCondition::Between(low, high) => {
                sqlx_query = sqlx_query.bind(low).bind(high);
            }
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn delete(&self, table: &str, key: &ItemKey) -> Result<bool> {
        let live: Option<bool> = sqlx::query_scalar(&format!(
            r#"
            DELETE FROM kv_items
            WHERE table_name = $1 AND partition_key = $2 AND sort_key = $3
            RETURNING {LIVE}
            "#
        ))
        .bind(table)
        .bind(&key.partition_key)
        .bind(Self::stored_sort_key(key))
        .fetch_optional(&self.pool)
        .await?;

        Ok(live.unwrap_or(false))
    }

    async fn scan(&self, table: &str, filter: ScanFilter) -> Result<ItemStream> {
        use futures_util::stream;

        let rows = sqlx::query(&format!(
            r#"
            SELECT partition_key, sort_key, attributes, expires_at
            FROM kv_items
            WHERE table_name = $1 AND {LIVE}
              AND ($2::text IS NULL OR starts_with(partition_key, $2))
              AND ($3::text IS NULL OR (sort_key <> '' AND starts_with(sort_key, $3)))
            ORDER BY partition_key ASC, sort_key ASC
            "#
        ))
        .bind(table)
        .bind(filter.partition_key_prefix)
        .bind(filter.sort_key_prefix)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.into_iter().map(Self::row_to_item);
        Ok(Box::pin(stream::iter(items.collect::<Vec<_>>())))
    }
}
