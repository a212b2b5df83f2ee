//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imdb_common::ImdbId;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{
    quote_identifier, BatchSink, StatisticsSource, StoreError, StoredRecord, SyncMarkerStore,
    TitleLookup,
};
use crate::datasets::{AkaSummary, Title, TitleDetails};
use crate::decode::FieldValue;
use crate::writer::ConflictPolicy;

const MARKER_TABLE: &str = "imdb_synchronizations";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `ON CONFLICT` clause for a record type under `policy`
fn conflict_clause<R: StoredRecord>(policy: ConflictPolicy) -> Result<String, StoreError> {
    let key = R::KEY
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");

    let updates = R::COLUMNS
        .iter()
        .filter(|column| !R::KEY.contains(*column))
        .map(|column| quote_identifier(column).map(|c| format!("{c} = EXCLUDED.{c}")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match policy {
        ConflictPolicy::Merge if !updates.is_empty() => {
            format!(" ON CONFLICT ({key}) DO UPDATE SET {}", updates.join(", "))
        }
        ConflictPolicy::Merge | ConflictPolicy::Ignore => {
            format!(" ON CONFLICT ({key}) DO NOTHING")
        }
    })
}

#[async_trait]
impl<R: StoredRecord> BatchSink<R> for PgStore {
    async fn write_batch(&self, batch: &[R], policy: ConflictPolicy) -> Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let columns = R::COLUMNS
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let conflict = conflict_clause::<R>(policy)?;

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({columns}) ",
            quote_identifier(R::TABLE)?
        ));

        query_builder.push_values(batch, |mut b, record| {
            for value in record.to_values() {
                match value {
                    FieldValue::Text(v) => b.push_bind(v),
                    FieldValue::Boolean(v) => b.push_bind(v),
                    FieldValue::Integer(v) => b.push_bind(v),
                    FieldValue::Real(v) => b.push_bind(v),
                    FieldValue::List(v) => b.push_bind(v),
                };
            }
        });
        query_builder.push(conflict);

        let result = query_builder.build().execute(&self.pool).await?;
        debug!(
            table = R::TABLE,
            records = batch.len(),
            affected = result.rows_affected(),
            "Wrote batch"
        );

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StatisticsSource for PgStore {
    async fn count_rows(&self, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn group_counts(
        &self,
        table: &str,
        column: &str,
        fan_out: bool,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let table = quote_identifier(table)?;
        let column = quote_identifier(column)?;

        let sql = if fan_out {
            format!(
                "SELECT grp AS key, COUNT(*) AS count \
                 FROM {table} CROSS JOIN LATERAL unnest({table}.{column}) AS grp \
                 GROUP BY grp"
            )
        } else {
            format!(
                "SELECT COALESCE({column}::text, '') AS key, COUNT(*) AS count \
                 FROM {table} GROUP BY 1"
            )
        };

        let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn count_where_true(&self, table: &str, column: &str) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_identifier(table)?,
            quote_identifier(column)?
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl SyncMarkerStore for PgStore {
    async fn last_marker(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let sql = format!("SELECT MAX(synced_at) FROM {MARKER_TABLE}");
        let marker: Option<DateTime<Utc>> = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(marker)
    }

    async fn record_marker(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let sql = format!("INSERT INTO {MARKER_TABLE} (synced_at) VALUES ($1)");
        sqlx::query(&sql).bind(at).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TitleLookup for PgStore {
    async fn find_title(&self, id: &ImdbId) -> Result<Option<TitleDetails>, StoreError> {
        let title = sqlx::query_as::<_, Title>(
            r#"
            SELECT
                tconst, title_type, primary_title, original_title, is_adult,
                start_year, end_year, runtime_minutes, genres
            FROM imdb_titles
            WHERE tconst = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(title) = title else {
            return Ok(None);
        };

        let akas: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT region, language, title
            FROM imdb_title_akas
            WHERE title_id = $1
            ORDER BY region, language, title
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let akas = akas.into_iter().map(|(region, language, title)| AkaSummary {
            region,
            language,
            title,
        });
        Ok(Some(TitleDetails::new(title, akas)))
    }
}
