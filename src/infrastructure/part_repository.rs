//! SQLite-backed part cache
//!
//! Upserts are keyed `(supplier_id, part_number)`: a fresher observation
//! supersedes the stored row, and `observed_at` can only move forward, so
//! interleaved writers cannot roll a record back.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::StorageError;
use crate::domain::part::{PartFilter, PartRecord};
use crate::domain::repositories::PartRepository;

#[derive(Clone)]
pub struct SqlitePartRepository {
    pool: Arc<SqlitePool>,
}

impl SqlitePartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn map_row(row: &SqliteRow) -> PartRecord {
        PartRecord {
            supplier_id: row.get("supplier_id"),
            part_number: row.get("part_number"),
            manufacturer_part_number: row.get("manufacturer_part_number"),
            description: row.get("description"),
            quantity_available: row.get("quantity_available"),
            unit_price: row.get("unit_price"),
            currency: row.get("currency"),
            purchase_url: row.get("purchase_url"),
            datasheet_url: row.get("datasheet_url"),
            observed_at: row.get("observed_at"),
            source_strategy_version: row.get("source_strategy_version"),
        }
    }
}

#[async_trait]
impl PartRepository for SqlitePartRepository {
    async fn upsert_batch(&self, records: &[PartRecord]) -> Result<u64, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO part_records
                (supplier_id, part_number, manufacturer_part_number, description,
                 quantity_available, unit_price, currency, purchase_url, datasheet_url,
                 observed_at, source_strategy_version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(supplier_id, part_number) DO UPDATE SET
                    manufacturer_part_number = excluded.manufacturer_part_number,
                    description = excluded.description,
                    quantity_available = excluded.quantity_available,
                    unit_price = excluded.unit_price,
                    currency = excluded.currency,
                    purchase_url = excluded.purchase_url,
                    datasheet_url = excluded.datasheet_url,
                    observed_at = MAX(part_records.observed_at, excluded.observed_at),
                    source_strategy_version = excluded.source_strategy_version
                "#,
            )
            .bind(&record.supplier_id)
            .bind(&record.part_number)
            .bind(&record.manufacturer_part_number)
            .bind(&record.description)
            .bind(record.quantity_available)
            .bind(record.unit_price)
            .bind(&record.currency)
            .bind(&record.purchase_url)
            .bind(&record.datasheet_url)
            .bind(record.observed_at)
            .bind(record.source_strategy_version)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = records.len(), "upserted part record batch");
        Ok(records.len() as u64)
    }

    async fn query(&self, filter: &PartFilter) -> Result<Vec<PartRecord>, StorageError> {
        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT supplier_id, part_number, manufacturer_part_number, description, \
             quantity_available, unit_price, currency, purchase_url, datasheet_url, \
             observed_at, source_strategy_version FROM part_records WHERE 1 = 1",
        );

        if let Some(suppliers) = &filter.suppliers {
            if suppliers.is_empty() {
                return Ok(Vec::new());
            }
            qb.push(" AND supplier_id IN (");
            let mut separated = qb.separated(", ");
            for supplier in suppliers {
                separated.push_bind(supplier);
            }
            qb.push(")");
        }
        if filter.in_stock_only {
            qb.push(" AND quantity_available > 0");
        }
        if let Some(cutoff) = filter.observed_after {
            qb.push(" AND observed_at >= ");
            qb.push_bind(cutoff);
        }
        qb.push(" ORDER BY supplier_id, part_number");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&*self.pool).await?;
        Ok(rows.iter().map(Self::map_row).collect())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM part_records")
            .fetch_one(&*self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }
}
