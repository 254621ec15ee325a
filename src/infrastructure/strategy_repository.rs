//! SQLite-backed selector strategy store
//!
//! Strategies are versioned per supplier and kept historically; exactly one
//! version is active at a time. An active manual override is never displaced
//! by an auto-detected strategy.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::StorageError;
use crate::domain::repositories::StrategyRepository;
use crate::domain::strategy::{FieldSelectors, SelectorStrategy};

#[derive(Clone)]
pub struct SqliteStrategyRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteStrategyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn map_row(row: &SqliteRow) -> SelectorStrategy {
        SelectorStrategy {
            supplier_id: row.get("supplier_id"),
            version: row.get("version"),
            search_url_template: row.get("search_url_template"),
            result_block_selector: row.get("result_block_selector"),
            fields: FieldSelectors {
                part_number: row.get("part_number_selector"),
                description: row.get("description_selector"),
                price: row.get("price_selector"),
                quantity: row.get("quantity_selector"),
                purchase_link: row.get("purchase_link_selector"),
            },
            detection_confidence: row.get("detection_confidence"),
            is_manual_override: row.get("is_manual_override"),
            created_at: row.get("created_at"),
        }
    }
}

const SELECT_COLUMNS: &str = "supplier_id, version, search_url_template, result_block_selector, \
     part_number_selector, description_selector, price_selector, quantity_selector, \
     purchase_link_selector, detection_confidence, is_manual_override, created_at";

#[async_trait]
impl StrategyRepository for SqliteStrategyRepository {
    async fn get_active(
        &self,
        supplier_id: &str,
    ) -> Result<Option<SelectorStrategy>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM selector_strategies \
             WHERE supplier_id = ? AND is_active = 1"
        ))
        .bind(supplier_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.as_ref().map(Self::map_row))
    }

    async fn set_strategy(
        &self,
        strategy: SelectorStrategy,
    ) -> Result<SelectorStrategy, StorageError> {
        let mut tx = self.pool.begin().await?;

        let active_manual: Option<bool> = sqlx::query(
            "SELECT is_manual_override FROM selector_strategies \
             WHERE supplier_id = ? AND is_active = 1",
        )
        .bind(&strategy.supplier_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row.get("is_manual_override"));

        // A detected strategy must not displace an active manual mapping;
        // it is still stored for audit.
        let activate = !(active_manual == Some(true) && !strategy.is_manual_override);

        let next_version: i64 = sqlx::query(
            "SELECT COALESCE(MAX(version), 0) + 1 AS v FROM selector_strategies \
             WHERE supplier_id = ?",
        )
        .bind(&strategy.supplier_id)
        .fetch_one(&mut *tx)
        .await?
        .get("v");

        if activate {
            sqlx::query(
                "UPDATE selector_strategies SET is_active = 0 \
                 WHERE supplier_id = ? AND is_active = 1",
            )
            .bind(&strategy.supplier_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO selector_strategies
            (supplier_id, version, search_url_template, result_block_selector,
             part_number_selector, description_selector, price_selector,
             quantity_selector, purchase_link_selector, detection_confidence,
             is_manual_override, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&strategy.supplier_id)
        .bind(next_version)
        .bind(&strategy.search_url_template)
        .bind(&strategy.result_block_selector)
        .bind(&strategy.fields.part_number)
        .bind(&strategy.fields.description)
        .bind(&strategy.fields.price)
        .bind(&strategy.fields.quantity)
        .bind(&strategy.fields.purchase_link)
        .bind(strategy.detection_confidence)
        .bind(strategy.is_manual_override)
        .bind(activate)
        .bind(strategy.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if activate {
            info!(
                supplier_id = %strategy.supplier_id,
                version = next_version,
                manual = strategy.is_manual_override,
                "activated selector strategy"
            );
        } else {
            warn!(
                supplier_id = %strategy.supplier_id,
                version = next_version,
                "stored detected strategy inactive; manual override stays active"
            );
        }

        Ok(SelectorStrategy {
            version: next_version,
            ..strategy
        })
    }

    async fn history(&self, supplier_id: &str) -> Result<Vec<SelectorStrategy>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM selector_strategies \
             WHERE supplier_id = ? ORDER BY version DESC"
        ))
        .bind(supplier_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.iter().map(Self::map_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn repo() -> (tempfile::TempDir, SqliteStrategyRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("strategies.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        (dir, SqliteStrategyRepository::new(db.pool().clone()))
    }

    fn detected(supplier: &str, confidence: f64) -> SelectorStrategy {
        SelectorStrategy {
            supplier_id: supplier.into(),
            version: 0,
            search_url_template: "https://example.test/search?q={query}".into(),
            result_block_selector: "div.product".into(),
            fields: FieldSelectors::default(),
            detection_confidence: confidence,
            is_manual_override: false,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn versions_increase_and_only_latest_is_active() {
        let (_dir, repo) = repo().await;
        let v1 = repo.set_strategy(detected("acme", 0.5)).await.unwrap();
        let v2 = repo.set_strategy(detected("acme", 0.7)).await.unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);

        let active = repo.get_active("acme").await.unwrap().unwrap();
        assert_eq!(active.version, 2);

        let history = repo.history("acme").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 2);
    }

    #[tokio::test]
    async fn manual_override_survives_later_detection() {
        let (_dir, repo) = repo().await;
        let manual = SelectorStrategy::manual(
            "acme",
            "https://example.test/search?q={query}",
            "li.result",
            FieldSelectors::default(),
        );
        repo.set_strategy(manual).await.unwrap();
        // High confidence does not matter; manual wins.
        repo.set_strategy(detected("acme", 0.99)).await.unwrap();

        let active = repo.get_active("acme").await.unwrap().unwrap();
        assert!(active.is_manual_override);
        assert_eq!(active.result_block_selector, "li.result");
        // The detected one is still recorded.
        assert_eq!(repo.history("acme").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn manual_override_replaces_manual_override() {
        let (_dir, repo) = repo().await;
        let first = SelectorStrategy::manual(
            "acme",
            "https://example.test/search?q={query}",
            "li.result",
            FieldSelectors::default(),
        );
        repo.set_strategy(first).await.unwrap();
        let second = SelectorStrategy::manual(
            "acme",
            "https://example.test/search?q={query}",
            "div.card",
            FieldSelectors::default(),
        );
        repo.set_strategy(second).await.unwrap();

        let active = repo.get_active("acme").await.unwrap().unwrap();
        assert_eq!(active.result_block_selector, "div.card");
    }

    #[tokio::test]
    async fn unknown_supplier_has_no_active_strategy() {
        let (_dir, repo) = repo().await;
        assert!(repo.get_active("nobody").await.unwrap().is_none());
    }
}
