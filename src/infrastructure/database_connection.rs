// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        if db_path != ":memory:" && !Path::new(db_path).exists() {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_part_records_sql = r#"
            CREATE TABLE IF NOT EXISTS part_records (
                supplier_id TEXT NOT NULL,
                part_number TEXT NOT NULL,
                manufacturer_part_number TEXT,
                description TEXT,
                quantity_available INTEGER,
                unit_price REAL,
                currency TEXT,
                purchase_url TEXT,
                datasheet_url TEXT,
                observed_at DATETIME NOT NULL,
                source_strategy_version INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (supplier_id, part_number)
            )
        "#;

        let create_strategies_sql = r#"
            CREATE TABLE IF NOT EXISTS selector_strategies (
                supplier_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                search_url_template TEXT NOT NULL,
                result_block_selector TEXT NOT NULL,
                part_number_selector TEXT,
                description_selector TEXT,
                price_selector TEXT,
                quantity_selector TEXT,
                purchase_link_selector TEXT,
                detection_confidence REAL NOT NULL,
                is_manual_override INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                PRIMARY KEY (supplier_id, version)
            )
        "#;

        let create_runs_sql = r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending',
                parts_requested INTEGER NOT NULL DEFAULT 0,
                started_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                finished_at DATETIME
            )
        "#;

        let create_run_progress_sql = r#"
            CREATE TABLE IF NOT EXISTS run_supplier_progress (
                run_id TEXT NOT NULL,
                supplier_id TEXT NOT NULL,
                requested INTEGER NOT NULL DEFAULT 0,
                scraped INTEGER NOT NULL DEFAULT 0,
                stored INTEGER NOT NULL DEFAULT 0,
                errors INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (run_id, supplier_id),
                FOREIGN KEY (run_id) REFERENCES runs (run_id) ON DELETE CASCADE
            )
        "#;

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_part_records_mpn ON part_records (manufacturer_part_number)",
            "CREATE INDEX IF NOT EXISTS idx_part_records_observed_at ON part_records (observed_at)",
            "CREATE INDEX IF NOT EXISTS idx_strategies_active ON selector_strategies (supplier_id, is_active)",
            "CREATE INDEX IF NOT EXISTS idx_runs_status ON runs (status)",
        ];

        sqlx::query(create_part_records_sql).execute(&self.pool).await?;
        sqlx::query(create_strategies_sql).execute(&self.pool).await?;
        sqlx::query(create_runs_sql).execute(&self.pool).await?;
        sqlx::query(create_run_progress_sql).execute(&self.pool).await?;
        for sql in create_indexes_sql {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        Ok(())
    }
}
