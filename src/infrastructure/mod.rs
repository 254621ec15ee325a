//! Infrastructure layer - HTTP, HTML parsing, persistence, and runtime setup.

pub mod config;
pub mod database_connection;
pub mod datasheets;
pub mod http_client;
pub mod logging;
pub mod part_repository;
pub mod run_repository;
pub mod scraping;
pub mod strategy_repository;

pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use http_client::{HttpClient, HttpClientConfig};
pub use part_repository::SqlitePartRepository;
pub use run_repository::SqliteRunRepository;
pub use strategy_repository::SqliteStrategyRepository;
