//! Domain module - core entities, trait seams, and the error taxonomy.

pub mod errors;
pub mod part;
pub mod repositories;
pub mod run;
pub mod services;
pub mod strategy;

pub use errors::{DetectionError, RunError, ScrapeError, StorageError};
pub use part::{MatchResult, PartFilter, PartRecord, QueryPart};
pub use run::{ProgressDelta, RunState, RunStatus, SupplierProgress};
pub use strategy::{FieldSelectors, SelectorStrategy};
