//! # colstore
//!
//! An embedded, append-only, column-oriented event store. Each event is a
//! flat map of typed fields; every `(field, kind)` pair lives in its own
//! plain-text column file next to an index of `(id, timestamp)` records.
//!
//! ## Features
//!
//! - **Column layout**: `status.int`, `error.string`, ... one file per field and kind
//! - **Crash safety**: the index append is the commit point, uncommitted rows are dropped on open
//! - **Queries**: point lookup by id, field averages, conjunctive predicate filters
//! - **Concurrency**: one writer, many readers, never a partial event
//!
//! ## Modules
//!
//! - [`storage`]: The event store and its on-disk logs
//! - [`query`]: Filter expression parser
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colstore::storage::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EventStore::open(StoreConfig::new("./data"), Arc::new(SystemClock)).await?;
//!
//!     let fields = Event::new(0, 0)
//!         .field("status", 200)
//!         .field("response_time", 46.3)
//!         .field("error", "tea pot")
//!         .fields;
//!     store.save_event(&fields).await?;
//!
//!     let avg = store.avg("response_time").await?;
//!     let slow = store
//!         .filter(&colstore::query::parse_query("response_time > 40.0")?)
//!         .await?;
//!
//!     println!("avg {:.1}ms, {} slow events", avg, slow.len());
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    Clock, Event, EventStore, Fields, ManualClock, Operator, Predicate, Query, StoreConfig,
    StoreError, StoreResult, StoreStats, SyncMode, SystemClock, Value, ValueKind,
};

pub use query::{parse_query, parse_value, QueryError};

pub use config::{Config, ConfigError, LoggingConfig, StorageConfig as ConfigStorageConfig};
